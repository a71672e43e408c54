//! Document pipeline: watch folder -> job queue -> OCR worker -> archive
//!
//! Everything shares one [`Archive`] behind an async mutex. The queue is an
//! in-process mpsc channel; the worker also rescans the archive for queued
//! documents, so a lost job (or a restart) only delays processing.

pub mod watcher;
pub mod worker;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::archive::{Archive, Registration};
use crate::config::AppConfig;
use crate::ocr::tesseract::Tesseract;
use watcher::WatchGuard;
use worker::Worker;

pub type SharedArchive = Arc<Mutex<Archive>>;

const JOB_QUEUE_CAPACITY: usize = 256;

/// What ingestion needs: the archive, the job queue and the OCR language
#[derive(Clone)]
pub struct Ingest {
    pub archive: SharedArchive,
    pub jobs: mpsc::Sender<PathBuf>,
    pub language: String,
}

/// Files we never ingest: hidden files, Office lock files, our own temp files
fn is_ignored(path: &Path) -> bool {
    match path.file_name().map(|n| n.to_string_lossy()) {
        Some(name) => name.starts_with('.') || name.starts_with("~$") || name.ends_with(".part"),
        None => true,
    }
}

pub async fn hash_file(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Register a file from the watch folder and queue it for OCR if needed.
/// Returns `None` for paths that are not ingestible files.
pub async fn ingest(ctx: &Ingest, path: &Path) -> Result<Option<Registration>> {
    if is_ignored(path) || !path.is_file() {
        return Ok(None);
    }

    let hash = hash_file(path).await?;
    let registration = ctx
        .archive
        .lock()
        .await
        .register(path, &hash, &ctx.language)?;

    match &registration {
        Registration::Queued | Registration::Requeued => {
            tracing::info!("Queued {}", path.display());
            if ctx.jobs.send(path.to_path_buf()).await.is_err() {
                tracing::warn!("Job queue closed; {} waits for the next scan", path.display());
            }
        }
        Registration::Duplicate { of } => {
            tracing::info!("{} duplicates {}", path.display(), of.display());
        }
        Registration::Unchanged => {
            tracing::trace!("{} unchanged", path.display());
        }
    }

    Ok(Some(registration))
}

/// Ingest every file already sitting in the watch folder
pub async fn initial_scan(ctx: &Ingest, dir: &Path) -> Result<usize> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    let mut queued = 0;
    for path in paths {
        match ingest(ctx, &path).await {
            Ok(Some(r)) if r.needs_ocr() => queued += 1,
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(queued)
}

/// First free `name.ext`, `name (1).ext`, `name (2).ext`... in `dir`
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path.extension().map(|e| e.to_string_lossy().to_string());

    (1..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Rename, falling back to copy + remove across filesystems
pub fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

/// Copy a document into the watch folder; the watcher takes it from there
pub fn import_document(src: &Path, watch_dir: &Path) -> Result<PathBuf> {
    if !src.is_file() {
        anyhow::bail!("Not a file: {}", src.display());
    }
    let file_name = src
        .file_name()
        .context("Document path has no file name")?
        .to_string_lossy()
        .to_string();

    std::fs::create_dir_all(watch_dir)
        .with_context(|| format!("Failed to create watch folder {}", watch_dir.display()))?;
    let dest = unique_destination(watch_dir, &file_name);
    std::fs::copy(src, &dest)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;

    tracing::info!("Imported {} as {}", src.display(), dest.display());
    Ok(dest)
}

/// Put a failed document back in the queue, moving it out of quarantine first
pub async fn retry(archive: &SharedArchive, path: &Path) -> Result<()> {
    let mut archive = archive.lock().await;
    let stored_at = archive
        .get(path)
        .map(|d| d.stored_at.clone())
        .with_context(|| format!("Unknown document {}", path.display()))?;

    if !stored_at.is_file() {
        anyhow::bail!("File no longer exists: {}", stored_at.display());
    }
    if stored_at != path {
        if path.exists() {
            anyhow::bail!(
                "{} is taken by another file; rename it before retrying",
                path.display()
            );
        }
        move_file(&stored_at, path)
            .with_context(|| format!("Failed to restore {}", stored_at.display()))?;
    }

    archive.requeue(path)?;
    tracing::info!("Requeued {}", path.display());
    Ok(())
}

pub(crate) fn notify_desktop(summary: &str, body: &str) {
    let summary = summary.to_string();
    let body = body.to_string();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = notify_rust::Notification::new()
            .summary(&summary)
            .body(&body)
            .icon("document-new")
            .show()
        {
            tracing::debug!("Notification failed: {}", e);
        }
    });
}

/// Running watcher + worker. Dropping the guard stops the OS watcher.
pub struct Pipeline {
    _guard: WatchGuard,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub async fn start(config: &AppConfig, archive: SharedArchive) -> Result<Self> {
        archive.lock().await.recover_interrupted()?;

        let quarantine = config.quarantine_dir();
        std::fs::create_dir_all(&quarantine)
            .with_context(|| format!("Failed to create {}", quarantine.display()))?;

        let (jobs, rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let ctx = Ingest {
            archive: archive.clone(),
            jobs,
            language: config.language.clone(),
        };

        let worker = Worker::new(
            archive,
            Tesseract::from_config(config),
            quarantine,
            config.notifications,
        );
        let worker_task = tokio::spawn(worker.run(rx, Duration::from_secs(config.scan_interval_secs.max(1))));

        let (guard, watch_task) = watcher::spawn(
            &config.watch_dir,
            Duration::from_millis(config.debounce_ms),
            ctx.clone(),
        )?;

        let watch_dir = config.watch_dir.clone();
        let scan_task = tokio::spawn(async move {
            match initial_scan(&ctx, &watch_dir).await {
                Ok(n) => tracing::info!("Initial scan queued {} documents", n),
                Err(e) => tracing::error!("Initial scan failed: {:#}", e),
            }
        });

        Ok(Self {
            _guard: guard,
            tasks: vec![worker_task, watch_task, scan_task],
        })
    }

    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!("Pipeline stopped");
    }
}

/// Headless mode: watch + OCR until Ctrl-C
pub async fn run_daemon(config: AppConfig) -> Result<()> {
    let archive = Archive::open(config.archive_path())?;
    let archive: SharedArchive = Arc::new(Mutex::new(archive));

    let pipeline = Pipeline::start(&config, archive).await?;
    tracing::info!("Lindley is running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutting down...");
    pipeline.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DocumentStatus;
    use tempfile::tempdir;

    fn context(dir: &Path) -> (Ingest, mpsc::Receiver<PathBuf>) {
        let archive = Archive::open(dir.join("archive.json")).unwrap();
        let (jobs, rx) = mpsc::channel(8);
        let ctx = Ingest {
            archive: Arc::new(Mutex::new(archive)),
            jobs,
            language: "eng".to_string(),
        };
        (ctx, rx)
    }

    #[test]
    fn test_ignored_names() {
        assert!(is_ignored(Path::new("/inbox/.DS_Store")));
        assert!(is_ignored(Path::new("/inbox/~$letter.docx")));
        assert!(is_ignored(Path::new("/inbox/scan.pdf.part")));
        assert!(!is_ignored(Path::new("/inbox/scan.pdf")));
    }

    #[tokio::test]
    async fn test_ingest_queues_new_files_once() {
        let dir = tempdir().unwrap();
        let (ctx, mut rx) = context(dir.path());
        let doc = dir.path().join("letter.png");
        std::fs::write(&doc, b"pixels").unwrap();

        assert_eq!(ingest(&ctx, &doc).await.unwrap(), Some(Registration::Queued));
        assert_eq!(rx.recv().await, Some(doc.clone()));

        assert_eq!(ingest(&ctx, &doc).await.unwrap(), Some(Registration::Unchanged));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ingest_marks_duplicates_and_skips_directories() {
        let dir = tempdir().unwrap();
        let (ctx, mut rx) = context(dir.path());
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        assert_eq!(initial_scan(&ctx, dir.path()).await.unwrap(), 1);
        assert_eq!(rx.recv().await, Some(a.clone()));

        let archive = ctx.archive.lock().await;
        assert_eq!(archive.get(&b).unwrap().status, DocumentStatus::Duplicate);
        assert!(archive.get(&dir.path().join("sub")).is_none());
    }

    #[test]
    fn test_import_picks_free_name() {
        let src_dir = tempdir().unwrap();
        let watch = tempdir().unwrap();
        let src = src_dir.path().join("recipe.jpg");
        std::fs::write(&src, b"cake").unwrap();
        std::fs::write(watch.path().join("recipe.jpg"), b"older").unwrap();
        std::fs::write(watch.path().join("recipe (1).jpg"), b"older still").unwrap();

        let dest = import_document(&src, watch.path()).unwrap();

        assert_eq!(dest, watch.path().join("recipe (2).jpg"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"cake");
        assert!(src.exists());
    }

    #[test]
    fn test_import_rejects_directories() {
        let dir = tempdir().unwrap();
        assert!(import_document(dir.path(), dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_retry_restores_quarantined_file() {
        let dir = tempdir().unwrap();
        let (ctx, _rx) = context(dir.path());
        let doc = dir.path().join("faded.png");
        let quarantined = dir.path().join("ocr_quarantine").join("faded.png");
        std::fs::write(&doc, b"faded").unwrap();

        ingest(&ctx, &doc).await.unwrap();
        move_file(&doc, &quarantined).unwrap();
        {
            let mut archive = ctx.archive.lock().await;
            archive.begin(&doc).unwrap();
            archive.fail(&doc, "empty OCR result", Some(&quarantined)).unwrap();
        }

        retry(&ctx.archive, &doc).await.unwrap();

        assert!(doc.exists());
        assert!(!quarantined.exists());
        let archive = ctx.archive.lock().await;
        assert_eq!(archive.get(&doc).unwrap().status, DocumentStatus::Queued);
    }

    #[tokio::test]
    async fn test_retry_keeps_newer_file_at_original_path() {
        let dir = tempdir().unwrap();
        let (ctx, _rx) = context(dir.path());
        let doc = dir.path().join("faded.png");
        let quarantined = dir.path().join("ocr_quarantine").join("faded.png");
        std::fs::write(&doc, b"faded").unwrap();

        ingest(&ctx, &doc).await.unwrap();
        move_file(&doc, &quarantined).unwrap();
        {
            let mut archive = ctx.archive.lock().await;
            archive.begin(&doc).unwrap();
            archive.fail(&doc, "empty OCR result", Some(&quarantined)).unwrap();
        }
        std::fs::write(&doc, b"a fresh scan").unwrap();

        let err = retry(&ctx.archive, &doc).await.unwrap_err();

        assert!(err.to_string().contains("taken by another file"));
        assert_eq!(std::fs::read(&doc).unwrap(), b"a fresh scan");
        assert!(quarantined.exists());
        let archive = ctx.archive.lock().await;
        assert_eq!(archive.get(&doc).unwrap().status, DocumentStatus::Error);
    }
}
