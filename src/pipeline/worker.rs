use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use super::{move_file, notify_desktop, unique_destination, SharedArchive};
use crate::archive::DocumentStatus;
use crate::ocr::{DocumentKind, Recognizer};

/// Result of processing one document
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ready { words: usize },
    /// OCR failed or came back blank; the file was moved
    Quarantined { to: PathBuf },
    /// Left in place with an error (unsupported or missing)
    Failed { reason: String },
    /// Not queued (already done, in progress or unknown)
    Skipped,
    /// The file changed while it was being read; the result was dropped
    /// and the new contents are queued
    Superseded,
}

pub struct Worker<R> {
    archive: SharedArchive,
    recognizer: R,
    quarantine_dir: PathBuf,
    notifications: bool,
}

impl<R: Recognizer> Worker<R> {
    pub fn new(archive: SharedArchive, recognizer: R, quarantine_dir: PathBuf, notifications: bool) -> Self {
        Self {
            archive,
            recognizer,
            quarantine_dir,
            notifications,
        }
    }

    /// Consume jobs until the queue closes, rescanning the archive for queued
    /// documents every `scan_every`.
    pub async fn run(self, mut jobs: mpsc::Receiver<PathBuf>, scan_every: Duration) {
        let mut scan = interval(scan_every);
        scan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Worker started");

        loop {
            tokio::select! {
                biased;
                _ = scan.tick() => {
                    let queued = self.archive.lock().await.queued();
                    if !queued.is_empty() {
                        tracing::debug!("Archive scan found {} queued documents", queued.len());
                    }
                    for path in queued {
                        self.handle(&path).await;
                    }
                }
                job = jobs.recv() => match job {
                    Some(path) => self.handle(&path).await,
                    None => break,
                },
            }
        }
        tracing::info!("Worker stopped");
    }

    async fn handle(&self, path: &Path) {
        match self.process(path).await {
            Ok(Outcome::Ready { words }) => {
                tracing::info!("OCR complete for {} ({} words)", path.display(), words);
                self.notify("Document archived", path);
            }
            Ok(Outcome::Quarantined { to }) => {
                tracing::warn!("OCR failed for {}; moved to {}", path.display(), to.display());
                self.notify("OCR failed", path);
            }
            Ok(Outcome::Failed { reason }) => {
                tracing::warn!("Could not process {}: {}", path.display(), reason);
            }
            Ok(Outcome::Superseded) => {
                tracing::info!("{} changed during OCR; queued again", path.display());
            }
            Ok(Outcome::Skipped) => {}
            Err(e) => tracing::error!("Worker error on {}: {:#}", path.display(), e),
        }
    }

    fn notify(&self, summary: &str, path: &Path) {
        if self.notifications {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            notify_desktop(summary, &name);
        }
    }

    pub async fn process(&self, path: &Path) -> Result<Outcome> {
        let status = self.archive.lock().await.get(path).map(|d| d.status);
        if status != Some(DocumentStatus::Queued) {
            return Ok(Outcome::Skipped);
        }

        if !path.is_file() {
            let reason = "file not found".to_string();
            self.archive.lock().await.fail(path, &reason, None)?;
            return Ok(Outcome::Failed { reason });
        }

        let kind = DocumentKind::from_path(path);
        if let DocumentKind::Unsupported(ext) = &kind {
            let reason = format!("unsupported file type: .{}", ext);
            self.archive.lock().await.fail(path, &reason, None)?;
            return Ok(Outcome::Failed { reason });
        }

        let hash = self.archive.lock().await.begin(path)?;
        tracing::info!("Processing {}", path.display());

        match self.recognizer.recognize(path, &kind).await {
            Ok(recognition) if !recognition.is_blank() => {
                if !self.archive.lock().await.complete(path, &hash, &recognition)? {
                    return Ok(Outcome::Superseded);
                }
                Ok(Outcome::Ready {
                    words: recognition.word_count(),
                })
            }
            Ok(_) => self.quarantine(path, &hash, "empty OCR result").await,
            Err(e) => self.quarantine(path, &hash, &e.to_string()).await,
        }
    }

    async fn quarantine(&self, path: &Path, hash: &str, reason: &str) -> Result<Outcome> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let dest = unique_destination(&self.quarantine_dir, &file_name);

        // Held across the move so new contents can't be registered in between
        let mut archive = self.archive.lock().await;
        if !archive.is_current(path, hash) {
            return Ok(Outcome::Superseded);
        }

        match move_file(path, &dest) {
            Ok(()) => {
                archive.fail(path, reason, Some(&dest))?;
                Ok(Outcome::Quarantined { to: dest })
            }
            Err(e) => {
                tracing::error!("Could not quarantine {}: {}", path.display(), e);
                archive.fail(path, reason, None)?;
                Ok(Outcome::Failed {
                    reason: reason.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{Archive, Location};
    use crate::ocr::{OcrError, Recognition};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::Mutex;

    /// Returns canned text, or fails when the text is `None`
    struct Canned(Option<&'static str>);

    impl Recognizer for Canned {
        async fn recognize(&self, _path: &Path, _kind: &DocumentKind) -> Result<Recognition, OcrError> {
            match self.0 {
                Some(text) => Ok(Recognition {
                    text: text.to_string(),
                    confidence: Some(75.0),
                    pages: 1,
                }),
                None => Err(OcrError::ToolFailed {
                    tool: "tesseract".to_string(),
                    code: Some(1),
                    stderr: "Error opening data file".to_string(),
                }),
            }
        }
    }

    /// Simulates the file being rewritten mid-OCR: registers new contents,
    /// then answers for the old ones
    struct RewrittenDuringOcr {
        archive: SharedArchive,
        fails: bool,
    }

    impl Recognizer for RewrittenDuringOcr {
        async fn recognize(&self, path: &Path, _kind: &DocumentKind) -> Result<Recognition, OcrError> {
            self.archive
                .lock()
                .await
                .register(path, "new contents", "eng")
                .unwrap();
            if self.fails {
                Err(OcrError::Unsupported("png".to_string()))
            } else {
                Ok(Recognition {
                    text: "old page text".to_string(),
                    confidence: Some(80.0),
                    pages: 1,
                })
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        archive: SharedArchive,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let archive = Archive::open(dir.path().join("data").join("archive.json")).unwrap();
            Self {
                dir,
                archive: Arc::new(Mutex::new(archive)),
            }
        }

        fn worker<R: Recognizer>(&self, recognizer: R) -> Worker<R> {
            Worker::new(
                self.archive.clone(),
                recognizer,
                self.dir.path().join("data").join("ocr_quarantine"),
                false,
            )
        }

        async fn add(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            self.archive
                .lock()
                .await
                .register(&path, &format!("{:?}", contents), "eng")
                .unwrap();
            path
        }
    }

    #[tokio::test]
    async fn test_recognized_text_makes_document_ready() {
        let fx = Fixture::new();
        let doc = fx.add("letter.png", b"1").await;

        let outcome = fx.worker(Canned(Some("Happy birthday dear"))).process(&doc).await.unwrap();

        assert_eq!(outcome, Outcome::Ready { words: 3 });
        let archive = fx.archive.lock().await;
        let record = archive.get(&doc).unwrap();
        assert_eq!(record.status, DocumentStatus::Ready);
        assert_eq!(record.ocr_text, "Happy birthday dear");
        assert_eq!(record.location, Location::Inbox);
        assert!(doc.exists());
    }

    #[tokio::test]
    async fn test_file_changed_during_ocr_is_read_again() {
        let fx = Fixture::new();
        let doc = fx.add("letter.png", b"old").await;

        let rewriting = RewrittenDuringOcr {
            archive: fx.archive.clone(),
            fails: false,
        };
        assert_eq!(fx.worker(rewriting).process(&doc).await.unwrap(), Outcome::Superseded);
        {
            let archive = fx.archive.lock().await;
            let record = archive.get(&doc).unwrap();
            assert_eq!(record.status, DocumentStatus::Queued);
            assert_eq!(record.hash, "new contents");
            assert!(record.ocr_text.is_empty());
        }

        // the follow-up job for the new contents goes through
        let outcome = fx.worker(Canned(Some("new page text"))).process(&doc).await.unwrap();
        assert_eq!(outcome, Outcome::Ready { words: 3 });
        let archive = fx.archive.lock().await;
        let record = archive.get(&doc).unwrap();
        assert_eq!(record.ocr_text, "new page text");
        assert_eq!(record.hash, "new contents");
    }

    #[tokio::test]
    async fn test_file_changed_during_failed_ocr_is_not_quarantined() {
        let fx = Fixture::new();
        let doc = fx.add("receipt.png", b"old").await;

        let rewriting = RewrittenDuringOcr {
            archive: fx.archive.clone(),
            fails: true,
        };
        assert_eq!(fx.worker(rewriting).process(&doc).await.unwrap(), Outcome::Superseded);

        assert!(doc.exists());
        let archive = fx.archive.lock().await;
        let record = archive.get(&doc).unwrap();
        assert_eq!(record.status, DocumentStatus::Queued);
        assert_eq!(record.location, Location::Inbox);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_blank_result_is_quarantined() {
        let fx = Fixture::new();
        let doc = fx.add("blank.tif", b"2").await;

        let outcome = fx.worker(Canned(Some("  \n "))).process(&doc).await.unwrap();

        let expected = fx.dir.path().join("data").join("ocr_quarantine").join("blank.tif");
        assert_eq!(outcome, Outcome::Quarantined { to: expected.clone() });
        assert!(!doc.exists());
        assert!(expected.exists());

        let archive = fx.archive.lock().await;
        let record = archive.get(&doc).unwrap();
        assert_eq!(record.status, DocumentStatus::Error);
        assert_eq!(record.location, Location::OcrQuarantine);
        assert_eq!(record.error.as_deref(), Some("empty OCR result"));
    }

    #[tokio::test]
    async fn test_ocr_error_is_quarantined_with_reason() {
        let fx = Fixture::new();
        let doc = fx.add("scan.pdf", b"3").await;

        let outcome = fx.worker(Canned(None)).process(&doc).await.unwrap();

        assert!(matches!(outcome, Outcome::Quarantined { .. }));
        let archive = fx.archive.lock().await;
        let error = archive.get(&doc).unwrap().error.clone().unwrap();
        assert!(error.contains("Error opening data file"));
    }

    #[tokio::test]
    async fn test_unsupported_file_stays_in_inbox() {
        let fx = Fixture::new();
        let doc = fx.add("notes.docx", b"4").await;

        let outcome = fx.worker(Canned(Some("unused"))).process(&doc).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Failed {
                reason: "unsupported file type: .docx".to_string()
            }
        );
        assert!(doc.exists());
        let archive = fx.archive.lock().await;
        assert_eq!(archive.get(&doc).unwrap().location, Location::Inbox);
    }

    #[tokio::test]
    async fn test_missing_file_and_non_queued_documents() {
        let fx = Fixture::new();
        let doc = fx.add("gone.png", b"5").await;
        std::fs::remove_file(&doc).unwrap();
        let worker = fx.worker(Canned(Some("text")));

        assert_eq!(
            worker.process(&doc).await.unwrap(),
            Outcome::Failed {
                reason: "file not found".to_string()
            }
        );
        // now in error, so a second job for it is ignored
        assert_eq!(worker.process(&doc).await.unwrap(), Outcome::Skipped);
        assert_eq!(
            worker.process(Path::new("/never/seen.png")).await.unwrap(),
            Outcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_scans_archive() {
        let fx = Fixture::new();
        let queued_only_in_archive = fx.add("a.png", b"6").await;
        let sent_as_job = fx.add("b.png", b"7").await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(sent_as_job.clone()).await.unwrap();
        drop(tx);

        fx.worker(Canned(Some("words here")))
            .run(rx, Duration::from_millis(10))
            .await;

        let archive = fx.archive.lock().await;
        assert_eq!(archive.get(&sent_as_job).unwrap().status, DocumentStatus::Ready);
        // the first scan tick fires immediately and picks up both
        assert_eq!(
            archive.get(&queued_only_in_archive).unwrap().status,
            DocumentStatus::Ready
        );
    }
}
