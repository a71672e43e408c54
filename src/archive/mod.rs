//! Persistent document archive
//!
//! Every file that shows up in the watch folder gets a [`DocumentRecord`],
//! keyed by its original path. The whole archive is a single JSON file that
//! is rewritten atomically after each change, so a crash never leaves a
//! half-written archive behind.

pub mod error;
pub mod report;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::ocr::Recognition;
pub use error::{ArchiveError, Result};

const ARCHIVE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Ready,
    Error,
    Duplicate,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
            DocumentStatus::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Inbox,
    OcrQuarantine,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Inbox => "inbox",
            Location::OcrQuarantine => "ocr_quarantine",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub hash: String,
    pub status: DocumentStatus,
    pub location: Location,
    pub stored_at: PathBuf,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
    pub lang: String,
    #[serde(default)]
    pub pages: usize,
    #[serde(default)]
    pub ocr_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<PathBuf>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn new(path: &Path, hash: &str, lang: &str) -> Self {
        let now = Utc::now();
        Self {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            hash: hash.to_string(),
            status: DocumentStatus::Queued,
            location: Location::Inbox,
            stored_at: path.to_path_buf(),
            word_count: 0,
            ocr_confidence: None,
            lang: lang.to_string(),
            pages: 0,
            ocr_text: String::new(),
            error: None,
            duplicate_of: None,
            added_at: now,
            updated_at: now,
        }
    }

    fn reset_for_requeue(&mut self) {
        self.status = DocumentStatus::Queued;
        self.word_count = 0;
        self.ocr_confidence = None;
        self.pages = 0;
        self.ocr_text.clear();
        self.error = None;
        self.duplicate_of = None;
        self.updated_at = Utc::now();
    }
}

/// What [`Archive::register`] did with a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// First time we see this path; it is queued for OCR
    Queued,
    /// Known path whose contents changed; queued again
    Requeued,
    /// Known path, same contents
    Unchanged,
    /// Same contents already archived under another path
    Duplicate { of: PathBuf },
}

impl Registration {
    pub fn needs_ocr(&self) -> bool {
        matches!(self, Registration::Queued | Registration::Requeued)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub ready: usize,
    pub errors: usize,
    pub duplicates: usize,
    pub words: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveFile {
    version: u32,
    documents: Vec<DocumentRecord>,
}

#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    documents: BTreeMap<PathBuf, DocumentRecord>,
}

impl Archive {
    /// Open the archive at `path`. A missing file is an empty archive.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let documents = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let file: ArchiveFile = serde_json::from_str(&content)
                    .map_err(|source| ArchiveError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                if file.version != ARCHIVE_VERSION {
                    tracing::warn!(
                        "Archive {} has version {}, expected {}",
                        path.display(),
                        file.version,
                        ARCHIVE_VERSION
                    );
                }
                file.documents
                    .into_iter()
                    .map(|doc| (doc.path.clone(), doc))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(ArchiveError::io(&path, e)),
        };

        tracing::debug!("Opened archive {} ({} documents)", path.display(), documents.len());
        Ok(Self { path, documents })
    }

    /// Write the archive to disk via a temp file + rename
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
            }
        }

        let file = ArchiveFile {
            version: ARCHIVE_VERSION,
            documents: self.documents.values().cloned().collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| ArchiveError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ArchiveError::io(&self.path, e))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&DocumentRecord> {
        self.documents.get(path)
    }

    /// All records ordered by path
    pub fn documents(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents.values()
    }

    /// Records newest first (by last update)
    pub fn recent(&self, limit: usize) -> Vec<&DocumentRecord> {
        let mut docs: Vec<&DocumentRecord> = self.documents.values().collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.path.cmp(&b.path)));
        docs.truncate(limit);
        docs
    }

    pub fn errors(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents
            .values()
            .filter(|d| d.status == DocumentStatus::Error)
    }

    /// Paths waiting for OCR
    pub fn queued(&self) -> Vec<PathBuf> {
        self.documents
            .values()
            .filter(|d| d.status == DocumentStatus::Queued)
            .map(|d| d.path.clone())
            .collect()
    }

    pub fn stats(&self) -> ArchiveStats {
        let mut stats = ArchiveStats {
            total: self.documents.len(),
            ..ArchiveStats::default()
        };
        for doc in self.documents.values() {
            match doc.status {
                DocumentStatus::Queued => stats.queued += 1,
                DocumentStatus::Processing => stats.processing += 1,
                DocumentStatus::Ready => stats.ready += 1,
                DocumentStatus::Error => stats.errors += 1,
                DocumentStatus::Duplicate => stats.duplicates += 1,
            }
            stats.words += doc.word_count;
        }
        stats
    }

    /// Record a file seen in the watch folder
    pub fn register(&mut self, path: &Path, hash: &str, lang: &str) -> Result<Registration> {
        let registration = match self.documents.get(path).map(|d| d.hash == hash) {
            Some(true) => return Ok(Registration::Unchanged),
            Some(false) => {
                self.update(path, |doc| {
                    doc.hash = hash.to_string();
                    doc.lang = lang.to_string();
                    doc.location = Location::Inbox;
                    doc.stored_at = path.to_path_buf();
                    doc.reset_for_requeue();
                })?;
                return Ok(Registration::Requeued);
            }
            None => {
                let original = self
                    .documents
                    .values()
                    .find(|d| d.hash == hash && d.status != DocumentStatus::Duplicate)
                    .map(|d| d.path.clone());

                let mut doc = DocumentRecord::new(path, hash, lang);
                let registration = match original {
                    Some(of) => {
                        doc.status = DocumentStatus::Duplicate;
                        doc.duplicate_of = Some(of.clone());
                        Registration::Duplicate { of }
                    }
                    None => Registration::Queued,
                };
                self.documents.insert(path.to_path_buf(), doc);
                registration
            }
        };

        self.save()?;
        Ok(registration)
    }

    /// Mark a queued document as being worked on. Returns the hash of the
    /// contents the work is based on.
    pub fn begin(&mut self, path: &Path) -> Result<String> {
        let hash = self
            .documents
            .get(path)
            .map(|d| d.hash.clone())
            .ok_or_else(|| ArchiveError::UnknownDocument(path.to_path_buf()))?;
        self.update(path, |doc| {
            doc.status = DocumentStatus::Processing;
            doc.error = None;
        })?;
        Ok(hash)
    }

    /// Still processing the contents with `hash`? False once the file has
    /// been re-registered with new contents.
    pub fn is_current(&self, path: &Path, hash: &str) -> bool {
        self.documents
            .get(path)
            .is_some_and(|d| d.status == DocumentStatus::Processing && d.hash == hash)
    }

    /// Store a successful recognition of the contents with `hash`.
    /// Returns false, leaving the record alone, when that result is stale.
    pub fn complete(&mut self, path: &Path, hash: &str, recognition: &Recognition) -> Result<bool> {
        if !self.is_current(path, hash) {
            return Ok(false);
        }
        self.update(path, |doc| {
            doc.status = DocumentStatus::Ready;
            doc.location = Location::Inbox;
            doc.word_count = recognition.word_count();
            doc.ocr_confidence = recognition.confidence;
            doc.pages = recognition.pages;
            doc.ocr_text = recognition.text.clone();
            doc.error = None;
        })?;
        Ok(true)
    }

    /// Mark a document as failed. `moved_to` is set when the file was quarantined.
    pub fn fail(&mut self, path: &Path, reason: &str, moved_to: Option<&Path>) -> Result<()> {
        self.update(path, |doc| {
            doc.status = DocumentStatus::Error;
            doc.ocr_text.clear();
            doc.word_count = 0;
            doc.ocr_confidence = None;
            doc.error = Some(reason.to_string());
            if let Some(dest) = moved_to {
                doc.location = Location::OcrQuarantine;
                doc.stored_at = dest.to_path_buf();
            }
        })
    }

    /// Put an errored document back in the queue.
    /// Returns the current storage path so the caller can move it home.
    pub fn requeue(&mut self, path: &Path) -> Result<PathBuf> {
        let doc = self
            .documents
            .get_mut(path)
            .ok_or_else(|| ArchiveError::UnknownDocument(path.to_path_buf()))?;
        let stored_at = doc.stored_at.clone();
        doc.location = Location::Inbox;
        doc.stored_at = doc.path.clone();
        doc.reset_for_requeue();
        self.save()?;
        Ok(stored_at)
    }

    /// Reset documents left in `processing` by an interrupted run
    pub fn recover_interrupted(&mut self) -> Result<usize> {
        let mut recovered = 0;
        for doc in self.documents.values_mut() {
            if doc.status == DocumentStatus::Processing {
                doc.status = DocumentStatus::Queued;
                doc.updated_at = Utc::now();
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::info!("Recovered {} interrupted documents", recovered);
            self.save()?;
        }
        Ok(recovered)
    }

    fn update(&mut self, path: &Path, apply: impl FnOnce(&mut DocumentRecord)) -> Result<()> {
        let doc = self
            .documents
            .get_mut(path)
            .ok_or_else(|| ArchiveError::UnknownDocument(path.to_path_buf()))?;
        apply(doc);
        doc.updated_at = Utc::now();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn recognition(text: &str) -> Recognition {
        Recognition {
            text: text.to_string(),
            confidence: Some(91.5),
            pages: 1,
        }
    }

    #[test]
    fn test_missing_file_is_empty_archive() {
        let dir = tempdir().unwrap();
        let archive = Archive::open(dir.path().join("archive.json")).unwrap();
        assert!(archive.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archive.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Archive::open(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("archive.json");
        let doc = Path::new("/inbox/letter.png");

        let mut archive = Archive::open(&path).unwrap();
        archive.register(doc, "abc", "eng").unwrap();
        let hash = archive.begin(doc).unwrap();
        assert_eq!(hash, "abc");
        assert!(archive.complete(doc, &hash, &recognition("Dear Margaret")).unwrap());

        let reopened = Archive::open(&path).unwrap();
        let record = reopened.get(doc).unwrap();
        assert_eq!(record.status, DocumentStatus::Ready);
        assert_eq!(record.word_count, 2);
        assert_eq!(record.ocr_text, "Dear Margaret");
        assert_eq!(record.ocr_confidence, Some(91.5));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_register_detects_duplicates_and_changes() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path().join("archive.json")).unwrap();
        let a = Path::new("/inbox/a.jpg");
        let b = Path::new("/inbox/b.jpg");

        assert_eq!(archive.register(a, "h1", "eng").unwrap(), Registration::Queued);
        assert_eq!(archive.register(a, "h1", "eng").unwrap(), Registration::Unchanged);
        assert_eq!(
            archive.register(b, "h1", "eng").unwrap(),
            Registration::Duplicate { of: a.to_path_buf() }
        );
        assert_eq!(archive.get(b).unwrap().status, DocumentStatus::Duplicate);

        archive.begin(a).unwrap();
        archive.complete(a, "h1", &recognition("old words")).unwrap();
        assert_eq!(archive.register(a, "h2", "eng").unwrap(), Registration::Requeued);

        let record = archive.get(a).unwrap();
        assert_eq!(record.status, DocumentStatus::Queued);
        assert!(record.ocr_text.is_empty());
        assert_eq!(record.hash, "h2");
    }

    #[test]
    fn test_fail_with_quarantine_and_requeue() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path().join("archive.json")).unwrap();
        let doc = Path::new("/inbox/blank.tif");
        let quarantined = Path::new("/data/ocr_quarantine/blank.tif");

        archive.register(doc, "h", "eng").unwrap();
        archive.begin(doc).unwrap();
        archive.fail(doc, "empty OCR result", Some(quarantined)).unwrap();

        let record = archive.get(doc).unwrap();
        assert_eq!(record.status, DocumentStatus::Error);
        assert_eq!(record.location, Location::OcrQuarantine);
        assert_eq!(record.stored_at, quarantined);
        assert_eq!(archive.errors().count(), 1);

        let was_at = archive.requeue(doc).unwrap();
        assert_eq!(was_at, quarantined);
        let record = archive.get(doc).unwrap();
        assert_eq!(record.status, DocumentStatus::Queued);
        assert_eq!(record.location, Location::Inbox);
        assert_eq!(record.stored_at, doc);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_recover_interrupted_and_stats() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path().join("archive.json")).unwrap();
        let a = Path::new("/inbox/a.png");
        let b = Path::new("/inbox/b.png");
        let c = Path::new("/inbox/c.png");

        archive.register(a, "1", "eng").unwrap();
        archive.register(b, "2", "eng").unwrap();
        archive.register(c, "3", "eng").unwrap();
        archive.begin(a).unwrap();
        archive.begin(b).unwrap();
        archive.complete(b, "2", &recognition("one two three")).unwrap();

        let stats = archive.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.words, 3);

        assert_eq!(archive.recover_interrupted().unwrap(), 1);
        let mut queued = archive.queued();
        queued.sort();
        assert_eq!(queued, vec![a.to_path_buf(), c.to_path_buf()]);
    }

    #[test]
    fn test_complete_ignores_results_for_replaced_contents() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path().join("archive.json")).unwrap();
        let doc = Path::new("/inbox/letter.png");

        archive.register(doc, "h1", "eng").unwrap();
        let started_on = archive.begin(doc).unwrap();
        assert!(archive.is_current(doc, &started_on));

        // file rewritten while OCR was running
        assert_eq!(archive.register(doc, "h2", "eng").unwrap(), Registration::Requeued);
        assert!(!archive.is_current(doc, &started_on));

        assert!(!archive.complete(doc, &started_on, &recognition("old page text")).unwrap());
        let record = archive.get(doc).unwrap();
        assert_eq!(record.status, DocumentStatus::Queued);
        assert_eq!(record.hash, "h2");
        assert!(record.ocr_text.is_empty());
        assert_eq!(archive.queued(), vec![doc.to_path_buf()]);
    }

    #[test]
    fn test_unknown_document() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path().join("archive.json")).unwrap();
        let err = archive.begin(Path::new("/nowhere.png")).unwrap_err();
        assert!(matches!(err, ArchiveError::UnknownDocument(_)));
    }

    #[test]
    fn test_recent_is_newest_first() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::open(dir.path().join("archive.json")).unwrap();
        let a = Path::new("/inbox/a.png");
        let b = Path::new("/inbox/b.png");

        archive.register(a, "1", "eng").unwrap();
        archive.register(b, "2", "eng").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        archive.begin(a).unwrap();

        let recent = archive.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].path, a);
    }
}
