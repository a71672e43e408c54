use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::archive::{ArchiveStats, DocumentRecord, DocumentStatus};
use crate::config::AppConfig;
use crate::ocr::DocumentKind;
use crate::pipeline::{self, SharedArchive};
use crate::ui::home::HomeView;

/// How often the document list is re-read from the archive
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_MESSAGE_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Button,
    Documents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    None,
    FileBrowser,
    Detail,
    Help,
}

#[derive(Debug, Clone)]
pub struct BrowserEntry {
    pub name: String,
    pub is_dir: bool,
    pub path: PathBuf,
}

pub struct App {
    pub focus: Focus,
    pub popup: Popup,

    pub config: AppConfig,
    archive: SharedArchive,

    // Snapshot of the archive, newest first
    pub documents: Vec<DocumentRecord>,
    pub stats: ArchiveStats,
    pub selected: usize,
    last_refresh: Option<Instant>,

    // Status message (shown in info line, auto-clears after timeout)
    pub status_message: Option<String>,
    pub status_message_time: Option<Instant>,

    // File browser state
    pub browser_path: PathBuf,
    pub browser_entries: Vec<BrowserEntry>,
    pub browser_selected: usize,

    pub detail_scroll: u16,
}

impl App {
    pub async fn new(config: AppConfig, archive: SharedArchive) -> Self {
        let mut app = Self {
            focus: Focus::Button,
            popup: Popup::None,

            config,
            archive,

            documents: Vec::new(),
            stats: ArchiveStats::default(),
            selected: 0,
            last_refresh: None,

            status_message: None,
            status_message_time: None,

            browser_path: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            browser_entries: Vec::new(),
            browser_selected: 0,

            detail_scroll: 0,
        };
        app.refresh().await;
        app
    }

    /// Set a status message (auto-clears after 3 seconds)
    fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_message_time = Some(Instant::now());
    }

    pub fn selected_document(&self) -> Option<&DocumentRecord> {
        self.documents.get(self.selected)
    }

    async fn refresh(&mut self) {
        {
            let archive = self.archive.lock().await;
            self.documents = archive
                .recent(archive.len())
                .into_iter()
                .cloned()
                .collect();
            self.stats = archive.stats();
        }
        if self.selected >= self.documents.len() {
            self.selected = self.documents.len().saturating_sub(1);
        }
        self.last_refresh = Some(Instant::now());
    }

    pub async fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        // Handle popups first
        if self.popup != Popup::None {
            return self.handle_popup_key(key).await;
        }

        self.handle_normal_key(key).await
    }

    async fn handle_normal_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Button => Focus::Documents,
                    Focus::Documents => Focus::Button,
                };
            }
            KeyCode::Char('h') | KeyCode::Char('?') => {
                self.popup = Popup::Help;
            }
            KeyCode::Char('i') => {
                self.start_file_browser();
            }
            KeyCode::Enter | KeyCode::Char(' ') => match self.focus {
                Focus::Button => HomeView::activate(),
                Focus::Documents => {
                    if self.selected_document().is_some() {
                        self.detail_scroll = 0;
                        self.popup = Popup::Detail;
                    }
                }
            },
            KeyCode::Char('j') | KeyCode::Down if self.focus == Focus::Documents => {
                if !self.documents.is_empty() {
                    self.selected = (self.selected + 1) % self.documents.len();
                }
            }
            KeyCode::Char('k') | KeyCode::Up if self.focus == Focus::Documents => {
                if !self.documents.is_empty() {
                    self.selected = self
                        .selected
                        .checked_sub(1)
                        .unwrap_or(self.documents.len() - 1);
                }
            }
            KeyCode::Char('r') if self.focus == Focus::Documents => {
                self.retry_selected().await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle_popup_key(&mut self, key: KeyEvent) -> Result<()> {
        match self.popup {
            Popup::FileBrowser => self.handle_browser_key(key),
            Popup::Detail => {
                match key.code {
                    KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter => self.popup = Popup::None,
                    KeyCode::Char('j') | KeyCode::Down => {
                        self.detail_scroll = self.detail_scroll.saturating_add(1)
                    }
                    KeyCode::Char('k') | KeyCode::Up => {
                        self.detail_scroll = self.detail_scroll.saturating_sub(1)
                    }
                    KeyCode::PageDown => self.detail_scroll = self.detail_scroll.saturating_add(10),
                    KeyCode::PageUp => self.detail_scroll = self.detail_scroll.saturating_sub(10),
                    _ => {}
                }
                Ok(())
            }
            Popup::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('?') | KeyCode::Char('q')) {
                    self.popup = Popup::None;
                }
                Ok(())
            }
            Popup::None => Ok(()),
        }
    }

    async fn retry_selected(&mut self) -> Result<()> {
        let Some(doc) = self.selected_document() else {
            return Ok(());
        };
        if doc.status != DocumentStatus::Error {
            self.set_status("Only failed documents can be retried");
            return Ok(());
        }

        let path = doc.path.clone();
        let name = doc.file_name.clone();
        match pipeline::retry(&self.archive, &path).await {
            Ok(()) => self.set_status(format!("Queued {} again", name)),
            Err(e) => self.set_status(format!("Retry failed: {:#}", e)),
        }
        self.refresh().await;
        Ok(())
    }

    fn start_file_browser(&mut self) {
        self.popup = Popup::FileBrowser;
        self.browser_selected = 0;
        self.refresh_browser();
    }

    fn refresh_browser(&mut self) {
        self.browser_entries.clear();

        // Add parent directory entry if not at root
        if let Some(parent) = self.browser_path.parent() {
            self.browser_entries.push(BrowserEntry {
                name: "..".to_string(),
                is_dir: true,
                path: parent.to_path_buf(),
            });
        }

        if let Ok(entries) = std::fs::read_dir(&self.browser_path) {
            let mut dirs: Vec<BrowserEntry> = Vec::new();
            let mut files: Vec<BrowserEntry> = Vec::new();

            for entry in entries.flatten() {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();

                // Skip hidden files
                if name.starts_with('.') {
                    continue;
                }

                if path.is_dir() {
                    dirs.push(BrowserEntry { name, is_dir: true, path });
                } else if !matches!(DocumentKind::from_path(&path), DocumentKind::Unsupported(_)) {
                    files.push(BrowserEntry { name, is_dir: false, path });
                }
            }

            dirs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            files.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

            self.browser_entries.extend(dirs);
            self.browser_entries.extend(files);
        }

        if self.browser_selected >= self.browser_entries.len() {
            self.browser_selected = 0;
        }
    }

    fn enter_dir(&mut self, path: PathBuf) {
        self.browser_path = path;
        self.browser_selected = 0;
        self.refresh_browser();
    }

    fn handle_browser_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.popup = Popup::None;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if !self.browser_entries.is_empty() {
                    self.browser_selected = (self.browser_selected + 1) % self.browser_entries.len();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if !self.browser_entries.is_empty() {
                    self.browser_selected = self
                        .browser_selected
                        .checked_sub(1)
                        .unwrap_or(self.browser_entries.len() - 1);
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(entry) = self.browser_entries.get(self.browser_selected).cloned() {
                    if entry.is_dir {
                        self.enter_dir(entry.path);
                    } else {
                        self.import(&entry.path);
                    }
                }
            }
            KeyCode::Backspace => {
                if let Some(parent) = self.browser_path.parent().map(Path::to_path_buf) {
                    self.enter_dir(parent);
                }
            }
            KeyCode::Char('~') => {
                self.enter_dir(dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")));
            }
            _ => {}
        }
        Ok(())
    }

    fn import(&mut self, src: &Path) {
        match pipeline::import_document(src, &self.config.watch_dir) {
            Ok(dest) => {
                let name = dest
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.set_status(format!("Added {} to the archive inbox", name));
                self.popup = Popup::None;
            }
            Err(e) => {
                // Keep the browser open so another file can be picked
                self.set_status(format!("Import failed: {:#}", e));
            }
        }
    }

    pub async fn tick(&mut self) -> Result<()> {
        // Clear status message after 3 seconds
        if let Some(time) = self.status_message_time {
            if time.elapsed().as_secs() >= STATUS_MESSAGE_SECS {
                self.status_message = None;
                self.status_message_time = None;
            }
        }

        let due = self
            .last_refresh
            .map(|t| t.elapsed() >= REFRESH_INTERVAL)
            .unwrap_or(true);
        if due {
            self.refresh().await;
        }

        Ok(())
    }
}
