use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_cmd: String,
    pub pdftoppm_cmd: String,
    /// Resolution PDF pages are rasterized at before recognition
    pub dpi: u32,
    /// Per-invocation limit for external tools
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: "tesseract".to_string(),
            pdftoppm_cmd: "pdftoppm".to_string(),
            dpi: 300,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Folder watched for new documents (the inbox)
    pub watch_dir: PathBuf,

    /// Where the archive, quarantine folder and log live
    pub data_dir: PathBuf,

    /// Tesseract language code
    pub language: String,

    /// Desktop notification when a document finishes
    pub notifications: bool,

    /// Run watcher + worker inside the TUI process
    pub tui_pipeline: bool,

    /// How often the worker rescans the archive for queued documents
    pub scan_interval_secs: u64,

    /// Quiet period before a changed file is picked up
    pub debounce_ms: u64,

    pub ocr: OcrConfig,

    /// Colour overrides, name -> "#RRGGBB"
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub theme: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lindley"),
            language: "eng".to_string(),
            notifications: false,
            tui_pipeline: true,
            scan_interval_secs: 5,
            debounce_ms: 500,
            ocr: OcrConfig::default(),
            theme: HashMap::new(),
        }
    }
}

/// Folder the front page has always advertised
#[cfg(windows)]
const DEFAULT_WATCH_DIR: &str = r"C:\Users\Grandma\Documents\Lindley";

#[cfg(windows)]
fn default_watch_dir() -> PathBuf {
    PathBuf::from(DEFAULT_WATCH_DIR)
}

#[cfg(not(windows))]
fn default_watch_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Lindley")
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("lindley");

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!("Could not create config directory: {}", e);
        }

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the user config directory, or create default
    pub fn load() -> Result<Self> {
        let path = match Self::config_path() {
            Ok(p) => p,
            Err(_) => return Ok(AppConfig::default()),
        };

        if path.exists() {
            return Ok(Self::load_from(&path));
        }

        let config = AppConfig::default();
        if let Err(e) = config.save_to(&path) {
            tracing::warn!("Could not write default config: {}", e);
        }
        Ok(config)
    }

    /// Load config from an explicit file. Unreadable or invalid files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Failed to parse config {}: {}", path.display(), e),
            },
            Err(e) => tracing::warn!("Failed to read config {}: {}", path.display(), e),
        }
        AppConfig::default()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join("archive.json")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.data_dir.join("ocr_quarantine")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("lindley.log")
    }
}
