//! Text recognition
//!
//! The worker only talks to the [`Recognizer`] trait; [`tesseract::Tesseract`]
//! is the production implementation and tests substitute their own.

pub mod tesseract;

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Unsupported file type: {0}")]
    Unsupported(String),

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a file gets turned into text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Pdf,
    Unsupported(String),
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "tif" | "tiff" | "bmp" => DocumentKind::Image,
            "pdf" => DocumentKind::Pdf,
            _ => DocumentKind::Unsupported(ext),
        }
    }
}

/// Text recognized from one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Mean word confidence, 0-100
    pub confidence: Option<f32>,
    pub pages: usize,
}

impl Recognition {
    /// Words in the text, not counting page markers
    pub fn word_count(&self) -> usize {
        self.text
            .lines()
            .filter(|line| !is_page_marker(line))
            .map(|line| line.split_whitespace().count())
            .sum()
    }

    pub fn is_blank(&self) -> bool {
        self.word_count() == 0
    }
}

pub trait Recognizer: Send + Sync + 'static {
    fn recognize(
        &self,
        path: &Path,
        kind: &DocumentKind,
    ) -> impl Future<Output = Result<Recognition, OcrError>> + Send;
}

fn is_page_marker(line: &str) -> bool {
    line.starts_with("--- Page ") && line.ends_with(" ---")
}

/// Text and word confidences of a single page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub text: String,
    pub confidences: Vec<f32>,
}

/// Parse `tesseract ... tsv` output.
///
/// Level 5 rows are words. Words sharing (page, block, paragraph, line) form a
/// line; paragraphs are separated by a blank line.
pub fn parse_tsv(tsv: &str) -> PageText {
    let mut page = PageText::default();
    let mut current_line: Option<(u32, u32, u32, u32)> = None;
    let mut current_par: Option<(u32, u32, u32)> = None;

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }

        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let par = (num(1), num(2), num(3));
        let line = (par.0, par.1, par.2, num(4));

        match current_line {
            Some(prev) if prev == line => page.text.push(' '),
            Some(_) => {
                if current_par != Some(par) {
                    page.text.push_str("\n\n");
                } else {
                    page.text.push('\n');
                }
            }
            None => {}
        }
        page.text.push_str(word);
        current_line = Some(line);
        current_par = Some(par);

        if let Ok(conf) = cols[10].trim().parse::<f32>() {
            if conf >= 0.0 {
                page.confidences.push(conf);
            }
        }
    }

    page
}

/// Join pages into one recognition. Multi-page documents get page markers.
pub fn combine_pages(pages: Vec<PageText>, paged: bool) -> Recognition {
    let count = pages.len();
    let mut text = String::new();
    let mut confidences = Vec::new();

    for (i, page) in pages.into_iter().enumerate() {
        if paged {
            text.push_str(&format!("\n--- Page {} ---\n", i + 1));
        }
        text.push_str(&page.text);
        confidences.extend(page.confidences);
    }

    let confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
    };

    Recognition {
        text,
        confidence,
        pages: count,
    }
}
