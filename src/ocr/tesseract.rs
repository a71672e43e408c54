use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::{combine_pages, parse_tsv, DocumentKind, OcrError, PageText, Recognition, Recognizer};
use crate::config::{AppConfig, OcrConfig};

/// Recognizer backed by the `tesseract` CLI, with `pdftoppm` rasterizing PDFs
#[derive(Debug, Clone)]
pub struct Tesseract {
    tesseract_cmd: String,
    pdftoppm_cmd: String,
    language: String,
    dpi: u32,
    timeout: Duration,
}

impl Tesseract {
    pub fn new(ocr: &OcrConfig, language: &str) -> Self {
        Self {
            tesseract_cmd: ocr.tesseract_cmd.clone(),
            pdftoppm_cmd: ocr.pdftoppm_cmd.clone(),
            language: language.to_string(),
            dpi: ocr.dpi,
            timeout: Duration::from_secs(ocr.timeout_secs),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.ocr, &config.language)
    }

    async fn recognize_image(&self, image: &Path) -> Result<PageText, OcrError> {
        let image = image.to_string_lossy();
        let output = run_tool(
            &self.tesseract_cmd,
            &[&*image, "stdout", "-l", self.language.as_str(), "tsv"],
            self.timeout,
        )
        .await?;
        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Render every page to PNG in `out_dir`, returned in page order
    async fn rasterize_pdf(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
        let prefix = out_dir.join("page");
        let prefix = prefix.to_string_lossy();
        let pdf = pdf.to_string_lossy();
        let dpi = self.dpi.to_string();
        run_tool(
            &self.pdftoppm_cmd,
            &["-r", dpi.as_str(), "-png", &*pdf, &*prefix],
            self.timeout,
        )
        .await?;

        let mut pages: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
            .collect();
        // pdftoppm zero-pads page numbers, so name order is page order
        pages.sort();
        Ok(pages)
    }
}

impl Recognizer for Tesseract {
    async fn recognize(&self, path: &Path, kind: &DocumentKind) -> Result<Recognition, OcrError> {
        match kind {
            DocumentKind::Image => {
                let page = self.recognize_image(path).await?;
                Ok(combine_pages(vec![page], false))
            }
            DocumentKind::Pdf => {
                let scratch = tempfile::Builder::new().prefix("lindley-pages").tempdir()?;
                let images = self.rasterize_pdf(path, scratch.path()).await?;
                tracing::debug!("{} rendered to {} pages", path.display(), images.len());

                let mut pages = Vec::with_capacity(images.len());
                for image in &images {
                    pages.push(self.recognize_image(image).await?);
                }
                Ok(combine_pages(pages, true))
            }
            DocumentKind::Unsupported(ext) => Err(OcrError::Unsupported(ext.clone())),
        }
    }
}

/// Run an external tool, failing on timeout or non-zero exit
pub async fn run_tool(cmd: &str, args: &[&str], limit: Duration) -> Result<Output, OcrError> {
    tracing::trace!("Running {} {:?}", cmd, args);

    let child = Command::new(cmd)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = match timeout(limit, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(OcrError::Spawn {
                tool: cmd.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(OcrError::Timeout {
                tool: cmd.to_string(),
                after: limit,
            })
        }
    };

    if !output.status.success() {
        return Err(OcrError::ToolFailed {
            tool: cmd.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}
