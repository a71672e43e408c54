//! Archive tools: plain-text listings and exports for the CLI

use anyhow::Result;
use clap::ValueEnum;
use std::io::Write;

use super::{Archive, DocumentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

const CSV_COLUMNS: [&str; 11] = [
    "path",
    "file_name",
    "status",
    "location",
    "word_count",
    "ocr_confidence",
    "lang",
    "pages",
    "added_at",
    "updated_at",
    "ocr_text",
];

fn summary_line(doc: &DocumentRecord) -> String {
    let confidence = doc
        .ocr_confidence
        .map(|c| format!("{:.1}", c))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}\t{}\t{}\t{}\t{}",
        doc.path.display(),
        doc.status,
        doc.word_count,
        confidence,
        doc.lang
    )
}

pub fn dump(archive: &Archive, out: &mut impl Write) -> Result<()> {
    for doc in archive.documents() {
        writeln!(out, "{}", summary_line(doc))?;
    }
    Ok(())
}

pub fn errors(archive: &Archive, out: &mut impl Write) -> Result<()> {
    for doc in archive.errors() {
        writeln!(
            out,
            "{}\t{}\t{}",
            doc.path.display(),
            doc.location.as_str(),
            doc.error.as_deref().unwrap_or("unknown error")
        )?;
    }
    Ok(())
}

pub fn stats(archive: &Archive, out: &mut impl Write) -> Result<()> {
    let stats = archive.stats();
    writeln!(
        out,
        "Total: {}, Processed: {}, Errors: {}",
        stats.total, stats.ready, stats.errors
    )?;
    Ok(())
}

pub fn recent(archive: &Archive, limit: usize, out: &mut impl Write) -> Result<()> {
    for doc in archive.recent(limit) {
        writeln!(
            out,
            "{}\t{}",
            doc.updated_at.format("%Y-%m-%d %H:%M:%S"),
            summary_line(doc)
        )?;
    }
    Ok(())
}

pub fn export(archive: &Archive, format: ExportFormat, out: &mut impl Write) -> Result<()> {
    match format {
        ExportFormat::Json => {
            let docs: Vec<&DocumentRecord> = archive.documents().collect();
            serde_json::to_writer_pretty(&mut *out, &docs)?;
            writeln!(out)?;
        }
        ExportFormat::Csv => {
            writeln!(out, "{}", CSV_COLUMNS.join(","))?;
            for doc in archive.documents() {
                let fields = [
                    doc.path.display().to_string(),
                    doc.file_name.clone(),
                    doc.status.to_string(),
                    doc.location.as_str().to_string(),
                    doc.word_count.to_string(),
                    doc.ocr_confidence.map(|c| format!("{:.1}", c)).unwrap_or_default(),
                    doc.lang.clone(),
                    doc.pages.to_string(),
                    doc.added_at.to_rfc3339(),
                    doc.updated_at.to_rfc3339(),
                    doc.ocr_text.clone(),
                ];
                let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
                writeln!(out, "{}", row.join(","))?;
            }
        }
    }
    Ok(())
}

/// Quote a field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
