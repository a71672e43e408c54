mod app;
mod archive;
mod config;
mod ocr;
mod pipeline;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app::{App, Popup};
use archive::report::{self, ExportFormat};
use archive::Archive;
use config::AppConfig;
use pipeline::{Pipeline, SharedArchive};

#[derive(Parser, Debug)]
#[command(name = "lindley")]
#[command(version)]
#[command(about = "Watch a folder, OCR every document that lands in it, keep the text")]
struct Args {
    /// Use this config file instead of the per-user one
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run watcher and OCR worker without the UI
    #[arg(short, long)]
    daemon: bool,

    /// Output archive counts as JSON
    #[arg(short, long)]
    status: bool,

    /// Print totals: documents, processed, errors
    #[arg(long)]
    stats: bool,

    /// List every document in the archive
    #[arg(long)]
    dump: bool,

    /// List documents that failed
    #[arg(long)]
    errors: bool,

    /// List the N most recently updated documents
    #[arg(long, value_name = "N")]
    recent: Option<usize>,

    /// Export the archive
    #[arg(long, value_enum, value_name = "FORMAT")]
    export: Option<ExportFormat>,

    /// Write the export here instead of stdout
    #[arg(short, long, value_name = "FILE", requires = "export")]
    output: Option<PathBuf>,

    /// Copy documents into the watch folder
    #[arg(short, long, value_name = "FILE", num_args = 1..)]
    add: Vec<PathBuf>,
}

impl Args {
    fn runs_tui(&self) -> bool {
        !(self.daemon
            || self.status
            || self.stats
            || self.dump
            || self.errors
            || self.recent.is_some()
            || self.export.is_some()
            || !self.add.is_empty())
    }
}

fn init_logging(config: &AppConfig, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if to_file {
        // The TUI owns the terminal, so logs go to a file
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
        let log_path = config.log_path();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(StdMutex::new(file)),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load().unwrap_or_else(|e| {
            eprintln!("Using default config: {:#}", e);
            AppConfig::default()
        }),
    };

    init_logging(&config, args.runs_tui())?;

    // Handle CLI-only commands
    if !args.add.is_empty() {
        return add_documents(&config, &args.add);
    }

    if args.daemon {
        return pipeline::run_daemon(config).await;
    }

    if !args.runs_tui() {
        return run_report(&config, &args);
    }

    // Run TUI
    run_tui(config).await
}

fn add_documents(config: &AppConfig, files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for file in files {
        match pipeline::import_document(file, &config.watch_dir) {
            Ok(dest) => println!("Added {} -> {}", file.display(), dest.display()),
            Err(e) => {
                eprintln!("Could not add {}: {:#}", file.display(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} documents could not be added", failed, files.len());
    }
    Ok(())
}

fn run_report(config: &AppConfig, args: &Args) -> Result<()> {
    let archive_path = config.archive_path();
    if !archive_path.exists() {
        anyhow::bail!("Archive not found at {}", archive_path.display());
    }
    let archive = Archive::open(&archive_path)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.status {
        println!("{}", serde_json::to_string(&archive.stats())?);
    }
    if args.stats {
        report::stats(&archive, &mut out)?;
    }
    if args.dump {
        report::dump(&archive, &mut out)?;
    }
    if args.errors {
        report::errors(&archive, &mut out)?;
    }
    if let Some(limit) = args.recent {
        report::recent(&archive, limit, &mut out)?;
    }
    if let Some(format) = args.export {
        match &args.output {
            Some(path) => {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut writer = io::BufWriter::new(file);
                report::export(&archive, format, &mut writer)?;
                writer.flush()?;
                eprintln!("Exported {} documents to {}", archive.len(), path.display());
            }
            None => report::export(&archive, format, &mut out)?,
        }
    }
    Ok(())
}

async fn run_tui(config: AppConfig) -> Result<()> {
    ui::init_theme(&config.theme);

    let archive = Archive::open(config.archive_path())?;
    let archive: SharedArchive = Arc::new(tokio::sync::Mutex::new(archive));

    let mut pipeline_error = None;
    let pipeline = if config.tui_pipeline {
        match Pipeline::start(&config, archive.clone()).await {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                tracing::error!("Pipeline failed to start: {:#}", e);
                pipeline_error = Some(format!("Watcher not running: {}", e));
                None
            }
        }
    } else {
        None
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app state
    let mut app = App::new(config, archive).await;
    if pipeline_error.is_some() {
        app.status_message = pipeline_error;
    }

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Some(pipeline) = pipeline {
        pipeline.shutdown();
    }

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') if app.popup == Popup::None => return Ok(()),
                        KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        _ => {
                            // Handle key and catch any errors to prevent crashes
                            if let Err(e) = app.handle_key(key).await {
                                app.status_message = Some(format!("Error: {}", e));
                            }
                        }
                    }
                }
            }
        }

        // Periodic refresh
        let _ = app.tick().await;
    }
}
