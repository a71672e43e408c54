//! Watch folder monitoring
//!
//! The notify callback runs on its own thread and only forwards paths; the
//! debouncing and ingestion happen on a tokio task so that a file still being
//! written (scanner drivers love to write in bursts) is picked up once, after
//! it has gone quiet.

use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode};
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::{ingest, Ingest};

const FLUSH_INTERVAL: Duration = Duration::from_millis(250);
const POLL_FALLBACK_INTERVAL: Duration = Duration::from_secs(2);

/// Collects change notifications and releases each path once it has been
/// quiet for the configured delay.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    pub fn observe(&mut self, path: PathBuf, at: Instant) {
        self.pending.insert(path, at);
    }

    /// Remove and return every path quiet since `now - delay`, sorted
    pub fn drain_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let delay = self.delay;
        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= delay)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Events that may mean a file has new contents
fn is_content_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

fn make_event_handler(
    tx: mpsc::UnboundedSender<PathBuf>,
) -> impl Fn(notify::Result<Event>) + Send + 'static {
    move |result: notify::Result<Event>| match result {
        Ok(event) if is_content_event(&event.kind) => {
            for path in event.paths {
                if tx.send(path).is_err() {
                    return;
                }
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Watch error: {}", e),
    }
}

/// Native watcher if the platform allows it, poll watcher otherwise
fn create_watcher(tx: mpsc::UnboundedSender<PathBuf>) -> Result<Box<dyn Watcher + Send>> {
    match notify::recommended_watcher(make_event_handler(tx.clone())) {
        Ok(w) => {
            tracing::debug!("Using native file watcher");
            Ok(Box::new(w))
        }
        Err(e) => {
            tracing::warn!("Native watcher unavailable ({}); falling back to polling", e);
            let config = NotifyConfig::default().with_poll_interval(POLL_FALLBACK_INTERVAL);
            let w = PollWatcher::new(make_event_handler(tx), config)
                .context("Failed to create poll watcher")?;
            Ok(Box::new(w))
        }
    }
}

/// Idle periods must not turn into a burst of catch-up ticks
fn flush_timer() -> tokio::time::Interval {
    let mut flush = tokio::time::interval(FLUSH_INTERVAL);
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    flush
}

/// Keeps the OS watcher alive; dropping it stops watching
pub struct WatchGuard {
    _watcher: Box<dyn Watcher + Send>,
}

/// Start watching `dir` and feed settled paths to `ingest`
pub fn spawn(dir: &Path, debounce: Duration, ingest_ctx: Ingest) -> Result<(WatchGuard, tokio::task::JoinHandle<()>)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create watch folder {}", dir.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let mut watcher = create_watcher(tx)?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    tracing::info!("Watching {}", dir.display());

    let task = tokio::spawn(async move {
        let mut debouncer = Debouncer::new(debounce);
        let mut flush = flush_timer();

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(path) => debouncer.observe(path, Instant::now()),
                    None => break,
                },
                _ = flush.tick(), if !debouncer.is_empty() => {
                    for path in debouncer.drain_ready(Instant::now()) {
                        if let Err(e) = ingest(&ingest_ctx, &path).await {
                            tracing::error!("Failed to ingest {}: {:#}", path.display(), e);
                        }
                    }
                }
            }
        }
        tracing::debug!("Watcher task stopped");
    });

    Ok((WatchGuard { _watcher: watcher }, task))
}
