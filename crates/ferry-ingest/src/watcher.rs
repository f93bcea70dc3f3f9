//! Directory watcher
//!
//! Subscribes to the active directory (non-recursive) and hands every file that arrives there to
//! the [`Processor`], one at a time, after a settling delay.
//!
//! notify delivers events on its own thread; the callback forwards them with `blocking_send`
//! into a tokio channel that [`DirectoryWatcher::run`] drains. Files are promoted into the active
//! directory by rename, which inotify and friends report as `Modify(Name(To))` rather than
//! `Create`, so both count as arrivals.
//!
//! The subscription lives as long as the `DirectoryWatcher`; dropping it stops notify's thread
//! and closes the channel.

use ferry_common::{FerryError, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::processor::{ProcessOutcome, Processor};

const EVENT_BUFFER: usize = 256;

pub struct DirectoryWatcher {
    dir: PathBuf,
    processor: Processor,
    settle: Duration,
    cancel: CancellationToken,
    // Dropping this ends the subscription
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Result<Event>>,
}

impl DirectoryWatcher {
    /// Subscribe to `dir`. Events start queueing immediately, before [`run`](Self::run) is
    /// called, so nothing promoted in between is missed.
    pub fn new(
        dir: impl Into<PathBuf>,
        processor: Processor,
        settle: Duration,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let dir = dir.into();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // Runs on notify's thread; a closed channel means the loop has exited
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )
        .map_err(|e| FerryError::Watch(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| FerryError::Watch(format!("failed to watch {}: {e}", dir.display())))?;

        info!(dir = %dir.display(), settle_ms = settle.as_millis() as u64, "Watching active directory");

        Ok(Self {
            dir,
            processor,
            settle,
            cancel,
            _watcher: watcher,
            events,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Process arrivals until cancelled or the event channel closes
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Directory watcher shutting down (cancelled)");
                    break;
                }

                event = self.events.recv() => match event {
                    Some(Ok(event)) => {
                        for path in arrival_paths(&event) {
                            self.handle_arrival(&path).await;
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Watcher error"),
                    None => {
                        info!("Directory watcher shutting down (channel closed)");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_arrival(&self, path: &Path) {
        debug!(path = %path.display(), "File arrived");
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        match self.processor.process(path).await {
            ProcessOutcome::Extracted { .. } | ProcessOutcome::AlreadyProcessed => {}
            outcome => debug!(path = %path.display(), ?outcome, "File left in active directory"),
        }
    }
}

/// Paths an event reports as newly present, skipping directories
pub fn arrival_paths(event: &Event) -> Vec<PathBuf> {
    let paths: &[PathBuf] = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths,
        // paths[0] is the source, paths[1] the destination
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or_default()
        }
        _ => {
            trace!(kind = ?event.kind, "Ignoring event");
            return Vec::new();
        }
    };

    paths.iter().filter(|p| !p.is_dir()).cloned().collect()
}
