//! Staging coordinator
//!
//! On every poll tick: open a remote session, list, and for each eligible name that is
//! neither registered nor already in the active directory, download it into the temporary
//! directory and rename it into the active directory after a settling delay. The watcher
//! finds out about new files from the filesystem, not from here.
//!
//! A failed connect or listing abandons the tick. A failed download or promotion abandons
//! that one name; it will be tried again next tick because it is in neither the active
//! directory nor the registry. Partial downloads are left in the temporary directory.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TimingConfig;
use crate::layout::{Location, StagingLayout};
use crate::registry::ProcessedRegistry;
use crate::remote::{normalize_remote_name, NameFilter, RemoteError, RemoteSession, RemoteSource};

/// What a single poll tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Raw entries returned by the listing
    pub listed: usize,
    /// Entries not matching the name pattern
    pub ignored: usize,
    /// Entries that could not be reduced to a safe file name
    pub rejected: usize,
    pub already_processed: usize,
    pub already_active: usize,
    /// Names promoted into the active directory this tick
    pub staged: Vec<String>,
    /// Names whose download or promotion failed
    pub failed: Vec<String>,
    /// The tick stopped early because shutdown was requested
    pub interrupted: bool,
}

pub struct StagingCoordinator {
    source: Arc<dyn RemoteSource>,
    layout: StagingLayout,
    registry: ProcessedRegistry,
    filter: NameFilter,
    interval: Duration,
    settle: Duration,
}

impl StagingCoordinator {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        layout: StagingLayout,
        registry: ProcessedRegistry,
        filter: NameFilter,
    ) -> Self {
        let timing = TimingConfig::default();
        Self {
            source,
            layout,
            registry,
            filter,
            interval: timing.poll_interval(),
            settle: timing.stage_settle(),
        }
    }

    pub fn with_timing(mut self, timing: &TimingConfig) -> Self {
        self.interval = timing.poll_interval();
        self.settle = timing.stage_settle();
        self
    }

    /// Run one poll tick to completion
    pub async fn tick(&self) -> Result<TickReport, RemoteError> {
        self.tick_until(&CancellationToken::new()).await
    }

    /// Run one poll tick, stopping between files once `cancel` fires.
    ///
    /// The session is closed on every path out of here, including errors.
    pub async fn tick_until(&self, cancel: &CancellationToken) -> Result<TickReport, RemoteError> {
        let mut session = self.source.connect().await?;
        let result = self.stage_listed(session.as_mut(), cancel).await;
        session.close().await;
        result
    }

    async fn stage_listed(
        &self,
        session: &mut dyn RemoteSession,
        cancel: &CancellationToken,
    ) -> Result<TickReport, RemoteError> {
        let entries = session.list().await?;
        let mut report = TickReport {
            listed: entries.len(),
            ..TickReport::default()
        };

        for entry in entries {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let Some(name) = normalize_remote_name(&entry) else {
                warn!(entry = %entry, "Skipping remote entry without a usable file name");
                report.rejected += 1;
                continue;
            };

            if !self.filter.matches(&name) {
                report.ignored += 1;
                continue;
            }

            // Checked together under the registry lock: the archiver moves a file out of
            // active and registers it as one step.
            let active = self.layout.path_in(Location::Active, &name);
            let seen = self.registry.check_with(&name, |processed| {
                if processed {
                    Some(Location::Archived)
                } else if active.exists() {
                    Some(Location::Active)
                } else {
                    None
                }
            });

            match seen {
                Some(Location::Active) => {
                    debug!(file = %name, "Already staged, not fetching");
                    report.already_active += 1;
                    continue;
                }
                Some(_) => {
                    debug!(file = %name, "Already processed, not fetching");
                    report.already_processed += 1;
                    continue;
                }
                None => {}
            }

            if self.stage_one(session, entry.trim(), &name).await {
                report.staged.push(name);
            } else {
                report.failed.push(name);
            }
        }

        Ok(report)
    }

    /// `remote` is the entry as listed, `name` the local file name derived from it
    async fn stage_one(&self, session: &mut dyn RemoteSession, remote: &str, name: &str) -> bool {
        let temp = self.layout.path_in(Location::Temporary, name);

        match session.fetch(remote, &temp).await {
            Ok(bytes) => debug!(file = %name, bytes, "Downloaded to temporary directory"),
            Err(e) => {
                error!(error = %e, file = %name, "Download failed, will retry next tick");
                return false;
            }
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let active = self.layout.path_in(Location::Active, name);
        match tokio::fs::rename(&temp, &active).await {
            Ok(()) => {
                info!(file = %name, path = %active.display(), "Staged remote file");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(
                    file = %name,
                    temp = %temp.display(),
                    "Temporary file vanished before promotion"
                );
                false
            }
            Err(e) => {
                error!(error = %e, file = %name, "Failed to promote file to active directory");
                false
            }
        }
    }

    /// Poll until cancelled. Tick failures are logged and never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            source = %self.source.describe(),
            interval_secs = self.interval.as_secs_f64(),
            pattern = %self.filter.as_str(),
            "Staging coordinator started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => match self.tick_until(&cancel).await {
                    Ok(report) if !report.staged.is_empty() || !report.failed.is_empty() => info!(
                        listed = report.listed,
                        staged = report.staged.len(),
                        failed = report.failed.len(),
                        already_processed = report.already_processed,
                        already_active = report.already_active,
                        "Poll tick complete"
                    ),
                    Ok(report) => debug!(listed = report.listed, "Poll tick found nothing new"),
                    Err(e) => error!(error = %e, "Poll tick skipped"),
                },
            }
        }

        info!("Staging coordinator stopped");
    }
}
