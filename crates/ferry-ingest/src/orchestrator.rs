//! Orchestrator
//!
//! Wires the pipeline together and owns its lifetime: one registry shared by the coordinator
//! and the archiver, the staging directories, the polling task, and the watch loop.
//!
//! Startup order matters. The watcher subscribes before the coordinator is spawned, otherwise a
//! file staged by the first tick could land in the active directory unobserved.

use ferry_common::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::archiver::Archiver;
use crate::config::IngestConfig;
use crate::layout::StagingLayout;
use crate::processor::Processor;
use crate::registry::ProcessedRegistry;
use crate::remote::RemoteSource;
use crate::staging::StagingCoordinator;
use crate::watcher::DirectoryWatcher;

pub struct IngestOrchestrator {
    config: IngestConfig,
    source: Arc<dyn RemoteSource>,
    registry: ProcessedRegistry,
}

impl IngestOrchestrator {
    pub fn new(config: IngestConfig, source: Arc<dyn RemoteSource>) -> Self {
        Self {
            config,
            source,
            registry: ProcessedRegistry::new(),
        }
    }

    /// Handle to the registry this orchestrator's pipeline writes to
    pub fn registry(&self) -> ProcessedRegistry {
        self.registry.clone()
    }

    /// Run until `cancel` fires.
    ///
    /// Returns an error only for startup failures: invalid configuration, directories that
    /// cannot be created, or a failed watch subscription. Everything after that is logged.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        self.config.validate()?;
        let filter = self.config.name_filter()?;

        let layout = StagingLayout::new(&self.config.layout);
        layout.ensure()?;

        let archiver = Archiver::new(layout.archive_dir(), self.registry.clone());
        let processor = Processor::new(self.registry.clone(), archiver);

        let watcher = DirectoryWatcher::new(
            layout.active_dir(),
            processor,
            self.config.timing.watch_settle(),
            cancel.clone(),
        )?;

        let coordinator = StagingCoordinator::new(
            self.source.clone(),
            layout,
            self.registry.clone(),
            filter,
        )
        .with_timing(&self.config.timing);

        // The coordinator gets its own child token so it can be stopped after the watcher
        let coordinator_cancel = cancel.child_token();
        let polling = tokio::spawn(coordinator.run(coordinator_cancel.clone()));

        info!(source = %self.source.describe(), "Ingestion pipeline running");
        watcher.run().await;

        coordinator_cancel.cancel();
        if let Err(e) = polling.await {
            error!(error = %e, "Staging coordinator task failed");
        }

        info!(processed = self.registry.len(), "Ingestion pipeline stopped");
        Ok(())
    }
}
