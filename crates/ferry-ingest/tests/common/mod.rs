//! Shared fixtures for ferry-ingest integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use ferry_ingest::archiver::Archiver;
use ferry_ingest::config::{IngestConfig, LayoutConfig, TimingConfig, DEFAULT_NAME_PATTERN};
use ferry_ingest::layout::{Location, StagingLayout};
use ferry_ingest::processor::Processor;
use ferry_ingest::registry::ProcessedRegistry;
use ferry_ingest::remote::{MemorySource, NameFilter};
use ferry_ingest::staging::StagingCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ferry_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Timings short enough for tests
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        poll_interval_secs: 1,
        stage_settle_ms: 0,
        watch_settle_ms: 50,
    }
}

/// Staging directories under a temp root plus the components that operate on them, all sharing
/// one registry
pub struct Pipeline {
    pub root: TempDir,
    pub layout: StagingLayout,
    pub registry: ProcessedRegistry,
    pub source: MemorySource,
    pub coordinator: StagingCoordinator,
    pub processor: Processor,
}

impl Pipeline {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let layout = StagingLayout::under(root.path());
        layout.ensure().unwrap();

        let registry = ProcessedRegistry::new();
        let source = MemorySource::new();
        let coordinator = StagingCoordinator::new(
            Arc::new(source.clone()),
            layout.clone(),
            registry.clone(),
            NameFilter::new(DEFAULT_NAME_PATTERN).unwrap(),
        )
        .with_timing(&fast_timing());
        let processor = Processor::new(
            registry.clone(),
            Archiver::new(layout.archive_dir(), registry.clone()),
        );

        Self {
            root,
            layout,
            registry,
            source,
            coordinator,
            processor,
        }
    }

    pub fn active(&self, name: &str) -> PathBuf {
        self.layout.path_in(Location::Active, name)
    }

    pub fn archived(&self, name: &str) -> PathBuf {
        self.layout.path_in(Location::Archived, name)
    }

    /// Ingestion config pointing at this pipeline's directories
    pub fn config(&self) -> IngestConfig {
        IngestConfig {
            layout: LayoutConfig {
                temp_dir: self.layout.temp_dir().to_path_buf(),
                active_dir: self.layout.active_dir().to_path_buf(),
                archive_dir: self.layout.archive_dir().to_path_buf(),
            },
            timing: fast_timing(),
            ..IngestConfig::default()
        }
    }
}

/// Poll `check` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
