//! Local staging tree
//!
//! A staged file lives in exactly one of three directories and is identified by its base
//! name alone. Moving between them is always a rename, so the three directories must sit on
//! the same filesystem for the move to be atomic.

use ferry_common::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::LayoutConfig;

/// Where a staged file currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Being written by the staging coordinator
    Temporary,
    /// Ready for the watcher to pick up
    Active,
    /// Processed and archived
    Archived,
}

#[derive(Debug, Clone)]
pub struct StagingLayout {
    temp_dir: PathBuf,
    active_dir: PathBuf,
    archive_dir: PathBuf,
}

impl StagingLayout {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            temp_dir: config.temp_dir.clone(),
            active_dir: config.active_dir.clone(),
            archive_dir: config.archive_dir.clone(),
        }
    }

    /// Layout with all three directories under one root: `temp/`, `local/`, `trash/`
    pub fn under(root: &Path) -> Self {
        Self {
            temp_dir: root.join("temp"),
            active_dir: root.join("local"),
            archive_dir: root.join("trash"),
        }
    }

    /// Create any missing directory
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.temp_dir, &self.active_dir, &self.archive_dir] {
            std::fs::create_dir_all(dir)?;
            debug!(dir = %dir.display(), "Directory ready");
        }
        Ok(())
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn active_dir(&self) -> &Path {
        &self.active_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn path_in(&self, location: Location, name: &str) -> PathBuf {
        match location {
            Location::Temporary => self.temp_dir.join(name),
            Location::Active => self.active_dir.join(name),
            Location::Archived => self.archive_dir.join(name),
        }
    }

    /// Every location currently holding a file with this name.
    ///
    /// Outside of a rename in flight this has at most one element.
    pub fn locate(&self, name: &str) -> Vec<Location> {
        [Location::Temporary, Location::Active, Location::Archived]
            .into_iter()
            .filter(|location| self.path_in(*location, name).is_file())
            .collect()
    }
}

/// Final path component as UTF-8, if there is one
pub fn base_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}
