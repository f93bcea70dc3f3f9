//! Archiver
//!
//! Moves a processed file into the archive directory and records its name in the registry.
//! The rename runs with the registry locked and the name is added only if it succeeds, so a
//! name in the registry always has its file in the archive, and the staging coordinator never
//! observes a file that has left the active directory without being registered. Failures
//! are logged and reported through [`ArchiveOutcome`]; nothing is propagated.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::layout::base_name;
use crate::registry::ProcessedRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Moved to the contained path and registered
    Archived(PathBuf),
    /// The file was gone before it could be moved
    Missing,
    /// The move failed; the file stays where it was and is not registered
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Archiver {
    archive_dir: PathBuf,
    registry: ProcessedRegistry,
}

impl Archiver {
    pub fn new(archive_dir: impl Into<PathBuf>, registry: ProcessedRegistry) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            registry,
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub async fn archive(&self, path: &Path) -> ArchiveOutcome {
        let Some(name) = base_name(path) else {
            error!(path = %path.display(), "Cannot archive a path without a file name");
            return ArchiveOutcome::Failed("path has no file name".to_string());
        };

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            warn!(file = %name, path = %path.display(), "File no longer exists, nothing to archive");
            return ArchiveOutcome::Missing;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.archive_dir).await {
            error!(
                error = %e,
                dir = %self.archive_dir.display(),
                "Failed to create archive directory"
            );
            return ArchiveOutcome::Failed(e.to_string());
        }

        let target = self.archive_dir.join(name);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            warn!(file = %name, "Replacing a previously archived file with the same name");
        }

        let moved = {
            let registry = self.registry.clone();
            let (key, from, to) = (name.to_string(), path.to_path_buf(), target.clone());
            tokio::task::spawn_blocking(move || {
                registry.commit_with(&key, || std::fs::rename(&from, &to))
            })
            .await
        };

        let moved = match moved {
            Ok(moved) => moved,
            Err(e) => {
                error!(error = %e, file = %name, "Archive task failed");
                return ArchiveOutcome::Failed(e.to_string());
            }
        };

        match moved {
            Ok(()) => {
                info!(file = %name, archive = %target.display(), "Archived file");
                ArchiveOutcome::Archived(target)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(file = %name, "File disappeared while archiving");
                ArchiveOutcome::Missing
            }
            Err(e) => {
                error!(
                    error = %e,
                    file = %name,
                    archive = %target.display(),
                    "Failed to move file to archive"
                );
                ArchiveOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_archive_moves_then_registers() {
        let root = TempDir::new().unwrap();
        let active = root.path().join("local");
        std::fs::create_dir_all(&active).unwrap();
        let file = active.join("report1.xml");
        std::fs::write(&file, "<root/>").unwrap();

        let registry = ProcessedRegistry::new();
        // Archive directory is created on demand
        let archiver = Archiver::new(root.path().join("trash"), registry.clone());

        let outcome = archiver.archive(&file).await;
        let archived = root.path().join("trash").join("report1.xml");
        assert_eq!(outcome, ArchiveOutcome::Archived(archived.clone()));
        assert!(!file.exists());
        assert!(archived.is_file());
        assert!(registry.contains("report1.xml"));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_registered() {
        let root = TempDir::new().unwrap();
        let registry = ProcessedRegistry::new();
        let archiver = Archiver::new(root.path().join("trash"), registry.clone());

        let outcome = archiver.archive(&root.path().join("gone.xml")).await;
        assert_eq!(outcome, ArchiveOutcome::Missing);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_move_leaves_file_and_registry_alone() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("report1.xml");
        std::fs::write(&file, "<root/>").unwrap();

        // A regular file where the archive directory should be
        let blocked = root.path().join("trash");
        std::fs::write(&blocked, "not a directory").unwrap();

        let registry = ProcessedRegistry::new();
        let archiver = Archiver::new(&blocked, registry.clone());

        let outcome = archiver.archive(&file).await;
        assert!(matches!(outcome, ArchiveOutcome::Failed(_)));
        assert!(file.is_file());
        assert!(!registry.contains("report1.xml"));
    }
}
