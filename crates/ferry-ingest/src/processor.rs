//! Processor
//!
//! Handles one staged file: skip it if its name is already registered, otherwise decode,
//! log what was extracted, and archive. A file that fails to read or decode is left exactly
//! where it is, unarchived, and is not retried.

use std::path::Path;
use tracing::{error, info, instrument, warn};

use crate::archiver::{ArchiveOutcome, Archiver};
use crate::extract::{self, ExtractedRecord};
use crate::layout::base_name;
use crate::registry::ProcessedRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Name already in the registry; the file was not touched
    AlreadyProcessed,
    /// Decoded (possibly to an empty record) and handed to the archiver
    Extracted {
        record: ExtractedRecord,
        archive: ArchiveOutcome,
    },
    /// Could not be read; left in place
    Unreadable(String),
    /// Malformed document; left in place
    DecodeFailed(String),
}

#[derive(Debug, Clone)]
pub struct Processor {
    registry: ProcessedRegistry,
    archiver: Archiver,
}

impl Processor {
    pub fn new(registry: ProcessedRegistry, archiver: Archiver) -> Self {
        Self { registry, archiver }
    }

    #[instrument(skip_all, fields(file = %path.display()))]
    pub async fn process(&self, path: &Path) -> ProcessOutcome {
        let Some(name) = base_name(path) else {
            warn!("Ignoring path without a UTF-8 file name");
            return ProcessOutcome::Unreadable("path has no UTF-8 file name".to_string());
        };

        if self.registry.contains(name) {
            info!(file = %name, "Already processed, skipping");
            return ProcessOutcome::AlreadyProcessed;
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, file = %name, "Failed to read staged file");
                return ProcessOutcome::Unreadable(e.to_string());
            }
        };

        let root = match extract::decode(&bytes) {
            Ok(root) => root,
            Err(e) => {
                error!(
                    error = %e,
                    file = %name,
                    "Failed to decode XML, leaving file in place"
                );
                return ProcessOutcome::DecodeFailed(e.to_string());
            }
        };

        let record = extract::extract(&root);
        if record.is_empty() {
            info!(file = %name, "No values extracted");
        } else {
            match record.to_json() {
                Ok(json) => info!(
                    file = %name,
                    tags = record.len(),
                    values = record.value_count(),
                    record = %json,
                    "Extracted values"
                ),
                Err(e) => warn!(error = %e, file = %name, record = ?record, "Extracted values"),
            }
        }

        let archive = self.archiver.archive(path).await;
        ProcessOutcome::Extracted { record, archive }
    }
}
