//! Ferry Ingest Library
//!
//! Pulls XML documents from a remote FTP directory, stages them locally, extracts every tagged
//! value they contain, and archives them.
//!
//! # Pipeline
//!
//! - **Staging**: a polling task downloads new remote files into a temporary directory and
//!   renames them into the active directory once complete
//! - **Watching**: arrivals in the active directory are picked up from filesystem events
//! - **Processing**: each arrival is decoded and flattened into tag → values
//! - **Archiving**: processed files move to the archive directory and their names are
//!   registered so they are never fetched or processed again
//!
//! # Example
//!
//! ```no_run
//! use ferry_ingest::config::IngestConfig;
//! use ferry_ingest::orchestrator::IngestOrchestrator;
//! use ferry_ingest::remote::FtpSource;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let source = Arc::new(FtpSource::new(config.ftp.clone()));
//!     IngestOrchestrator::new(config, source)
//!         .run(CancellationToken::new())
//!         .await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod archiver;
pub mod config;
pub mod extract;
pub mod layout;
pub mod orchestrator;
pub mod processor;
pub mod registry;
pub mod remote;
pub mod staging;
pub mod watcher;
