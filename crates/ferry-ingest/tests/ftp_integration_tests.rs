//! Integration tests against a live FTP server
//!
//! Marked `#[ignore]`; point the usual `FTP_*` variables at a server that has at least one file
//! matching `INGEST_NAME_PATTERN` and run:
//!
//! ```bash
//! cargo test -p ferry-ingest --test ftp_integration_tests -- --ignored --nocapture
//! ```

mod common;

use anyhow::Result;
use common::init_tracing;
use ferry_ingest::config::IngestConfig;
use ferry_ingest::remote::{normalize_remote_name, FtpSource, RemoteSource};
use tempfile::TempDir;
use tracing::info;

#[tokio::test]
#[ignore] // Only run when explicitly requested: cargo test -- --ignored
async fn test_list_and_fetch_real() -> Result<()> {
    init_tracing();
    let config = IngestConfig::from_env()?;
    let filter = config.name_filter()?;
    let source = FtpSource::new(config.ftp.clone());
    info!(source = %source.describe(), "Connecting");

    let mut session = source.connect().await?;
    let listing = session.list().await?;
    info!(entries = listing.len(), "Listed remote directory");

    let entry = listing
        .iter()
        .find(|entry| normalize_remote_name(entry).is_some_and(|name| filter.matches(&name)))
        .expect("remote directory has no matching file")
        .clone();

    let dir = TempDir::new()?;
    let dest = dir.path().join(normalize_remote_name(&entry).expect("normalised above"));
    let bytes = session.fetch(entry.trim(), &dest).await?;
    session.close().await;

    info!(file = %entry, bytes, "Fetched");
    assert_eq!(std::fs::metadata(&dest)?.len(), bytes);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_bad_credentials_are_rejected() -> Result<()> {
    init_tracing();
    let mut config = IngestConfig::from_env()?;
    config.ftp.username = "ferry-no-such-user".to_string();
    config.ftp.password = "wrong".to_string();

    let result = FtpSource::new(config.ftp).connect().await;
    assert!(result.is_err());
    Ok(())
}
