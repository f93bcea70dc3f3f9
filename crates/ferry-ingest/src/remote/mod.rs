//! Remote source seam
//!
//! The staging coordinator only needs four things from the place files come from: open a
//! session, list names, stream one file to a local path, and close. [`RemoteSource`] opens
//! sessions; [`RemoteSession`] does the rest. The FTP implementation lives in [`ftp`], an
//! in-process one for tests and dry runs in [`memory`].

pub mod ftp;
pub mod memory;

use async_trait::async_trait;
use ferry_common::FerryError;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

pub use ftp::FtpSource;
pub use memory::MemorySource;

/// Failures talking to a remote source
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Login rejected for user {username}: {reason}")]
    Auth { username: String, reason: String },

    #[error("Failed to list remote directory: {0}")]
    List(String),

    #[error("Failed to fetch {name}: {reason}")]
    Fetch { name: String, reason: String },

    #[error("Failed to write {path}: {source}")]
    LocalWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote session is closed")]
    Closed,

    #[error("Remote task failed: {0}")]
    Task(String),
}

impl From<RemoteError> for FerryError {
    fn from(e: RemoteError) -> Self {
        FerryError::Remote(e.to_string())
    }
}

/// Something files can be pulled from
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Open and authenticate a session.
    ///
    /// On failure no connection is left open.
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError>;

    /// Short human-readable identity for logs, e.g. `ftp://ingest@host:21/`
    fn describe(&self) -> String;
}

/// An open, authenticated connection to a remote source
#[async_trait]
pub trait RemoteSession: Send {
    /// Raw names in the remote working directory
    async fn list(&mut self) -> Result<Vec<String>, RemoteError>;

    /// Stream `name` into a new file at `dest`, returning the bytes written.
    ///
    /// On error `dest` may hold a partial file; the caller decides what to do with it.
    async fn fetch(&mut self, name: &str, dest: &Path) -> Result<u64, RemoteError>;

    /// End the session. Safe to call more than once; errors are logged, not returned.
    async fn close(&mut self);
}

/// Which remote names are eligible for staging
#[derive(Debug, Clone)]
pub struct NameFilter {
    pattern: Regex,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, FerryError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| FerryError::config(format!("Invalid name pattern {pattern:?}: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Reduce a listing entry to a bare file name that is safe to join onto a local directory.
///
/// Servers differ on whether `NLST` returns `a.xml`, `./a.xml` or `/in/a.xml`; all three
/// become `a.xml`. Entries that are empty or a directory reference yield `None`.
pub fn normalize_remote_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let name = trimmed.rsplit(['/', '\\']).next()?;
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}
