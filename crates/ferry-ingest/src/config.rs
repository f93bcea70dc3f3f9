//! Ingestion configuration
//!
//! Everything is read from environment variables with fallback defaults; a `.env` file is
//! loaded by the binary before this runs.
//!
//! | Variable                     | Default        |
//! |------------------------------|----------------|
//! | `FTP_HOST`                   | `localhost`    |
//! | `FTP_PORT`                   | `21`           |
//! | `FTP_USER`                   | `anonymous`    |
//! | `FTP_PASSWORD`               | (empty)        |
//! | `FTP_REMOTE_DIR`             | `/`            |
//! | `INGEST_TEMP_DIR`            | `temp`         |
//! | `INGEST_ACTIVE_DIR`          | `local`        |
//! | `INGEST_ARCHIVE_DIR`         | `trash`        |
//! | `INGEST_POLL_INTERVAL_SECS`  | `10`           |
//! | `INGEST_STAGE_SETTLE_MS`     | `1000`         |
//! | `INGEST_WATCH_SETTLE_MS`     | `2000`         |
//! | `INGEST_NAME_PATTERN`        | `(?i)\.xml$`   |

use ferry_common::{FerryError, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::remote::NameFilter;

pub const DEFAULT_NAME_PATTERN: &str = r"(?i)\.xml$";

/// Connection parameters for the FTP remote source
#[derive(Clone, Serialize)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Directory to change into after login; listings are relative to it
    pub remote_dir: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: String::new(),
            remote_dir: "/".to_string(),
        }
    }
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remote_dir", &self.remote_dir)
            .finish()
    }
}

impl FtpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The three local directories a staged file moves through
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LayoutConfig {
    pub temp_dir: PathBuf,
    pub active_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp"),
            active_dir: PathBuf::from("local"),
            archive_dir: PathBuf::from("trash"),
        }
    }
}

/// Poll cadence and settling delays
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimingConfig {
    pub poll_interval_secs: u64,
    /// Pause between finishing a download and promoting it to the active directory
    pub stage_settle_ms: u64,
    /// Pause between seeing an arrival and reading the file
    pub watch_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            stage_settle_ms: 1000,
            watch_settle_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stage_settle(&self) -> Duration {
        Duration::from_millis(self.stage_settle_ms)
    }

    pub fn watch_settle(&self) -> Duration {
        Duration::from_millis(self.watch_settle_ms)
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize)]
pub struct IngestConfig {
    pub ftp: FtpConfig,
    pub layout: LayoutConfig,
    pub timing: TimingConfig,
    /// Regex a remote name must match to be staged
    pub name_pattern: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ftp: FtpConfig::default(),
            layout: LayoutConfig::default(),
            timing: TimingConfig::default(),
            name_pattern: DEFAULT_NAME_PATTERN.to_string(),
        }
    }
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            ftp: FtpConfig {
                host: lookup("FTP_HOST").unwrap_or(defaults.ftp.host),
                port: parse_or(&lookup, "FTP_PORT", defaults.ftp.port)?,
                username: lookup("FTP_USER").unwrap_or(defaults.ftp.username),
                password: lookup("FTP_PASSWORD").unwrap_or(defaults.ftp.password),
                remote_dir: lookup("FTP_REMOTE_DIR").unwrap_or(defaults.ftp.remote_dir),
            },
            layout: LayoutConfig {
                temp_dir: lookup("INGEST_TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.layout.temp_dir),
                active_dir: lookup("INGEST_ACTIVE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.layout.active_dir),
                archive_dir: lookup("INGEST_ARCHIVE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.layout.archive_dir),
            },
            timing: TimingConfig {
                poll_interval_secs: parse_or(
                    &lookup,
                    "INGEST_POLL_INTERVAL_SECS",
                    defaults.timing.poll_interval_secs,
                )?,
                stage_settle_ms: parse_or(
                    &lookup,
                    "INGEST_STAGE_SETTLE_MS",
                    defaults.timing.stage_settle_ms,
                )?,
                watch_settle_ms: parse_or(
                    &lookup,
                    "INGEST_WATCH_SETTLE_MS",
                    defaults.timing.watch_settle_ms,
                )?,
            },
            name_pattern: lookup("INGEST_NAME_PATTERN").unwrap_or(defaults.name_pattern),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ftp.host.trim().is_empty() {
            return Err(FerryError::config("FTP_HOST must not be empty"));
        }
        if self.ftp.port == 0 {
            return Err(FerryError::config("FTP_PORT must be greater than 0"));
        }
        if self.timing.poll_interval_secs == 0 {
            return Err(FerryError::config(
                "INGEST_POLL_INTERVAL_SECS must be greater than 0",
            ));
        }

        let LayoutConfig {
            temp_dir,
            active_dir,
            archive_dir,
        } = &self.layout;
        if temp_dir == active_dir || temp_dir == archive_dir || active_dir == archive_dir {
            return Err(FerryError::config(
                "INGEST_TEMP_DIR, INGEST_ACTIVE_DIR and INGEST_ARCHIVE_DIR must be distinct",
            ));
        }

        self.name_filter()?;
        Ok(())
    }

    pub fn name_filter(&self) -> Result<NameFilter> {
        NameFilter::new(&self.name_pattern)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FerryError::config(format!("{key}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.ftp.host, "localhost");
        assert_eq!(config.ftp.port, 21);
        assert_eq!(config.layout.active_dir, PathBuf::from("local"));
        assert_eq!(config.timing.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.name_pattern, DEFAULT_NAME_PATTERN);
    }

    #[test]
    fn test_overrides() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("FTP_HOST", "ftp.internal"),
            ("FTP_PORT", "2121"),
            ("FTP_USER", "ingest"),
            ("FTP_PASSWORD", "s3cret"),
            ("INGEST_ACTIVE_DIR", "/srv/ferry/active"),
            ("INGEST_WATCH_SETTLE_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.ftp.address(), "ftp.internal:2121");
        assert_eq!(config.ftp.username, "ingest");
        assert_eq!(config.layout.active_dir, PathBuf::from("/srv/ferry/active"));
        assert_eq!(config.timing.watch_settle(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = IngestConfig::from_lookup(lookup_from(&[("FTP_PORT", "ftp")])).unwrap_err();
        assert!(err.to_string().contains("FTP_PORT"));

        let err = IngestConfig::from_lookup(lookup_from(&[("FTP_PORT", "0")])).unwrap_err();
        assert!(matches!(err, FerryError::Config(_)));
    }

    #[test]
    fn test_overlapping_directories_are_rejected() {
        let result = IngestConfig::from_lookup(lookup_from(&[
            ("INGEST_TEMP_DIR", "data"),
            ("INGEST_ACTIVE_DIR", "data"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let result = IngestConfig::from_lookup(lookup_from(&[("INGEST_NAME_PATTERN", "(")]));
        assert!(matches!(result, Err(FerryError::Config(_))));
    }

    #[test]
    fn test_password_is_redacted() {
        let config = IngestConfig::from_lookup(lookup_from(&[("FTP_PASSWORD", "hunter2")])).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
        assert!(!serde_json::to_string(&config).unwrap().contains("hunter2"));
    }
}
