//! Error types for Ferry

use thiserror::Error;

/// Result type alias for Ferry operations
pub type Result<T> = std::result::Result<T, FerryError>;

/// Main error type for Ferry
///
/// Per-file and per-tick failures are logged where they happen and never reach this type;
/// it carries the failures that stop a component from starting at all.
#[derive(Error, Debug)]
pub enum FerryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote source error: {0}")]
    Remote(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Watch error: {0}")]
    Watch(String),
}

impl FerryError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        FerryError::Config(msg.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FerryError = io.into();
        assert!(matches!(err, FerryError::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }

    #[test]
    fn test_config_display() {
        let err = FerryError::config("FTP_PORT must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Configuration error: FTP_PORT must be greater than 0"
        );
    }
}
