//! Error types for s3kv-core
//!
//! Provides a unified error type that separates "not found" from every other
//! backend failure and can be converted to appropriate exit codes.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for s3kv-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for s3kv-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid location format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Profile not found
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Caller violated a precondition
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested key or bucket is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// Authentication or permission failure reported by the store
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network error (retries already exhausted)
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed JSON record
    #[error("Malformed JSON in {key}: {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Local filesystem failure (stat, mkdir, scan, read, write)
    #[error("Local filesystem error at {}: {source}", path.display())]
    LocalFs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Gzip stream failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// First failure of a multi-object operation
    #[error("{source} ({completed} item(s) completed before the failure)")]
    Batch {
        completed: u64,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Build a [`Error::LocalFs`] for `path`
    pub fn local_fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::LocalFs {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the key (or bucket) does not exist
    ///
    /// Looks through [`Error::Batch`] so bulk callers can tell a missing
    /// object apart from a real failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Batch { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Log this failure under a stable `code`; NotFound only at debug level
    pub fn log(&self, code: &'static str, target: &str) {
        if self.is_not_found() {
            tracing::debug!(code, target, "not found");
        } else {
            tracing::error!(code, target, error = %self, "operation failed");
        }
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::Config(_) | Error::InvalidArgument(_) => 2,
            Error::Network(_) => 3,
            Error::Auth(_) => 4,
            Error::NotFound(_) | Error::ProfileNotFound(_) => 5,
            Error::Batch { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(Error::InvalidPath("test".into()).exit_code(), 2);
        assert_eq!(Error::InvalidArgument("test".into()).exit_code(), 2);
        assert_eq!(Error::Network("test".into()).exit_code(), 3);
        assert_eq!(Error::Auth("test".into()).exit_code(), 4);
        assert_eq!(Error::NotFound("test".into()).exit_code(), 5);
        assert_eq!(Error::ProfileNotFound("test".into()).exit_code(), 5);
        assert_eq!(Error::Store("test".into()).exit_code(), 1);
        assert_eq!(Error::Compression("test".into()).exit_code(), 1);
    }

    #[test]
    fn test_batch_delegates_to_source() {
        let err = Error::Batch {
            completed: 4,
            source: Box::new(Error::NotFound("bucket/key".into())),
        };
        assert!(err.is_not_found());
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("4 item(s) completed"));
    }

    #[test]
    fn test_error_display() {
        let err = Error::ProfileNotFound("minio".into());
        assert_eq!(err.to_string(), "Profile not found: minio");

        let err = Error::local_fs(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing"));
        assert!(!err.is_not_found());
    }
}
