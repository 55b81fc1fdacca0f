//! Error types for Tierflow.
//!
//! The variants follow the failure taxonomy of the pipeline: authentication
//! problems are fatal for the calling operation, API failures are transient,
//! missing targets are terminal, and tagging/sync failures are per item.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main error type for the Tierflow library.
#[derive(Debug, Error)]
pub enum TierflowError {
    // Fabric errors
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Fabric API error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api {
        message: String,
        /// HTTP status when the fabric answered at all
        status: Option<u16>,
    },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    // Pipeline errors
    #[error("Tagging failed for {path}: {message}")]
    Tagging { path: String, message: String },

    #[error("Sync failed for {kind}: {message}")]
    Sync { kind: String, message: String },

    #[error("Timed out after {waited:?} waiting for job {job_id}")]
    Timeout { job_id: String, waited: Duration },

    #[error("Operation was cancelled")]
    Cancelled,

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Tierflow operations.
pub type Result<T> = std::result::Result<T, TierflowError>;

impl From<std::io::Error> for TierflowError {
    fn from(err: std::io::Error) -> Self {
        TierflowError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TierflowError {
    fn from(err: serde_json::Error) -> Self {
        TierflowError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for TierflowError {
    fn from(err: rusqlite::Error) -> Self {
        TierflowError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for TierflowError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("fabric unreachable: {}", err)
        } else {
            err.to_string()
        };
        TierflowError::Api {
            message,
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

impl TierflowError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        TierflowError::Io {
            message: format!("{}: {}", path.display(), err),
            path: Some(path.to_path_buf()),
            source: Some(err),
        }
    }

    /// Create a database error without an underlying rusqlite error.
    pub fn database(message: impl Into<String>) -> Self {
        TierflowError::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid-parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        TierflowError::InvalidParams {
            message: message.into(),
        }
    }

    /// Create a not-found error for a resource description.
    pub fn not_found(resource: impl Into<String>) -> Self {
        TierflowError::NotFound {
            resource: resource.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            TierflowError::Api { .. } => -32000,
            TierflowError::Authentication { .. } => -32001,
            TierflowError::NotFound { .. } => -32002,
            TierflowError::Tagging { .. } | TierflowError::Sync { .. } => -32003,
            TierflowError::Timeout { .. } | TierflowError::Cancelled => -32004,
            TierflowError::Config { .. } => -32005,
            TierflowError::InvalidParams { .. } => -32602,
            _ => -32603, // Internal error
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only fabric API failures qualify. Authentication and not-found
    /// failures are terminal for the target and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TierflowError::Api { .. })
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            TierflowError::Authentication { .. } => "authentication",
            TierflowError::Api { .. } => "api",
            TierflowError::NotFound { .. } => "not_found",
            TierflowError::Tagging { .. } => "tagging",
            TierflowError::Sync { .. } => "sync",
            TierflowError::Timeout { .. } => "timeout",
            TierflowError::Cancelled => "cancelled",
            TierflowError::Database { .. } => "database",
            TierflowError::Io { .. } => "io",
            TierflowError::Json { .. } => "json",
            TierflowError::Config { .. } => "config",
            TierflowError::InvalidParams { .. } => "invalid_params",
            TierflowError::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TierflowError::Api {
            message: "bad gateway".into(),
            status: Some(502),
        };
        assert_eq!(err.to_string(), "Fabric API error (502): bad gateway");

        let err = TierflowError::Api {
            message: "connection refused".into(),
            status: None,
        };
        assert_eq!(err.to_string(), "Fabric API error: connection refused");

        let err = TierflowError::Tagging {
            path: "/hub/a.txt".into(),
            message: "permission denied".into(),
        };
        assert_eq!(err.to_string(), "Tagging failed for /hub/a.txt: permission denied");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TierflowError::Api {
            message: "x".into(),
            status: Some(503)
        }
        .is_retryable());
        assert!(!TierflowError::Authentication {
            message: "x".into()
        }
        .is_retryable());
        assert!(!TierflowError::not_found("job 1").is_retryable());
        assert!(!TierflowError::Timeout {
            job_id: "j".into(),
            waited: Duration::from_secs(1)
        }
        .is_retryable());
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            TierflowError::Authentication { message: "x".into() }.to_rpc_error_code(),
            -32001
        );
        assert_eq!(TierflowError::not_found("x").to_rpc_error_code(), -32002);
        assert_eq!(TierflowError::invalid_params("x").to_rpc_error_code(), -32602);
        assert_eq!(TierflowError::Other("x".into()).to_rpc_error_code(), -32603);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TierflowError = io_err.into();
        assert!(matches!(err, TierflowError::Io { .. }));
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_io_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TierflowError::io_with_path(io_err, "/tmp/x");
        match err {
            TierflowError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/x"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
