//! Application error types
//!
//! Process-level errors surfaced by the binary. Per-connection failures never
//! reach this type; they are absorbed by the reconnect loop.

use crate::config::ConfigError;
use std::path::PathBuf;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No tokens found in {0}")]
    NoTokens(PathBuf),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::NoTokens(_) => 78, // EX_CONFIG
            Self::Io { .. } => 74,                      // EX_IOERR
            Self::Internal(_) => 1,
        }
    }

    /// Wrap an I/O error with the path it came from
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
