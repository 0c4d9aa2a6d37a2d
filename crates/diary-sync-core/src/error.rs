//! Error types for diary-sync-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using diary-sync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in diary-sync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Sync configuration failed validation; fatal to `start`, never retried
    #[error("Invalid sync configuration: {0}")]
    ConfigInvalid(String),

    /// Remote exchange failed; retried on the next scheduled trigger
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Remote exchange did not finish in time
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the next scheduled cycle may succeed without user action.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}
