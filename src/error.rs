//! Error types
//!
//! `StorageError` covers the coordination service's persistent state (chunk
//! files on disk). `SyncError` covers everything a participant does: talking
//! to the coordination service, maintaining the tree, and touching the local
//! filesystem.

use thiserror::Error;

/// Errors raised by the server-side chunk store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid chunk digest: {0}")]
    InvalidDigest(String),

    #[error("Digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch { expected: String, computed: String },

    #[error("Chunk too large: {size} bytes (limit {limit})")]
    ChunkTooLarge { size: usize, limit: usize },

    #[error("Chunk not found: {0}")]
    NotFound(String),
}

/// Errors raised by a participant's sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Share name already in use: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tree consistency error: {0}")]
    Consistency(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Directory is not empty: {0}")]
    NotEmpty(String),

    #[error("Share ended: {0}")]
    ShareEnded(String),
}

impl SyncError {
    /// Whether a failed coordinator call may be attempted again.
    ///
    /// Only transport failures qualify; every request the client issues is
    /// idempotent, so repeating one is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(format!("relay: {}", err))
    }
}

impl From<notify::Error> for SyncError {
    fn from(err: notify::Error) -> Self {
        SyncError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("watcher: {}", err),
        ))
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("blocking task failed: {}", err),
        ))
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}
