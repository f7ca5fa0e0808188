//! ServerConfig and data directory resolution for the coordination service.

use crate::config::paths::xdg_root;
use crate::error::SyncError;
use crate::types::MAX_BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_relay_queue_capacity() -> usize {
    256
}

fn default_max_chunk_bytes() -> usize {
    MAX_BLOCK_SIZE
}

fn default_max_snapshot_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// Coordination service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Chunk storage root; None means the platform data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Outbound messages buffered per relay peer before it is dropped
    #[serde(default = "default_relay_queue_capacity")]
    pub relay_queue_capacity: usize,

    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// Upper bound on a published tree snapshot body
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_snapshot_bytes: usize,

    /// Recompute digests of uploaded chunks and reject mismatches
    #[serde(default = "default_true")]
    pub verify_digests: bool,
}

impl ServerConfig {
    /// Resolve the chunk storage root.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, SyncError> {
        match &self.data_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(dir.clone()),
            _ => xdg_root::server_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_dir: None,
            relay_queue_capacity: default_relay_queue_capacity(),
            max_chunk_bytes: default_max_chunk_bytes(),
            max_snapshot_bytes: default_max_snapshot_bytes(),
            verify_digests: default_true(),
        }
    }
}
