//! Configuration
//!
//! Layered configuration for both binaries: built-in defaults, an optional
//! global config file, an optional explicit file, `COLLAB__*` environment
//! variables, and finally `COLLAB_HOST` for the coordination endpoint.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod server;
pub mod sources;

use crate::logging::LoggingConfig;
use crate::types::MAX_BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use facade::ConfigLoader;
pub use server::ServerConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollabConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_coordinator_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

/// How participants reach the coordination service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Base URL, e.g. `http://localhost:8080`
    #[serde(default = "default_coordinator_url")]
    pub url: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            url: default_coordinator_url(),
            retry: RetryConfig::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl CoordinatorConfig {
    /// WebSocket base derived from the HTTP base URL.
    pub fn relay_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

/// Bounded exponential backoff for idempotent coordinator calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

fn default_block_size() -> usize {
    MAX_BLOCK_SIZE
}

fn default_watch_queue_capacity() -> usize {
    1024
}

/// Participant-side sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Chunking window; clamped to (0, 4 MiB]
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Filesystem notifications buffered between the watcher and the engine
    #[serde(default = "default_watch_queue_capacity")]
    pub watch_queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            watch_queue_capacity: default_watch_queue_capacity(),
        }
    }
}

impl SyncConfig {
    pub fn effective_block_size(&self) -> usize {
        self.block_size.clamp(1, MAX_BLOCK_SIZE)
    }
}
