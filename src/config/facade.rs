//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::CollabConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, from `path` when given, otherwise from the
    /// standard locations; environment variables apply either way.
    pub fn load(path: Option<&Path>) -> Result<CollabConfig, ConfigError> {
        match path {
            Some(path) => MergeService::load_from_file(path),
            None => MergeService::load(),
        }
    }

    /// Create default configuration.
    pub fn default() -> CollabConfig {
        CollabConfig::default()
    }
}
