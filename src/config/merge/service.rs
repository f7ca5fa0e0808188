//! MergeService: orchestrates sources, applies precedence, deserializes to CollabConfig.

use crate::config::sources::{environment, global_file};
use crate::config::CollabConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: defaults (lowest) -> global file -> environment (highest).
    pub fn load() -> Result<CollabConfig, ConfigError> {
        let builder = Self::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    /// The global file is skipped when an explicit file is given.
    pub fn load_from_file(path: &Path) -> Result<CollabConfig, ConfigError> {
        let builder = Self::builder_with_defaults()?;
        let builder = global_file::add_explicit_to_builder(builder, path)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = Config::try_from(&CollabConfig::default())?;
        Ok(Config::builder().add_source(defaults))
    }
}
