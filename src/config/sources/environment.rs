//! Environment variable sources.
//!
//! `COLLAB__SECTION__KEY` overlays any nested key; `COLLAB_HOST` alone sets
//! the coordination endpoint.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Single-variable override for `coordinator.url`
pub const HOST_ENV_VAR: &str = "COLLAB_HOST";

/// Add environment variable overlay to builder.
/// Uses COLLAB prefix and __ as separator for nested keys.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("COLLAB")
            .separator("__")
            .try_parsing(true),
    );
    add_host_override(builder)
}

fn add_host_override(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let host = std::env::var(HOST_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty());
    builder.set_override_option("coordinator.url", host)
}
