//! XDG Base Directory utilities.

use crate::error::SyncError;
use std::path::PathBuf;

/// Get XDG data home directory
///
/// Returns `$XDG_DATA_HOME` if set, otherwise defaults to `$HOME/.local/share`
pub fn data_home() -> Option<PathBuf> {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        if !xdg_data_home.is_empty() {
            return Some(PathBuf::from(xdg_data_home));
        }
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("share"))
}

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Some(PathBuf::from(xdg_config_home));
        }
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

/// `$XDG_CONFIG_HOME/collab/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    config_home().map(|home| home.join("collab").join("config.toml"))
}

/// `$XDG_DATA_HOME/collab/server`, where the coordination service keeps chunks
pub fn server_data_dir() -> Result<PathBuf, SyncError> {
    let data_home = data_home().ok_or_else(|| {
        SyncError::Config("Could not determine XDG data home directory (HOME not set)".to_string())
    })?;
    Ok(data_home.join("collab").join("server"))
}
