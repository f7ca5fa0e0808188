//! Canonical relative paths used as PathIndex keys and on the wire.
//!
//! A canonical path is `/`-separated, relative to the share root, has no
//! leading `./`, no empty segments, and no `.` or `..` segments.

use crate::error::SyncError;
use std::path::{Component, Path, PathBuf};

/// Validate and normalize a path received from a peer.
pub fn canonicalize(path: &str) -> Result<String, SyncError> {
    let trimmed = path.strip_prefix("./").unwrap_or(path);
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." | ".." => {
                return Err(SyncError::Consistency(format!(
                    "invalid relative path {:?}",
                    path
                )))
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Canonical key for `path` relative to `root`, if `path` lies under it.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => segments.push(name.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Split into (parent, last segment). Root-level paths have no parent.
pub fn split_parent(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, path),
    }
}

/// Join a canonical key with a child name.
pub fn join(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{}/{}", parent, name),
        None => name.to_string(),
    }
}

/// Local filesystem location of a canonical key.
pub fn to_local(root: &Path, key: &str) -> PathBuf {
    key.split('/').fold(root.to_path_buf(), |acc, s| acc.join(s))
}
