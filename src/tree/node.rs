//! Filesystem node representation

use crate::error::SyncError;
use crate::types::ChunkDigest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;

/// One filesystem entry as published in a tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Last path segment
    pub name: String,
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    pub mod_time: DateTime<Utc>,
    pub is_dir: bool,
    /// Block digests in file order; empty for directories and empty files
    #[serde(default)]
    pub chunks: Vec<ChunkDigest>,
    /// Child entries; only populated for directories
    #[serde(default)]
    pub children: Vec<FileNode>,
}

impl FileNode {
    /// Build a node from filesystem metadata with no content or children yet.
    pub fn from_metadata(name: impl Into<String>, metadata: &Metadata) -> Self {
        let mod_time = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Self {
            name: name.into(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mode: permission_bits(metadata),
            mod_time,
            is_dir: metadata.is_dir(),
            chunks: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Check the file/directory exclusivity invariant for this node and
    /// every descendant.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.is_empty() || self.name.contains('/') || self.name == "." || self.name == ".." {
            return Err(SyncError::Consistency(format!(
                "invalid node name {:?}",
                self.name
            )));
        }
        if self.is_dir && !self.chunks.is_empty() {
            return Err(SyncError::Consistency(format!(
                "directory {} carries chunk data",
                self.name
            )));
        }
        if !self.is_dir && !self.children.is_empty() {
            return Err(SyncError::Consistency(format!(
                "file {} has children",
                self.name
            )));
        }
        self.children.iter().try_for_each(FileNode::validate)
    }

    /// Number of nodes in this subtree, including itself.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(FileNode::subtree_len).sum::<usize>()
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}
