//! File events exchanged over the relay, and local watcher notifications.

use crate::error::SyncError;
use crate::tree::{path, FileNode};
use crate::types::{self, ChunkDigest};
use bytes::Bytes;
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Create,
    Write,
    Remove,
}

/// One change, as broadcast between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: EventKind,
    /// Canonical path relative to the share root
    pub path: String,
    /// Digest list before a Write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_chunks: Option<Vec<ChunkDigest>>,
    /// Resulting node; for a directory Create this carries the subtree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileNode>,
    /// Originated on this machine; always false once on the wire
    #[serde(default)]
    pub local: bool,
}

impl FileEvent {
    pub fn local(
        kind: EventKind,
        path: impl Into<String>,
        previous_chunks: Option<Vec<ChunkDigest>>,
        file: Option<FileNode>,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            previous_chunks,
            file,
            local: true,
        }
    }

    /// The event's previous digest list equals its resulting one.
    pub fn is_unchanged(&self) -> bool {
        match &self.file {
            Some(file) => types::is_unchanged(self.previous_chunks.as_deref(), &file.chunks),
            None => false,
        }
    }

    /// Encode for the relay with `local` cleared, so a receiving peer never
    /// treats it as its own change.
    pub fn to_wire(&self) -> Result<Bytes, SyncError> {
        let mut outbound = self.clone();
        outbound.local = false;
        Ok(Bytes::from(serde_json::to_vec(&outbound)?))
    }

    pub fn from_wire(payload: &[u8]) -> Result<Self, SyncError> {
        let mut event: FileEvent = serde_json::from_slice(payload)?;
        event.local = false;
        Ok(event)
    }
}

/// Kinds of local filesystem notification the engine classifies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Create,
    Write,
    Remove,
    Chmod,
}

/// A watcher notification mapped onto a share path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChange {
    pub kind: LocalKind,
    pub path: String,
}

impl LocalChange {
    pub fn new(kind: LocalKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Map a raw notify event onto share paths under `root`.
///
/// Renames become a Remove of the old name and a Create of the new one.
/// Paths outside the share, and the share root itself, are dropped.
pub fn classify(root: &Path, event: &notify::Event) -> Vec<LocalChange> {
    use notify::EventKind as Raw;

    let keyed = |kind: LocalKind, p: &Path| {
        path::relative_key(root, p).map(|key| LocalChange::new(kind, key))
    };

    match &event.kind {
        Raw::Create(_) => event
            .paths
            .iter()
            .filter_map(|p| keyed(LocalKind::Create, p))
            .collect(),
        Raw::Remove(_) => event
            .paths
            .iter()
            .filter_map(|p| keyed(LocalKind::Remove, p))
            .collect(),
        Raw::Modify(ModifyKind::Metadata(_)) => event
            .paths
            .iter()
            .filter_map(|p| keyed(LocalKind::Chmod, p))
            .collect(),
        Raw::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => event
                .paths
                .iter()
                .filter_map(|p| keyed(LocalKind::Remove, p))
                .collect(),
            RenameMode::To => event
                .paths
                .iter()
                .filter_map(|p| keyed(LocalKind::Create, p))
                .collect(),
            RenameMode::Both if event.paths.len() >= 2 => keyed(LocalKind::Remove, &event.paths[0])
                .into_iter()
                .chain(keyed(LocalKind::Create, &event.paths[1]))
                .collect(),
            _ => event
                .paths
                .iter()
                .filter_map(|p| {
                    let kind = if p.exists() {
                        LocalKind::Create
                    } else {
                        LocalKind::Remove
                    };
                    keyed(kind, p)
                })
                .collect(),
        },
        Raw::Modify(_) => event
            .paths
            .iter()
            .filter_map(|p| keyed(LocalKind::Write, p))
            .collect(),
        Raw::Access(_) | Raw::Any | Raw::Other => Vec::new(),
    }
}
