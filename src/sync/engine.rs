//! Reconciliation Engine
//!
//! Classifies local watcher notifications and remote relay events against
//! the shared tree and decides what to upload, what to write to disk, and
//! what to suppress. The tree sits behind one async mutex held for the
//! whole handling of an event, so local and remote events touching the
//! same path are applied one at a time.

use super::events::{EventKind, FileEvent, LocalChange, LocalKind};
use super::materialize;
use super::watch::PathWatcher;
use crate::chunking;
use crate::client::ChunkRemote;
use crate::error::SyncError;
use crate::tree::{path, walker, FileNode, Tree};
use crate::types::is_unchanged;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What handling a remote event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Written to disk and recorded in the tree
    Applied,
    /// Already reflected locally; nothing was touched
    Skipped,
}

pub struct Reconciler {
    root: PathBuf,
    tree: Mutex<Tree>,
    remote: Arc<dyn ChunkRemote>,
    watcher: Arc<dyn PathWatcher>,
    block_size: usize,
}

impl Reconciler {
    pub fn new(
        root: PathBuf,
        tree: Tree,
        remote: Arc<dyn ChunkRemote>,
        watcher: Arc<dyn PathWatcher>,
        block_size: usize,
    ) -> Self {
        Self {
            root,
            tree: Mutex::new(tree),
            remote,
            watcher,
            block_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn snapshot(&self) -> Vec<FileNode> {
        self.tree.lock().await.snapshot()
    }

    /// Tracked node at `path`, without children.
    pub async fn lookup(&self, path: &str) -> Option<FileNode> {
        self.tree.lock().await.lookup(path).cloned()
    }

    /// Register the share root and every tracked path with the watcher.
    pub async fn watch_all(&self) -> Result<(), SyncError> {
        let tree = self.tree.lock().await;
        self.watcher.watch(&self.root)?;
        for key in tree.paths() {
            self.watch_key(&key);
        }
        info!(root = %self.root.display(), paths = tree.len(), "Registered watches");
        Ok(())
    }

    /// Handle one local notification. Returns the event to broadcast, if
    /// any; its `local` flag is set.
    pub async fn handle_local(&self, change: &LocalChange) -> Result<Option<FileEvent>, SyncError> {
        match change.kind {
            LocalKind::Create => self.local_create(&change.path).await,
            LocalKind::Write => self.local_write(&change.path).await,
            LocalKind::Remove => Err(SyncError::Unsupported(format!(
                "local remove of {}",
                change.path
            ))),
            LocalKind::Chmod => Ok(None),
        }
    }

    /// Apply one event received from the relay. Never produces a broadcast.
    pub async fn handle_remote(&self, event: FileEvent) -> Result<RemoteOutcome, SyncError> {
        let key = path::canonicalize(&event.path)?;
        match event.kind {
            EventKind::Create => self.remote_create(&key, event).await,
            EventKind::Write => self.remote_write(&key, event).await,
            EventKind::Remove => Err(SyncError::Unsupported(format!("remote remove of {}", key))),
        }
    }

    async fn local_create(&self, key: &str) -> Result<Option<FileEvent>, SyncError> {
        let mut tree = self.tree.lock().await;
        if tree.is_tracked(key) {
            // our own materialization, or a duplicate notification
            self.watch_key(key);
            return Ok(None);
        }

        let location = path::to_local(&self.root, key);
        let entry_location = location.clone();
        let mut node =
            tokio::task::spawn_blocking(move || walker::read_entry(&entry_location)).await??;
        chunking::upload_node(self.remote.as_ref(), &location, &mut node, self.block_size).await?;
        tree.insert(key, node.clone())?;

        let mut keys = Vec::with_capacity(node.subtree_len());
        collect_keys(key, &node, &mut keys);
        for new_key in &keys {
            self.watch_key(new_key);
        }
        info!(path = %key, nodes = keys.len(), is_dir = node.is_dir, "Local create");
        Ok(Some(FileEvent::local(EventKind::Create, key, None, Some(node))))
    }

    async fn local_write(&self, key: &str) -> Result<Option<FileEvent>, SyncError> {
        let mut tree = self.tree.lock().await;
        let tracked = tree
            .lookup(key)
            .ok_or_else(|| SyncError::Consistency(format!("write to untracked path {}", key)))?;
        if tracked.is_dir {
            return Ok(None);
        }
        let previous = tracked.chunks.clone();

        let location = path::to_local(&self.root, key);
        let metadata = tokio::fs::metadata(&location).await?;
        if metadata.is_dir() {
            return Err(SyncError::Consistency(format!(
                "{} was a file and is now a directory",
                key
            )));
        }
        let chunks = chunking::upload_file(self.remote.as_ref(), &location, self.block_size).await?;
        if is_unchanged(Some(&previous), &chunks) {
            debug!(path = %key, blocks = chunks.len(), "Local write unchanged, suppressed");
            return Ok(None);
        }

        let (_, name) = path::split_parent(key);
        let mut node = FileNode::from_metadata(name, &metadata);
        node.chunks = chunks;
        let previous = tree.update_content(key, &node)?;
        info!(
            path = %key,
            before = previous.len(),
            after = node.chunks.len(),
            "Local write"
        );
        Ok(Some(FileEvent::local(
            EventKind::Write,
            key,
            Some(previous),
            Some(node),
        )))
    }

    async fn remote_create(&self, key: &str, event: FileEvent) -> Result<RemoteOutcome, SyncError> {
        let node = event
            .file
            .ok_or_else(|| SyncError::Consistency(format!("create of {} without a node", key)))?;
        node.validate()?;

        let mut tree = self.tree.lock().await;
        if tree.is_tracked(key) {
            debug!(path = %key, "Remote create already tracked");
            return Ok(RemoteOutcome::Skipped);
        }
        // Every tree check runs before anything reaches the disk.
        tree.check_insert(key, &node)?;

        let location = path::to_local(&self.root, key);
        materialize::materialize(self.remote.as_ref(), &location, &node).await?;
        let mut keys = Vec::with_capacity(node.subtree_len());
        collect_keys(key, &node, &mut keys);
        tree.insert(key, node)?;
        for new_key in &keys {
            self.watch_key(new_key);
        }
        info!(path = %key, nodes = keys.len(), "Remote create applied");
        Ok(RemoteOutcome::Applied)
    }

    async fn remote_write(&self, key: &str, event: FileEvent) -> Result<RemoteOutcome, SyncError> {
        if event.is_unchanged() {
            debug!(path = %key, "Remote write carries no change");
            return Ok(RemoteOutcome::Skipped);
        }
        let node = event
            .file
            .ok_or_else(|| SyncError::Consistency(format!("write of {} without a node", key)))?;

        let mut tree = self.tree.lock().await;
        let tracked = tree
            .lookup(key)
            .ok_or_else(|| SyncError::Consistency(format!("remote write to untracked path {}", key)))?;
        if tracked.is_dir || node.is_dir {
            return Err(SyncError::Consistency(format!(
                "remote write to directory {}",
                key
            )));
        }
        if is_unchanged(Some(&tracked.chunks), &node.chunks) {
            debug!(path = %key, "Remote write already applied");
            return Ok(RemoteOutcome::Skipped);
        }

        let location = path::to_local(&self.root, key);
        materialize::overwrite(self.remote.as_ref(), &location, &node).await?;
        tree.update_content(key, &node)?;
        info!(path = %key, blocks = node.chunks.len(), "Remote write applied");
        Ok(RemoteOutcome::Applied)
    }

    fn watch_key(&self, key: &str) {
        let location = path::to_local(&self.root, key);
        if let Err(e) = self.watcher.watch(&location) {
            warn!(path = %key, error = %e, "Failed to register watch");
        }
    }
}

fn collect_keys(key: &str, node: &FileNode, out: &mut Vec<String>) {
    out.push(key.to_string());
    for child in &node.children {
        collect_keys(&path::join(Some(key), &child.name), child, out);
    }
}
