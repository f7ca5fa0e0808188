//! Tree Model and PathIndex
//!
//! Nodes live in an arena owned by [`Tree`]; parents refer to children by
//! [`NodeId`], which keeps ownership strictly hierarchical. The [`PathIndex`]
//! is a non-owning map from canonical path to arena slot. Every mutation
//! validates everything it needs before it touches either structure, so the
//! two are never observed out of step.

use crate::error::SyncError;
use crate::tree::node::FileNode;
use crate::tree::path;
use crate::types::ChunkDigest;
use std::collections::HashMap;

/// Arena slot identifier
pub type NodeId = usize;

struct Slot {
    /// Node metadata; `children` is always empty here, see `children`
    node: FileNode,
    children: Vec<NodeId>,
}

/// Canonical path -> arena slot
#[derive(Debug, Default)]
pub struct PathIndex {
    entries: HashMap<String, NodeId>,
}

impl PathIndex {
    pub fn get(&self, path: &str) -> Option<NodeId> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn insert(&mut self, path: String, id: NodeId) {
        self.entries.insert(path, id);
    }
}

/// In-memory shared directory tree
#[derive(Default)]
pub struct Tree {
    slots: Vec<Slot>,
    roots: Vec<NodeId>,
    index: PathIndex,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from the root entries of a snapshot.
    pub fn from_snapshot(entries: Vec<FileNode>) -> Result<Self, SyncError> {
        let mut tree = Self::new();
        for entry in entries {
            let key = entry.name.clone();
            tree.insert(&key, entry)?;
        }
        Ok(tree)
    }

    /// Root entries with their full subtrees, in insertion order.
    pub fn snapshot(&self) -> Vec<FileNode> {
        self.roots.iter().map(|id| self.subtree(*id)).collect()
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.index.contains(path)
    }

    /// Node metadata at `path`, without its children.
    pub fn lookup(&self, path: &str) -> Option<&FileNode> {
        self.index.get(path).map(|id| &self.slots[id].node)
    }

    /// Node at `path` with its full subtree.
    pub fn lookup_subtree(&self, path: &str) -> Option<FileNode> {
        self.index.get(path).map(|id| self.subtree(id))
    }

    /// Resolve `path` by walking from the root through child names,
    /// ignoring the index.
    pub fn walk(&self, path: &str) -> Option<NodeId> {
        let mut candidates = &self.roots;
        let mut found = None;
        for segment in path.split('/') {
            let id = candidates
                .iter()
                .copied()
                .find(|id| self.slots[*id].node.name == segment)?;
            candidates = &self.slots[id].children;
            found = Some(id);
        }
        found
    }

    /// Every tracked path, parents before children.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut stack: Vec<(Option<String>, NodeId)> =
            self.roots.iter().rev().map(|id| (None, *id)).collect();
        while let Some((parent, id)) = stack.pop() {
            let key = path::join(parent.as_deref(), &self.slots[id].node.name);
            for child in self.slots[id].children.iter().rev() {
                stack.push((Some(key.clone()), *child));
            }
            out.push(key);
        }
        out
    }

    /// Check that `node` could be attached at `path` without touching the
    /// tree. Returns the canonical key and the parent slot to attach under.
    ///
    /// Fails when the parent is missing or not a directory, when any path
    /// of the subtree is already tracked, or when the node breaks the
    /// file/directory invariant.
    pub fn check_insert(
        &self,
        path: &str,
        node: &FileNode,
    ) -> Result<(String, Option<NodeId>), SyncError> {
        let key = path::canonicalize(path)?;
        let (parent_key, name) = path::split_parent(&key);
        if node.name != name {
            return Err(SyncError::Consistency(format!(
                "node name {:?} does not match path {}",
                node.name, key
            )));
        }
        node.validate()?;

        let parent = match parent_key {
            None => None,
            Some(parent_key) => {
                let id = self.index.get(parent_key).ok_or_else(|| {
                    SyncError::Consistency(format!("missing parent {} for {}", parent_key, key))
                })?;
                if !self.slots[id].node.is_dir {
                    return Err(SyncError::Consistency(format!(
                        "parent {} of {} is not a directory",
                        parent_key, key
                    )));
                }
                Some(id)
            }
        };

        let mut new_keys = Vec::with_capacity(node.subtree_len());
        collect_keys(parent_key, node, &mut new_keys);
        let mut seen = std::collections::HashSet::with_capacity(new_keys.len());
        for new_key in &new_keys {
            if self.index.contains(new_key) || !seen.insert(new_key.as_str()) {
                return Err(SyncError::Consistency(format!("{} is already tracked", new_key)));
            }
        }
        Ok((key, parent))
    }

    /// Attach `node` (and any children it carries) at `path` and index
    /// every attached node. Nothing is mutated unless [`Tree::check_insert`]
    /// passes.
    pub fn insert(&mut self, path: &str, node: FileNode) -> Result<NodeId, SyncError> {
        let (key, parent) = self.check_insert(path, &node)?;
        let id = self.attach(key, node);
        match parent {
            Some(parent) => self.slots[parent].children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Replace the content metadata of the tracked file at `path`,
    /// returning its previous digest list.
    pub fn update_content(
        &mut self,
        path: &str,
        content: &FileNode,
    ) -> Result<Vec<ChunkDigest>, SyncError> {
        let id = self
            .index
            .get(path)
            .ok_or_else(|| SyncError::Consistency(format!("{} is not tracked", path)))?;
        let slot = &mut self.slots[id].node;
        if slot.is_dir || content.is_dir {
            return Err(SyncError::Consistency(format!(
                "content update for directory {}",
                path
            )));
        }
        slot.size = content.size;
        slot.mode = content.mode;
        slot.mod_time = content.mod_time;
        Ok(std::mem::replace(&mut slot.chunks, content.chunks.clone()))
    }

    /// Deletion is not propagated; shares currently only grow.
    pub fn remove(&mut self, path: &str) -> Result<(), SyncError> {
        Err(SyncError::Unsupported(format!("remove {}", path)))
    }

    fn attach(&mut self, key: String, mut node: FileNode) -> NodeId {
        let children = std::mem::take(&mut node.children);
        let id = self.slots.len();
        self.slots.push(Slot {
            node,
            children: Vec::with_capacity(children.len()),
        });
        for child in children {
            let child_key = path::join(Some(&key), &child.name);
            let child_id = self.attach(child_key, child);
            self.slots[id].children.push(child_id);
        }
        self.index.insert(key, id);
        id
    }

    fn subtree(&self, id: NodeId) -> FileNode {
        let slot = &self.slots[id];
        let mut node = slot.node.clone();
        node.children = slot.children.iter().map(|c| self.subtree(*c)).collect();
        node
    }
}

fn collect_keys(parent: Option<&str>, node: &FileNode, out: &mut Vec<String>) {
    let key = path::join(parent, &node.name);
    for child in &node.children {
        collect_keys(Some(&key), child, out);
    }
    out.push(key);
}
