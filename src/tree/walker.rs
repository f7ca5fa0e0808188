//! Read a directory on disk into a FileNode tree.
//!
//! Only metadata is captured here; chunk lists are filled in by the
//! chunking pipeline. Symlinks and special files are skipped.

use crate::error::SyncError;
use crate::tree::node::FileNode;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Root entries of the directory at `root`.
pub fn read_tree(root: &Path) -> Result<Vec<FileNode>, SyncError> {
    Ok(read_entry(root)?.children)
}

/// The entry at `path`; directories include their full subtree.
pub fn read_entry(path: &Path) -> Result<FileNode, SyncError> {
    let metadata = std::fs::symlink_metadata(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let top = FileNode::from_metadata(name, &metadata);
    if !top.is_dir {
        return Ok(top);
    }

    // stack[d] is the open directory at depth d
    let mut stack = vec![top];
    let walker = WalkDir::new(path)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || is_shareable(entry));
    for entry in walker {
        let entry = entry.map_err(|e| SyncError::Io(e.into()))?;
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        close_to_depth(&mut stack, entry.depth());
        let metadata = entry.metadata().map_err(|e| SyncError::Io(e.into()))?;
        stack.push(FileNode::from_metadata(name, &metadata));
    }
    close_to_depth(&mut stack, 1);
    stack
        .pop()
        .ok_or_else(|| SyncError::Consistency("walk produced no root".to_string()))
}

/// Rejected directories are pruned with their whole subtree.
fn is_shareable(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    if !file_type.is_dir() && !file_type.is_file() {
        debug!(path = %entry.path().display(), "Skipping non-regular entry");
        return false;
    }
    if entry.file_name().to_str().is_none() {
        warn!(path = %entry.path().display(), "Skipping entry with non UTF-8 name");
        return false;
    }
    true
}

fn close_to_depth(stack: &mut Vec<FileNode>, depth: usize) {
    while stack.len() > depth {
        let Some(done) = stack.pop() else { return };
        match stack.last_mut() {
            Some(parent) if parent.is_dir => parent.children.push(done),
            Some(_) => {}
            None => {
                stack.push(done);
                return;
            }
        }
    }
}
