//! Writing published nodes onto the local disk.

use crate::chunking;
use crate::client::ChunkRemote;
use crate::error::SyncError;
use crate::tree::FileNode;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Create `node` (and its subtree) at `location`.
///
/// Directories get their mode and modification time after their children
/// are written, so a read-only directory can still be populated.
pub async fn materialize(
    remote: &dyn ChunkRemote,
    location: &Path,
    node: &FileNode,
) -> Result<(), SyncError> {
    let mut pending: Vec<(PathBuf, &FileNode)> = vec![(location.to_path_buf(), node)];
    let mut directories: Vec<(PathBuf, &FileNode)> = Vec::new();
    while let Some((location, node)) = pending.pop() {
        if node.is_dir {
            match tokio::fs::create_dir(&location).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !tokio::fs::metadata(&location).await?.is_dir() {
                        return Err(e.into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
            for child in &node.children {
                pending.push((location.join(&child.name), child));
            }
            directories.push((location, node));
        } else {
            write_file(remote, &location, node).await?;
        }
    }
    // deepest first
    for (location, node) in directories.iter().rev() {
        apply_metadata(location, node).await;
    }
    Ok(())
}

/// Replace the content of the file at `location` with `node`'s blocks.
pub async fn overwrite(
    remote: &dyn ChunkRemote,
    location: &Path,
    node: &FileNode,
) -> Result<(), SyncError> {
    let data = chunking::assemble(remote, &node.chunks).await?;
    tokio::fs::write(location, &data).await?;
    apply_metadata(location, node).await;
    debug!(path = %location.display(), bytes = data.len(), "Overwrote file");
    Ok(())
}

async fn write_file(
    remote: &dyn ChunkRemote,
    location: &Path,
    node: &FileNode,
) -> Result<(), SyncError> {
    let mut file = tokio::fs::File::create(location).await?;
    let written = chunking::fetch_into(remote, &node.chunks, &mut file).await?;
    file.sync_all().await?;
    drop(file);
    if written != node.size {
        warn!(
            path = %location.display(),
            expected = node.size,
            written,
            "Materialized size differs from published size"
        );
    }
    apply_metadata(location, node).await;
    Ok(())
}

/// Best effort: a failure here leaves correct content with local metadata.
async fn apply_metadata(location: &Path, node: &FileNode) {
    let target = location.to_path_buf();
    let (mod_time, mode) = (node.mod_time, node.mode);
    let applied = tokio::task::spawn_blocking(move || {
        if let Err(e) = set_mod_time(&target, mod_time) {
            warn!(path = %target.display(), error = %e, "Failed to apply modification time");
        }
        if let Err(e) = set_mode(&target, mode) {
            warn!(path = %target.display(), error = %e, "Failed to apply mode");
        }
    })
    .await;
    if let Err(e) = applied {
        warn!(path = %location.display(), error = %e, "Metadata task failed");
    }
}

#[cfg(unix)]
fn set_mode(location: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if mode == 0 {
        return Ok(());
    }
    std::fs::set_permissions(location, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_location: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn set_mod_time(location: &Path, mod_time: DateTime<Utc>) -> std::io::Result<()> {
    let file = std::fs::File::open(location)?;
    file.set_modified(SystemTime::from(mod_time))
}
