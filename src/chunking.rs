//! Chunking Pipeline
//!
//! Files are cut into fixed windows, hashed, and uploaded only when the
//! store does not already hold the block. Reconstruction is the reverse:
//! fetch each digest in order and concatenate.

use crate::client::ChunkRemote;
use crate::error::SyncError;
use crate::tree::{path, FileNode};
use crate::types::{ChunkDigest, MAX_BLOCK_SIZE};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Upload the file at `path`, returning its digest list in file order.
///
/// Blocks already present in the store are not sent again. A zero-byte
/// file yields an empty list. Blocks uploaded before a failure stay in the
/// store.
pub async fn upload_file(
    remote: &dyn ChunkRemote,
    path: &Path,
    block_size: usize,
) -> Result<Vec<ChunkDigest>, SyncError> {
    let block_size = block_size.clamp(1, MAX_BLOCK_SIZE);
    let mut file = File::open(path).await?;
    let mut digests = Vec::new();
    let mut uploaded = 0usize;
    loop {
        let block = read_block(&mut file, block_size).await?;
        if block.is_empty() {
            break;
        }
        let short = block.len() < block_size;
        let digest = ChunkDigest::of(&block);
        if !remote.exists(&digest).await? {
            remote.put(&digest, Bytes::from(block)).await?;
            uploaded += 1;
        }
        digests.push(digest);
        if short {
            break;
        }
    }
    debug!(
        path = %path.display(),
        blocks = digests.len(),
        uploaded,
        "Chunked file"
    );
    Ok(digests)
}

/// Fill in the chunk lists of `node` (located at `local`) and every file
/// below it.
pub async fn upload_node(
    remote: &dyn ChunkRemote,
    local: &Path,
    node: &mut FileNode,
    block_size: usize,
) -> Result<(), SyncError> {
    let mut pending: Vec<(PathBuf, &mut FileNode)> = vec![(local.to_path_buf(), node)];
    while let Some((location, node)) = pending.pop() {
        if node.is_dir {
            for child in node.children.iter_mut() {
                pending.push((location.join(&child.name), child));
            }
        } else {
            node.chunks = upload_file(remote, &location, block_size).await?;
        }
    }
    Ok(())
}

/// [`upload_node`] for every root entry of a directory.
pub async fn upload_entries(
    remote: &dyn ChunkRemote,
    dir: &Path,
    entries: &mut [FileNode],
    block_size: usize,
) -> Result<(), SyncError> {
    for entry in entries.iter_mut() {
        let location = path::to_local(dir, &entry.name);
        upload_node(remote, &location, entry, block_size).await?;
    }
    Ok(())
}

/// Stream the blocks of `chunks` into `writer` in order. Returns the
/// number of bytes written.
pub async fn fetch_into<W>(
    remote: &dyn ChunkRemote,
    chunks: &[ChunkDigest],
    writer: &mut W,
) -> Result<u64, SyncError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0u64;
    for digest in chunks {
        let block = remote.get(digest).await?;
        writer.write_all(&block).await?;
        written += block.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}

/// Fetch and concatenate the blocks of `chunks` into one buffer.
pub async fn assemble(
    remote: &dyn ChunkRemote,
    chunks: &[ChunkDigest],
) -> Result<Vec<u8>, SyncError> {
    let mut buf = Vec::new();
    fetch_into(remote, chunks, &mut buf).await?;
    Ok(buf)
}

/// Read up to `size` bytes, stopping early only at end of file.
async fn read_block<R>(reader: &mut R, size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
