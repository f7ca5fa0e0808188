//! Chunk Store
//!
//! Immutable content blocks keyed by their SHA-256 digest. Writes are
//! idempotent and first-writer-wins; a block, once stored, never changes.

pub mod disk;

use crate::error::StorageError;
use crate::types::ChunkDigest;
use async_trait::async_trait;
use bytes::Bytes;

pub use disk::DiskChunkStore;

/// Result of a put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The block was not present and has been stored
    Created,
    /// A block with this digest already existed; nothing was written
    Unchanged,
}

/// Chunk Store interface
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn put(&self, digest: &ChunkDigest, data: &[u8]) -> Result<PutOutcome, StorageError>;
    async fn exists(&self, digest: &ChunkDigest) -> Result<bool, StorageError>;
    /// Fails with [`StorageError::NotFound`] when the block is absent.
    async fn get(&self, digest: &ChunkDigest) -> Result<Bytes, StorageError>;
}
