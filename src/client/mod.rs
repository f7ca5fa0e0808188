//! Participant-side access to the coordination service.

pub mod http;
pub mod relay_link;

use crate::error::SyncError;
use crate::store::PutOutcome;
use crate::types::ChunkDigest;
use async_trait::async_trait;
use bytes::Bytes;

pub use http::HttpCoordinator;
pub use relay_link::{RelayLink, RelayReceiver, RelaySender};

/// Chunk Store as seen from a participant.
///
/// The chunking pipeline and the reconciliation engine only talk to the
/// store through this trait.
#[async_trait]
pub trait ChunkRemote: Send + Sync {
    async fn exists(&self, digest: &ChunkDigest) -> Result<bool, SyncError>;
    async fn put(&self, digest: &ChunkDigest, data: Bytes) -> Result<PutOutcome, SyncError>;
    /// Fails with [`SyncError::NotFound`] when the block is absent.
    async fn get(&self, digest: &ChunkDigest) -> Result<Bytes, SyncError>;
}
