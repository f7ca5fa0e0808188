//! On-disk chunk store: one file per digest under a server-controlled directory.

use super::{ChunkStore, PutOutcome};
use crate::error::StorageError;
use crate::types::ChunkDigest;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CHUNK_DIR_NAME: &str = "chunks";
const TMP_DIR_NAME: &str = "tmp";

/// Chunk store backed by plain files
pub struct DiskChunkStore {
    chunk_dir: PathBuf,
    tmp_dir: PathBuf,
    verify_digests: bool,
    max_chunk_bytes: usize,
}

impl DiskChunkStore {
    /// Open (creating if needed) a store rooted at `base_dir`.
    pub async fn open(
        base_dir: &Path,
        verify_digests: bool,
        max_chunk_bytes: usize,
    ) -> Result<Self, StorageError> {
        let chunk_dir = base_dir.join(CHUNK_DIR_NAME);
        let tmp_dir = base_dir.join(TMP_DIR_NAME);
        tokio::fs::create_dir_all(&chunk_dir).await?;
        tokio::fs::create_dir_all(&tmp_dir).await?;
        debug!(dir = %chunk_dir.display(), "Opened chunk store");
        Ok(Self {
            chunk_dir,
            tmp_dir,
            verify_digests,
            max_chunk_bytes,
        })
    }

    pub fn chunk_path(&self, digest: &ChunkDigest) -> PathBuf {
        self.chunk_dir.join(digest.to_hex())
    }
}

#[async_trait]
impl ChunkStore for DiskChunkStore {
    async fn put(&self, digest: &ChunkDigest, data: &[u8]) -> Result<PutOutcome, StorageError> {
        if data.len() > self.max_chunk_bytes {
            return Err(StorageError::ChunkTooLarge {
                size: data.len(),
                limit: self.max_chunk_bytes,
            });
        }
        if self.verify_digests {
            let computed = ChunkDigest::of(data);
            if computed != *digest {
                return Err(StorageError::DigestMismatch {
                    expected: digest.to_hex(),
                    computed: computed.to_hex(),
                });
            }
        }
        if self.exists(digest).await? {
            return Ok(PutOutcome::Unchanged);
        }

        // Write aside, then link into place; the link fails if another
        // writer got there first.
        let tmp_path = self.tmp_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::write(&tmp_path, data).await?;
        let linked = tokio::fs::hard_link(&tmp_path, self.chunk_path(digest)).await;
        if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
            warn!(path = %tmp_path.display(), error = %e, "Failed to remove temporary chunk");
        }
        match linked {
            Ok(()) => Ok(PutOutcome::Created),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(PutOutcome::Unchanged),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, digest: &ChunkDigest) -> Result<bool, StorageError> {
        match tokio::fs::metadata(self.chunk_path(digest)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn get(&self, digest: &ChunkDigest) -> Result<Bytes, StorageError> {
        match tokio::fs::read(self.chunk_path(digest)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(digest.to_hex()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_BLOCK_SIZE;
    use std::sync::Arc;

    async fn open_store(dir: &Path) -> DiskChunkStore {
        DiskChunkStore::open(dir, true, MAX_BLOCK_SIZE).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let temp = tempfile::tempdir().unwrap();
        let store = open_store(temp.path()).await;
        let digest = ChunkDigest::of(b"hi");

        assert!(!store.exists(&digest).await.unwrap());
        assert_eq!(store.put(&digest, b"hi").await.unwrap(), PutOutcome::Created);
        assert!(store.exists(&digest).await.unwrap());
        assert_eq!(store.get(&digest).await.unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let store = open_store(temp.path()).await;
        let digest = ChunkDigest::of(b"same");
        assert_eq!(store.put(&digest, b"same").await.unwrap(), PutOutcome::Created);
        assert_eq!(store.put(&digest, b"same").await.unwrap(), PutOutcome::Unchanged);
        assert_eq!(store.get(&digest).await.unwrap(), Bytes::from_static(b"same"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let temp = tempfile::tempdir().unwrap();
        let store = open_store(temp.path()).await;
        let err = store.get(&ChunkDigest::of(b"absent")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_digest_mismatch_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let store = open_store(temp.path()).await;
        let digest = ChunkDigest::of(b"claimed");
        let err = store.put(&digest, b"actual").await.unwrap_err();
        assert!(matches!(err, StorageError::DigestMismatch { .. }));
        assert!(!store.exists(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_unverified_store_trusts_caller() {
        let temp = tempfile::tempdir().unwrap();
        let store = DiskChunkStore::open(temp.path(), false, MAX_BLOCK_SIZE)
            .await
            .unwrap();
        let digest = ChunkDigest::of(b"claimed");
        assert_eq!(store.put(&digest, b"actual").await.unwrap(), PutOutcome::Created);
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let store = DiskChunkStore::open(temp.path(), true, 4).await.unwrap();
        let err = store.put(&ChunkDigest::of(b"12345"), b"12345").await.unwrap_err();
        assert!(matches!(err, StorageError::ChunkTooLarge { size: 5, limit: 4 }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_single_creator() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(temp.path()).await);
        let digest = ChunkDigest::of(b"race");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.put(&digest, b"race").await }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == PutOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        let leftovers = std::fs::read_dir(temp.path().join(TMP_DIR_NAME)).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
