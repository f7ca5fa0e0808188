//! Collab: live shared directories
//!
//! A host publishes a directory under a share name; receivers materialize
//! it and both sides keep it in sync. File content travels as
//! content-addressed SHA-256 blocks through a chunk store, the tree
//! snapshot lives in a directory registry, and changes are broadcast
//! through an event relay hosted by whoever holds the directory claim.

pub mod chunking;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod store;
pub mod sync;
pub mod tooling;
pub mod tree;
pub mod types;

pub use error::{StorageError, SyncError};
pub use types::ChunkDigest;
