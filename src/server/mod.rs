//! Coordination service: chunk store, directory registry and event relay
//! behind one HTTP listener.

pub mod registry;
pub mod relay;
pub mod routes;

use crate::config::ServerConfig;
use crate::error::StorageError;
use crate::store::{ChunkStore, DiskChunkStore};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use registry::{Claim, ClaimToken, CreateOutcome, DirectoryRegistry};
pub use relay::{EventRelay, JoinAck, RelaySession, SessionKey};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChunkStore>,
    pub registry: Arc<DirectoryRegistry>,
    pub relay: Arc<EventRelay>,
}

pub struct CoordinationServer {
    state: AppState,
    config: ServerConfig,
}

impl CoordinationServer {
    /// Open the on-disk chunk store and set up empty registry and relay.
    pub async fn open(config: ServerConfig) -> Result<Self, StorageError> {
        let data_dir = config.resolve_data_dir().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                e.to_string(),
            ))
        })?;
        let store =
            DiskChunkStore::open(&data_dir, config.verify_digests, config.max_chunk_bytes).await?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    pub fn with_store(store: Arc<dyn ChunkStore>, config: ServerConfig) -> Self {
        let registry = Arc::new(DirectoryRegistry::new());
        let relay = Arc::new(EventRelay::new(
            Arc::clone(&registry),
            config.relay_queue_capacity,
        ));
        Self {
            state: AppState {
                store,
                registry,
                relay,
            },
            config,
        }
    }

    pub fn router(&self) -> Router {
        routes::router(self.state.clone(), &self.config)
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn serve(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> std::io::Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(%addr, "Coordination service listening");
        axum::serve(listener, self.router()).await
    }
}
