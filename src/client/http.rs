//! HTTP client for the chunk store and directory registry.
//!
//! Every call the client makes is idempotent on the server side, so
//! transport failures and 5xx answers are retried with bounded exponential
//! backoff. 4xx answers are never retried.

use super::ChunkRemote;
use crate::config::{CoordinatorConfig, RetryConfig};
use crate::error::SyncError;
use crate::server::{Claim, ClaimToken};
use crate::store::PutOutcome;
use crate::tree::FileNode;
use crate::types::ChunkDigest;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, StatusCode, Url};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub struct HttpCoordinator {
    client: reqwest::Client,
    base: Url,
    retry: RetryConfig,
}

impl HttpCoordinator {
    pub fn new(config: &CoordinatorConfig) -> Result<Self, SyncError> {
        let base = Url::parse(&config.url)
            .map_err(|e| SyncError::Config(format!("invalid coordinator url {}: {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "coordinator url {} cannot carry paths",
                config.url
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base,
            retry: config.retry.clone(),
        })
    }

    /// Claim `name` with the given tree snapshot. The returned token lets
    /// the relay seat this participant as the share's host.
    ///
    /// A name that is already live yields [`SyncError::Conflict`].
    pub async fn publish_directory(
        &self,
        name: &str,
        roots: &[FileNode],
    ) -> Result<ClaimToken, SyncError> {
        let url = self.url(&["directory", name]);
        let body = Bytes::from(serde_json::to_vec(roots)?);
        let claim = self
            .with_retry("publish directory", || {
                let request = self
                    .client
                    .post(url.clone())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.clone());
                async move {
                    let response = request.send().await?;
                    match check_server_error("publish directory", response.status())? {
                        StatusCode::CREATED => Ok(Some(response.json::<Claim>().await?.claim)),
                        StatusCode::CONFLICT => Ok(None),
                        other => Err(SyncError::Consistency(format!(
                            "publish directory rejected with {}",
                            other
                        ))),
                    }
                }
            })
            .await?
            .ok_or_else(|| SyncError::Conflict(name.to_string()))?;
        info!(share = %name, roots = roots.len(), "Published directory");
        Ok(claim)
    }

    /// Fetch the live snapshot for `name`.
    pub async fn fetch_directory(&self, name: &str) -> Result<Vec<FileNode>, SyncError> {
        let url = self.url(&["directory", name]);
        let body = self
            .with_retry("fetch directory", || {
                let request = self.client.get(url.clone());
                async move {
                    let response = request.send().await?;
                    match check_server_error("fetch directory", response.status())? {
                        StatusCode::OK => Ok(Some(response.bytes().await?)),
                        StatusCode::NOT_FOUND => Ok(None),
                        other => Err(SyncError::Consistency(format!(
                            "fetch directory returned {}",
                            other
                        ))),
                    }
                }
            })
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("share {}", name)))?;
        let roots: Vec<FileNode> = serde_json::from_slice(&body)?;
        debug!(share = %name, roots = roots.len(), bytes = body.len(), "Fetched directory");
        Ok(roots)
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn chunk_url(&self, digest: &ChunkDigest) -> Url {
        self.url(&["chunk", &digest.to_hex()])
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Coordinator call failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 5xx becomes a retryable transport error; anything else is handed back.
fn check_server_error(operation: &str, status: StatusCode) -> Result<StatusCode, SyncError> {
    if status.is_server_error() {
        Err(SyncError::Transport(format!("{} returned {}", operation, status)))
    } else {
        Ok(status)
    }
}

#[async_trait]
impl ChunkRemote for HttpCoordinator {
    async fn exists(&self, digest: &ChunkDigest) -> Result<bool, SyncError> {
        let digest = *digest;
        let url = self.chunk_url(&digest);
        self.with_retry("chunk exists", || {
            let request = self.client.head(url.clone());
            async move {
                let response = request.send().await?;
                match check_server_error("chunk exists", response.status())? {
                    StatusCode::OK => Ok(true),
                    StatusCode::NOT_FOUND => Ok(false),
                    other => Err(SyncError::Integrity(format!(
                        "chunk exists {} returned {}",
                        digest, other
                    ))),
                }
            }
        })
        .await
    }

    async fn put(&self, digest: &ChunkDigest, data: Bytes) -> Result<PutOutcome, SyncError> {
        let digest = *digest;
        let url = self.chunk_url(&digest);
        self.with_retry("chunk put", || {
            let request = self
                .client
                .post(url.clone())
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(data.clone());
            async move {
                let response = request.send().await?;
                match check_server_error("chunk put", response.status())? {
                    StatusCode::CREATED => Ok(PutOutcome::Created),
                    StatusCode::NOT_MODIFIED => Ok(PutOutcome::Unchanged),
                    other => Err(SyncError::Integrity(format!(
                        "chunk put {} rejected with {}",
                        digest, other
                    ))),
                }
            }
        })
        .await
    }

    async fn get(&self, digest: &ChunkDigest) -> Result<Bytes, SyncError> {
        let digest = *digest;
        let url = self.chunk_url(&digest);
        let data = self
            .with_retry("chunk get", || {
                let request = self.client.get(url.clone());
                async move {
                    let response = request.send().await?;
                    match check_server_error("chunk get", response.status())? {
                        StatusCode::OK => Ok(response.bytes().await?),
                        StatusCode::NOT_FOUND => {
                            Err(SyncError::NotFound(format!("chunk {}", digest)))
                        }
                        other => Err(SyncError::Integrity(format!(
                            "chunk get {} returned {}",
                            digest, other
                        ))),
                    }
                }
            })
            .await?;
        if ChunkDigest::of(&data) != digest {
            return Err(SyncError::Integrity(format!(
                "chunk {} content does not match its digest",
                digest
            )));
        }
        Ok(data)
    }
}
