use collab::config::{CoordinatorConfig, RetryConfig, ServerConfig};
use collab::error::SyncError;
use collab::server::CoordinationServer;
use collab::sync::PathWatcher;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    _data: TempDir,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    pub async fn start_with(mut config: ServerConfig) -> Self {
        let data = tempfile::tempdir().unwrap();
        config.data_dir = Some(data.path().to_path_buf());
        let server = CoordinationServer::open(config).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(server.serve_on(listener));
        Self {
            addr,
            _data: data,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            url: format!("http://{}", self.addr),
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay_ms: 10,
                max_delay_ms: 10,
            },
            connect_timeout_ms: 2_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Watcher that registers nothing; tests drive the engine directly.
pub struct NoopWatcher;

impl PathWatcher for NoopWatcher {
    fn watch(&self, _path: &Path) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Poll `check` until it returns true or a few seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
