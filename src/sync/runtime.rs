//! Serve and receive sessions.
//!
//! A session drains two sources on dedicated tasks: filesystem
//! notifications and relay payloads. Errors on a single event are logged
//! and the event is dropped; only losing the relay or the watcher ends the
//! session.

use super::engine::{Reconciler, RemoteOutcome};
use super::events::{classify, FileEvent};
use super::materialize;
use super::watch::NotifyWatcher;
use crate::chunking;
use crate::client::{HttpCoordinator, RelayLink, RelayReceiver, RelaySender};
use crate::config::CollabConfig;
use crate::error::SyncError;
use crate::tree::{path, walker, Tree};
use notify::Event;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct SyncSession {
    config: CollabConfig,
    name: String,
    root: PathBuf,
}

impl SyncSession {
    pub fn new(config: CollabConfig, name: impl Into<String>, root: &Path) -> Result<Self, SyncError> {
        let root = std::fs::canonicalize(root)?;
        if !root.is_dir() {
            return Err(SyncError::Config(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            config,
            name: name.into(),
            root,
        })
    }

    /// Upload the local directory, claim the share name, and keep the
    /// share in sync until the relay closes.
    pub async fn serve(self) -> Result<(), SyncError> {
        let coordinator = Arc::new(HttpCoordinator::new(&self.config.coordinator)?);
        let block_size = self.config.sync.effective_block_size();

        let mut roots = walker::read_tree(&self.root)?;
        chunking::upload_entries(coordinator.as_ref(), &self.root, &mut roots, block_size).await?;
        let tree = Tree::from_snapshot(roots)?;
        info!(share = %self.name, nodes = tree.len(), "Uploaded local tree");

        let claim = coordinator
            .publish_directory(&self.name, &tree.snapshot())
            .await?;

        let link = RelayLink::connect(&self.config.coordinator, &self.name, Some(claim)).await?;
        if !link.is_host() {
            error!(share = %self.name, "Relay refused the published claim");
            return Err(SyncError::Conflict(self.name.clone()));
        }
        self.run(coordinator, tree, link).await
    }

    /// Download a live share into an empty directory and keep it in sync.
    pub async fn receive(self) -> Result<(), SyncError> {
        if std::fs::read_dir(&self.root)?.next().is_some() {
            return Err(SyncError::NotEmpty(self.root.display().to_string()));
        }
        let coordinator = Arc::new(HttpCoordinator::new(&self.config.coordinator)?);

        let roots = coordinator.fetch_directory(&self.name).await?;
        let tree = Tree::from_snapshot(roots)?;

        // Join before materializing so changes made meanwhile are queued.
        let link = RelayLink::connect(&self.config.coordinator, &self.name, None).await?;
        if !link.host_present() {
            return Err(SyncError::ShareEnded(format!(
                "{} has no connected host",
                self.name
            )));
        }

        for root in tree.snapshot() {
            let location = path::to_local(&self.root, &root.name);
            materialize::materialize(coordinator.as_ref(), &location, &root).await?;
        }
        info!(share = %self.name, nodes = tree.len(), "Materialized share");
        self.run(coordinator, tree, link).await
    }

    async fn run(
        self,
        coordinator: Arc<HttpCoordinator>,
        tree: Tree,
        link: RelayLink,
    ) -> Result<(), SyncError> {
        let (watcher, notifications) = NotifyWatcher::new(self.config.sync.watch_queue_capacity)?;
        let engine = Arc::new(Reconciler::new(
            self.root.clone(),
            tree,
            coordinator,
            Arc::new(watcher),
            self.config.sync.effective_block_size(),
        ));
        engine.watch_all().await?;

        // Dropping the set aborts both loops, so a cancelled session also
        // lets go of its relay connection.
        let (sender, receiver) = link.split();
        let mut loops = JoinSet::new();
        loops.spawn(local_loop(Arc::clone(&engine), notifications, sender));
        loops.spawn(remote_loop(Arc::clone(&engine), receiver, self.name.clone()));

        let result = tokio::select! {
            Some(res) = loops.join_next() => res,
            _ = tokio::signal::ctrl_c() => {
                info!(share = %self.name, "Interrupted, leaving share");
                Ok(Ok(()))
            }
        };
        loops.abort_all();
        result.map_err(|e| SyncError::Transport(format!("session task failed: {}", e)))?
    }
}

async fn local_loop(
    engine: Arc<Reconciler>,
    mut notifications: mpsc::Receiver<notify::Result<Event>>,
    sender: RelaySender,
) -> Result<(), SyncError> {
    while let Some(notification) = notifications.recv().await {
        let event = match notification {
            Ok(event) => event,
            Err(e) => {
                warn!("Watch error: {}", e);
                continue;
            }
        };
        for change in classify(engine.root(), &event) {
            match engine.handle_local(&change).await {
                Ok(Some(file_event)) => {
                    let payload = file_event.to_wire()?;
                    sender.send(payload).await?;
                    debug!(path = %change.path, kind = ?file_event.kind, "Broadcast local change");
                }
                Ok(None) => {}
                Err(SyncError::Unsupported(what)) => {
                    info!(path = %change.path, "Skipping unsupported change: {}", what);
                }
                Err(e) => {
                    warn!(path = %change.path, kind = ?change.kind, error = %e, "Dropped local change");
                }
            }
        }
    }
    error!("Watcher channel disconnected");
    Err(SyncError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "watcher stopped",
    )))
}

async fn remote_loop(
    engine: Arc<Reconciler>,
    mut receiver: RelayReceiver,
    name: String,
) -> Result<(), SyncError> {
    while let Some(payload) = receiver.recv().await {
        let event = match FileEvent::from_wire(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(share = %name, error = %e, "Dropped undecodable relay message");
                continue;
            }
        };
        let (path, kind) = (event.path.clone(), event.kind);
        match engine.handle_remote(event).await {
            Ok(RemoteOutcome::Applied) => debug!(path = %path, ?kind, "Applied remote change"),
            Ok(RemoteOutcome::Skipped) => debug!(path = %path, ?kind, "Skipped remote change"),
            Err(SyncError::Unsupported(what)) => {
                info!(path = %path, "Skipping unsupported change: {}", what);
            }
            Err(e) => warn!(path = %path, ?kind, error = %e, "Dropped remote change"),
        }
    }
    info!(share = %name, "Relay closed the session");
    Err(SyncError::ShareEnded(name))
}
