//! Filesystem watch registration.

use crate::error::SyncError;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Registers paths for change notification.
pub trait PathWatcher: Send + Sync {
    fn watch(&self, path: &Path) -> Result<(), SyncError>;
}

/// notify-backed watcher feeding a bounded tokio channel.
///
/// Every path is registered non-recursively; the engine registers each
/// directory and file of the share itself as it learns about them.
pub struct NotifyWatcher {
    inner: Mutex<RecommendedWatcher>,
}

impl NotifyWatcher {
    pub fn new(capacity: usize) -> Result<(Self, mpsc::Receiver<notify::Result<Event>>), SyncError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.blocking_send(res) {
                error!("Error sending watch event: {}", e);
            }
        })?;
        Ok((
            Self {
                inner: Mutex::new(watcher),
            },
            rx,
        ))
    }
}

impl PathWatcher for NotifyWatcher {
    fn watch(&self, path: &Path) -> Result<(), SyncError> {
        self.inner.lock().watch(path, RecursiveMode::NonRecursive)?;
        debug!(path = %path.display(), "Watching");
        Ok(())
    }
}
