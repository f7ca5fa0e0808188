//! Live synchronization of a shared directory.

pub mod engine;
pub mod events;
pub mod materialize;
pub mod runtime;
pub mod watch;

pub use engine::{Reconciler, RemoteOutcome};
pub use events::{EventKind, FileEvent, LocalChange, LocalKind};
pub use runtime::SyncSession;
pub use watch::{NotifyWatcher, PathWatcher};
