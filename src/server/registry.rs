//! Directory Registry: one tree snapshot per live share name.
//!
//! Snapshots are opaque bytes here. Claiming a name issues a random claim
//! token; only a relay session presenting that token may host the share,
//! and only the host's departure releases the name.

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Proof of having published a name
pub type ClaimToken = Uuid;

/// Body of a successful `POST /directory/{name}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim: ClaimToken,
}

/// Result of a create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(ClaimToken),
    /// The name already has a live snapshot
    Conflict,
}

struct Registration {
    snapshot: Bytes,
    claim: ClaimToken,
}

#[derive(Default)]
pub struct DirectoryRegistry {
    entries: RwLock<HashMap<String, Registration>>,
}

impl DirectoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` with `snapshot`; the first claimant wins.
    pub fn create(&self, name: &str, snapshot: Bytes) -> CreateOutcome {
        match self.entries.write().entry(name.to_string()) {
            Entry::Occupied(_) => CreateOutcome::Conflict,
            Entry::Vacant(slot) => {
                let claim = Uuid::new_v4();
                info!(share = %name, bytes = snapshot.len(), "Directory registered");
                slot.insert(Registration { snapshot, claim });
                CreateOutcome::Created(claim)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.entries.read().get(name).map(|r| r.snapshot.clone())
    }

    /// Whether `claim` is the live claim on `name`.
    pub fn holds(&self, name: &str, claim: &ClaimToken) -> bool {
        self.entries
            .read()
            .get(name)
            .is_some_and(|r| r.claim == *claim)
    }

    /// Free `name` for a new host if `claim` still holds it.
    pub fn release(&self, name: &str, claim: &ClaimToken) -> bool {
        let mut entries = self.entries.write();
        let removed = match entries.get(name) {
            Some(r) if r.claim == *claim => entries.remove(name).is_some(),
            _ => false,
        };
        if removed {
            info!(share = %name, "Directory released");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
