//! Event Relay
//!
//! Per-share fan-out hub. Hosting a share requires the claim token issued
//! when its directory was published; any other session joins as a guest.
//! When the host leaves (or is dropped) the whole share is torn down and
//! the directory registry entry is released.
//!
//! Each session owns a bounded outbound queue. `send` never waits on a
//! peer: a peer whose queue is full or closed is dropped on the spot.

use super::registry::{ClaimToken, DirectoryRegistry};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Random per-connection identifier
pub type SessionKey = Uuid;

/// First message the relay sends on a new connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    pub session: SessionKey,
    pub is_host: bool,
    /// Whether the share had a connected host once this session joined
    pub host_present: bool,
}

/// A joined participant's end of the relay
pub struct RelaySession {
    pub name: String,
    pub key: SessionKey,
    pub is_host: bool,
    pub host_present: bool,
    /// Payloads from other peers; closes when the session is dropped by
    /// the relay or the share ends
    pub outbound: mpsc::Receiver<Bytes>,
}

impl RelaySession {
    pub fn ack(&self) -> JoinAck {
        JoinAck {
            session: self.key,
            is_host: self.is_host,
            host_present: self.host_present,
        }
    }
}

struct Host {
    key: SessionKey,
    claim: ClaimToken,
}

#[derive(Default)]
struct Share {
    host: Option<Host>,
    peers: HashMap<SessionKey, mpsc::Sender<Bytes>>,
}

pub struct EventRelay {
    shares: Mutex<HashMap<String, Share>>,
    registry: Arc<DirectoryRegistry>,
    queue_capacity: usize,
}

impl EventRelay {
    pub fn new(registry: Arc<DirectoryRegistry>, queue_capacity: usize) -> Self {
        Self {
            shares: Mutex::new(HashMap::new()),
            registry,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Join `name`. The session hosts the share only if it presents the
    /// live registry claim for `name` and no host is connected yet.
    pub fn join(&self, name: &str, claim: Option<ClaimToken>) -> RelaySession {
        let key = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut shares = self.shares.lock();
        let share = shares.entry(name.to_string()).or_default();
        share.peers.insert(key, tx);

        let is_host = match claim {
            Some(claim) if share.host.is_none() && self.registry.holds(name, &claim) => {
                share.host = Some(Host { key, claim });
                true
            }
            Some(_) => {
                warn!(share = %name, session = %key, "Relay join presented a stale claim");
                false
            }
            None => false,
        };
        let host_present = share.host.is_some();
        info!(
            share = %name,
            session = %key,
            is_host,
            host_present,
            peers = share.peers.len(),
            "Relay session joined"
        );
        RelaySession {
            name: name.to_string(),
            key,
            is_host,
            host_present,
            outbound: rx,
        }
    }

    /// Fan `payload` out to every other session on `name`.
    /// Returns the number of peers it was queued for.
    pub fn send(&self, name: &str, sender: SessionKey, payload: Bytes) -> usize {
        let mut shares = self.shares.lock();
        let Some(share) = shares.get(name) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for (key, tx) in &share.peers {
            if *key == sender {
                continue;
            }
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(share = %name, session = %key, "Relay peer queue full, dropping peer");
                    dropped.push(*key);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*key),
            }
        }
        for key in dropped {
            if Self::remove_locked(&mut shares, &self.registry, name, key) {
                break;
            }
        }
        debug!(share = %name, session = %sender, delivered, "Relayed event");
        delivered
    }

    /// Remove a session. Returns true if this ended the share.
    pub fn leave(&self, name: &str, key: SessionKey) -> bool {
        let mut shares = self.shares.lock();
        Self::remove_locked(&mut shares, &self.registry, name, key)
    }

    /// Sessions currently joined to `name`.
    pub fn peer_count(&self, name: &str) -> usize {
        self.shares
            .lock()
            .get(name)
            .map(|share| share.peers.len())
            .unwrap_or(0)
    }

    fn remove_locked(
        shares: &mut HashMap<String, Share>,
        registry: &DirectoryRegistry,
        name: &str,
        key: SessionKey,
    ) -> bool {
        let Some(share) = shares.get_mut(name) else {
            return false;
        };
        if share.peers.remove(&key).is_none() {
            return false;
        }
        let host_claim = share
            .host
            .as_ref()
            .filter(|host| host.key == key)
            .map(|host| host.claim);
        if let Some(claim) = host_claim {
            // Dropping the share drops every remaining sender, which closes
            // the other sessions' outbound queues.
            let remaining = share.peers.len();
            shares.remove(name);
            registry.release(name, &claim);
            info!(share = %name, session = %key, remaining, "Host left, share ended");
            return true;
        }
        if share.host.is_none() && share.peers.is_empty() {
            shares.remove(name);
        }
        info!(share = %name, session = %key, "Relay session left");
        false
    }
}
