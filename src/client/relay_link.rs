//! WebSocket connection to the event relay.
//!
//! The relay answers a new connection with a text [`JoinAck`]; after that
//! every frame in either direction is a binary payload. A publisher passes
//! its registry claim as the `claim` query parameter to host the share. Writes go through a
//! single ordered channel drained by one writer task, so events reach the
//! relay in emission order.

use crate::config::CoordinatorConfig;
use crate::error::SyncError;
use crate::server::{ClaimToken, JoinAck};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 256;

/// Ordered outbound half of a relay connection
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<Bytes>,
}

impl RelaySender {
    /// Queue `payload` for the relay. Fails once the connection is gone.
    pub async fn send(&self, payload: Bytes) -> Result<(), SyncError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| SyncError::ShareEnded("relay connection closed".to_string()))
    }
}

/// Inbound half of a relay connection
pub struct RelayReceiver {
    rx: mpsc::Receiver<Bytes>,
}

impl RelayReceiver {
    /// Next payload from another peer; `None` once the relay has closed
    /// the session.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

pub struct RelayLink {
    ack: JoinAck,
    sender: RelaySender,
    receiver: RelayReceiver,
}

impl RelayLink {
    /// Join the relay session for `name`, as host when `claim` is the
    /// live registry claim.
    pub async fn connect(
        config: &CoordinatorConfig,
        name: &str,
        claim: Option<ClaimToken>,
    ) -> Result<Self, SyncError> {
        let mut url = reqwest::Url::parse(&config.relay_url())
            .map_err(|e| SyncError::Config(format!("invalid relay url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::Config("relay url cannot carry paths".to_string()))?
            .pop_if_empty()
            .extend(["events", name]);
        if let Some(claim) = claim {
            url.query_pairs_mut().append_pair("claim", &claim.to_string());
        }

        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let ack = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => break serde_json::from_str::<JoinAck>(&text)?,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    return Err(SyncError::Transport(format!(
                        "expected join ack from relay, got {:?}",
                        other
                    )))
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(SyncError::ShareEnded(format!(
                        "relay closed before joining {}",
                        name
                    )))
                }
            }
        };
        info!(
            share = %name,
            session = %ack.session,
            is_host = ack.is_host,
            host_present = ack.host_present,
            "Joined relay"
        );

        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);

        let share = name.to_string();
        tokio::spawn(async move {
            while let Some(payload) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Binary(payload.to_vec())).await {
                    warn!(share = %share, error = %e, "Relay write failed");
                    return;
                }
            }
            let _ = sink.close().await;
        });

        let share = name.to_string();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let payload = match message {
                    Ok(Message::Binary(data)) => Bytes::from(data),
                    Ok(Message::Text(text)) => Bytes::from(text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(share = %share, error = %e, "Relay read failed");
                        break;
                    }
                };
                if in_tx.send(payload).await.is_err() {
                    break;
                }
            }
            debug!(share = %share, "Relay reader finished");
        });

        Ok(Self {
            ack,
            sender: RelaySender { tx: out_tx },
            receiver: RelayReceiver { rx: in_rx },
        })
    }

    pub fn is_host(&self) -> bool {
        self.ack.is_host
    }

    /// Whether the share had a connected host when this link joined.
    pub fn host_present(&self) -> bool {
        self.ack.host_present
    }

    pub fn split(self) -> (RelaySender, RelayReceiver) {
        (self.sender, self.receiver)
    }
}
