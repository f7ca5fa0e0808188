//! HTTP and WebSocket surface of the coordination service.

use super::registry::{Claim, ClaimToken, CreateOutcome};
use super::relay::EventRelay;
use super::AppState;
use crate::config::ServerConfig;
use crate::error::StorageError;
use crate::store::PutOutcome;
use crate::tree::Tree;
use crate::types::ChunkDigest;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = match &self {
            StorageError::InvalidDigest(_) => StatusCode::BAD_REQUEST,
            StorageError::DigestMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            StorageError::ChunkTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::Io(e) => {
                error!(error = %e, "Chunk store I/O failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route(
            "/chunk/:digest",
            get(get_chunk)
                .head(check_chunk)
                .post(put_chunk)
                .layer(DefaultBodyLimit::max(config.max_chunk_bytes)),
        )
        .route(
            "/directory/:name",
            get(get_directory)
                .post(create_directory)
                .layer(DefaultBodyLimit::max(config.max_snapshot_bytes)),
        )
        .route("/events/:name", get(relay_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_digest(raw: &str) -> Result<ChunkDigest, StorageError> {
    raw.parse().map_err(StorageError::InvalidDigest)
}

async fn put_chunk(
    State(state): State<AppState>,
    Path(digest): Path<String>,
    body: Bytes,
) -> Result<StatusCode, StorageError> {
    let digest = parse_digest(&digest)?;
    match state.store.put(&digest, &body).await? {
        PutOutcome::Created => Ok(StatusCode::CREATED),
        PutOutcome::Unchanged => Ok(StatusCode::NOT_MODIFIED),
    }
}

async fn check_chunk(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> Result<StatusCode, StorageError> {
    let digest = parse_digest(&digest)?;
    if state.store.exists(&digest).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

async fn get_chunk(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> Result<Bytes, StorageError> {
    let digest = parse_digest(&digest)?;
    state.store.get(&digest).await
}

async fn create_directory(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let parsed = serde_json::from_slice(&body)
        .map_err(crate::error::SyncError::from)
        .and_then(Tree::from_snapshot);
    if let Err(e) = parsed {
        warn!(share = %name, error = %e, "Rejected malformed directory snapshot");
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.registry.create(&name, body) {
        CreateOutcome::Created(claim) => (StatusCode::CREATED, Json(Claim { claim })).into_response(),
        CreateOutcome::Conflict => StatusCode::CONFLICT.into_response(),
    }
}

async fn get_directory(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.registry.get(&name) {
        Some(snapshot) => ([(header::CONTENT_TYPE, "application/json")], snapshot).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct JoinParams {
    claim: Option<ClaimToken>,
}

async fn relay_events(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<JoinParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| relay_socket(state.relay, name, params.claim, socket))
}

/// Pump one participant's connection until either side closes.
async fn relay_socket(
    relay: Arc<EventRelay>,
    name: String,
    claim: Option<ClaimToken>,
    socket: WebSocket,
) {
    let mut session = relay.join(&name, claim);
    let key = session.key;
    let (mut sink, mut stream) = socket.split();

    let ack = match serde_json::to_string(&session.ack()) {
        Ok(ack) => ack,
        Err(e) => {
            error!(share = %name, error = %e, "Failed to encode join ack");
            relay.leave(&name, key);
            return;
        }
    };
    if sink.send(Message::Text(ack)).await.is_err() {
        relay.leave(&name, key);
        return;
    }

    loop {
        tokio::select! {
            outbound = session.outbound.recv() => match outbound {
                Some(payload) => {
                    if let Err(e) = sink.send(Message::Binary(payload.to_vec())).await {
                        debug!(share = %name, session = %key, error = %e, "Relay write failed");
                        break;
                    }
                }
                None => {
                    // dropped by the relay or the share ended
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Binary(data))) => {
                    relay.send(&name, key, Bytes::from(data));
                }
                Some(Ok(Message::Text(text))) => {
                    relay.send(&name, key, Bytes::from(text));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(share = %name, session = %key, error = %e, "Relay read failed");
                    break;
                }
            },
        }
    }

    relay.leave(&name, key);
}
