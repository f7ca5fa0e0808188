use super::support::{eventually, TestServer};
use collab::client::{HttpCoordinator, RelayLink};
use collab::server::{Claim, ClaimToken, JoinAck};
use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Register an empty snapshot under `name` and return its claim.
async fn publish(server: &TestServer, name: &str) -> ClaimToken {
    let response = reqwest::Client::new()
        .post(server.url(&format!("/directory/{}", name)))
        .body("[]")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json::<Claim>().await.unwrap().claim
}

async fn join(server: &TestServer, name: &str, claim: Option<ClaimToken>) -> (Socket, JoinAck) {
    let mut url = server.ws_url(&format!("/events/{}", name));
    if let Some(claim) = claim {
        url.push_str(&format!("?claim={}", claim));
    }
    let (mut socket, _) = connect_async(url).await.unwrap();
    let ack = match socket.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected join ack, got {:?}", other),
    };
    (socket, ack)
}

async fn next_binary(socket: &mut Socket) -> Option<Vec<u8>> {
    loop {
        match timeout(Duration::from_secs(5), socket.next()).await.ok()? {
            Some(Ok(Message::Binary(data))) => return Some(data),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_claim_holder_hosts_and_events_fan_out() {
    let server = TestServer::start().await;
    let claim = publish(&server, "demo").await;
    let (mut host, host_ack) = join(&server, "demo", Some(claim)).await;
    let (mut guest, guest_ack) = join(&server, "demo", None).await;
    assert!(host_ack.is_host);
    assert!(!guest_ack.is_host);
    assert!(guest_ack.host_present);
    assert_ne!(host_ack.session, guest_ack.session);

    guest.send(Message::Binary(b"from guest".to_vec())).await.unwrap();
    assert_eq!(next_binary(&mut host).await.unwrap(), b"from guest");

    for i in 0..3 {
        host.send(Message::Binary(format!("e{}", i).into_bytes()))
            .await
            .unwrap();
    }
    for i in 0..3 {
        assert_eq!(
            next_binary(&mut guest).await.unwrap(),
            format!("e{}", i).into_bytes()
        );
    }
}

#[tokio::test]
async fn test_host_disconnect_releases_name() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let url = server.url("/directory/demo");

    let claim = publish(&server, "demo").await;
    let (host, _) = join(&server, "demo", Some(claim)).await;
    let (mut guest, _) = join(&server, "demo", None).await;
    assert_eq!(
        client.post(&url).body("[]").send().await.unwrap().status(),
        StatusCode::CONFLICT
    );

    drop(host);

    // the guest's session is closed with the share
    assert!(next_binary(&mut guest).await.is_none());

    let released = eventually(|| {
        let client = client.clone();
        let url = url.clone();
        async move {
            client.post(&url).body("[]").send().await.unwrap().status() == StatusCode::CREATED
        }
    })
    .await;
    assert!(released);
}

#[tokio::test]
async fn test_early_joiner_neither_hosts_nor_releases() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let url = server.url("/directory/demo");

    let claim = publish(&server, "demo").await;
    // a receiver arriving before the publisher has joined the relay
    let (early, early_ack) = join(&server, "demo", None).await;
    assert!(!early_ack.is_host);
    assert!(!early_ack.host_present);
    drop(early);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        client.post(&url).body("[]").send().await.unwrap().status(),
        StatusCode::CONFLICT
    );

    let (_host, host_ack) = join(&server, "demo", Some(claim)).await;
    assert!(host_ack.is_host);
}

#[tokio::test]
async fn test_guest_disconnect_keeps_share() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let url = server.url("/directory/demo");
    let claim = publish(&server, "demo").await;

    let (mut host, _) = join(&server, "demo", Some(claim)).await;
    let (guest, _) = join(&server, "demo", None).await;
    drop(guest);

    let (mut late, late_ack) = join(&server, "demo", None).await;
    assert!(!late_ack.is_host);
    late.send(Message::Binary(b"still here".to_vec())).await.unwrap();
    assert_eq!(next_binary(&mut host).await.unwrap(), b"still here");
    assert_eq!(
        client.get(&url).send().await.unwrap().status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_relay_link_round_trip() {
    let server = TestServer::start().await;
    let config = server.coordinator();
    let coordinator = HttpCoordinator::new(&config).unwrap();
    let claim = coordinator.publish_directory("linked", &[]).await.unwrap();

    let host = RelayLink::connect(&config, "linked", Some(claim)).await.unwrap();
    let guest = RelayLink::connect(&config, "linked", None).await.unwrap();
    assert!(host.is_host());
    assert!(!guest.is_host());
    assert!(guest.host_present());

    let (_host_tx, mut host_rx) = host.split();
    let (guest_tx, _guest_rx) = guest.split();
    guest_tx.send(bytes::Bytes::from_static(b"payload")).await.unwrap();
    let received = timeout(Duration::from_secs(5), host_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.as_ref(), b"payload");
}
