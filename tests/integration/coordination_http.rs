use super::support::TestServer;
use collab::config::ServerConfig;
use collab::server::Claim;
use collab::types::ChunkDigest;
use reqwest::StatusCode;

#[tokio::test]
async fn test_chunk_put_exists_get() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let digest = ChunkDigest::of(b"hi");
    let url = server.url(&format!("/chunk/{}", digest));

    let head = client.head(&url).send().await.unwrap();
    assert_eq!(head.status(), StatusCode::NOT_FOUND);
    let get = client.get(&url).send().await.unwrap();
    assert_eq!(get.status(), StatusCode::NOT_FOUND);

    let first = client.post(&url).body("hi").send().await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = client.post(&url).body("hi").send().await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);

    let head = client.head(&url).send().await.unwrap();
    assert_eq!(head.status(), StatusCode::OK);
    let get = client.get(&url).send().await.unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    assert_eq!(get.bytes().await.unwrap().as_ref(), b"hi");
}

#[tokio::test]
async fn test_chunk_rejections() {
    let server = TestServer::start_with(ServerConfig {
        max_chunk_bytes: 8,
        ..ServerConfig::default()
    })
    .await;
    let client = reqwest::Client::new();

    let bad = client
        .post(server.url("/chunk/not-a-digest"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let claimed = ChunkDigest::of(b"claimed");
    let mismatch = client
        .post(server.url(&format!("/chunk/{}", claimed)))
        .body("actual")
        .send()
        .await
        .unwrap();
    assert_eq!(mismatch.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let big = vec![1u8; 64];
    let oversize = client
        .post(server.url(&format!("/chunk/{}", ChunkDigest::of(&big))))
        .body(big)
        .send()
        .await
        .unwrap();
    assert_eq!(oversize.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_directory_create_conflict_get() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let url = server.url("/directory/demo");

    assert_eq!(
        client.get(&url).send().await.unwrap().status(),
        StatusCode::NOT_FOUND
    );

    let snapshot = r#"[{"name":"c","size":0,"mode":493,"mod_time":"2024-01-01T00:00:00Z","is_dir":true}]"#;
    let created = client.post(&url).body(snapshot).send().await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    created.json::<Claim>().await.unwrap();
    let again = client.post(&url).body("[]").send().await.unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let fetched = client.get(&url).send().await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(fetched.text().await.unwrap(), snapshot);
}

#[tokio::test]
async fn test_malformed_snapshot_rejected() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    for body in [
        "not json",
        r#"[{"name":"../x","size":0,"mode":0,"mod_time":"2024-01-01T00:00:00Z","is_dir":false}]"#,
        r#"[{"name":"f","size":0,"mode":0,"mod_time":"2024-01-01T00:00:00Z","is_dir":false,
            "children":[{"name":"g","size":0,"mode":0,"mod_time":"2024-01-01T00:00:00Z","is_dir":false}]}]"#,
    ] {
        let response = client
            .post(server.url("/directory/bad"))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
    }
    // nothing was claimed
    let again = client
        .post(server.url("/directory/bad"))
        .body("[]")
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_concurrent_directory_create_single_owner() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let url = server.url("/directory/race");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            client.post(&url).body("[]").send().await.unwrap().status()
        }));
    }
    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}
