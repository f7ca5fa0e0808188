use super::support::{eventually, NoopWatcher, TestServer};
use collab::chunking;
use collab::client::{HttpCoordinator, RelayLink};
use collab::config::{CollabConfig, CoordinatorConfig};
use collab::error::SyncError;
use collab::server::ClaimToken;
use collab::sync::materialize;
use collab::sync::{FileEvent, LocalChange, LocalKind, Reconciler, RemoteOutcome, SyncSession};
use collab::tree::{walker, Tree};
use collab::types::{ChunkDigest, MAX_BLOCK_SIZE};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn populate_demo(root: &Path) {
    fs::create_dir(root.join("a")).unwrap();
    fs::write(root.join("a/b.txt"), "hi").unwrap();
    fs::create_dir(root.join("c")).unwrap();
}

/// Upload and publish `root` under `name`, returning the published tree
/// and its claim.
async fn publish(coordinator: &HttpCoordinator, root: &Path, name: &str) -> (Tree, ClaimToken) {
    let mut roots = walker::read_tree(root).unwrap();
    chunking::upload_entries(coordinator, root, &mut roots, MAX_BLOCK_SIZE)
        .await
        .unwrap();
    let tree = Tree::from_snapshot(roots).unwrap();
    let claim = coordinator
        .publish_directory(name, &tree.snapshot())
        .await
        .unwrap();
    (tree, claim)
}

/// Fetch `name` and write it under `root`.
async fn receive_into(coordinator: &HttpCoordinator, root: &Path, name: &str) -> Tree {
    let roots = coordinator.fetch_directory(name).await.unwrap();
    let tree = Tree::from_snapshot(roots).unwrap();
    for node in tree.snapshot() {
        materialize::materialize(coordinator, &root.join(&node.name), &node)
            .await
            .unwrap();
    }
    tree
}

#[tokio::test]
async fn test_fresh_share() {
    let server = TestServer::start().await;
    let coordinator = HttpCoordinator::new(&server.coordinator()).unwrap();
    let host_dir = tempfile::tempdir().unwrap();
    populate_demo(host_dir.path());
    publish(&coordinator, host_dir.path(), "demo").await;

    let roots = coordinator.fetch_directory("demo").await.unwrap();
    assert_eq!(roots.len(), 2);
    let a = &roots[0];
    assert_eq!(a.children[0].name, "b.txt");
    assert_eq!(a.children[0].chunks, vec![ChunkDigest::of(b"hi")]);
    let c = &roots[1];
    assert!(c.is_dir);
    assert!(c.children.is_empty());

    let guest_dir = tempfile::tempdir().unwrap();
    receive_into(&coordinator, guest_dir.path(), "demo").await;
    assert_eq!(fs::read(guest_dir.path().join("a/b.txt")).unwrap(), b"hi");
    assert!(guest_dir.path().join("c").is_dir());
    assert_eq!(fs::read_dir(guest_dir.path().join("c")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_dedup_across_participants() {
    let server = TestServer::start().await;
    let coordinator = HttpCoordinator::new(&server.coordinator()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f");
    fs::write(&path, vec![3u8; 10_000]).unwrap();

    let first = chunking::upload_file(&coordinator, &path, 1024).await.unwrap();
    let second = chunking::upload_file(&coordinator, &path, 1024).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        chunking::assemble(&coordinator, &first).await.unwrap(),
        vec![3u8; 10_000]
    );
}

#[tokio::test]
async fn test_conflicting_publish_reports_conflict() {
    let server = TestServer::start().await;
    let coordinator = HttpCoordinator::new(&server.coordinator()).unwrap();
    coordinator.publish_directory("taken", &[]).await.unwrap();
    let err = coordinator.publish_directory("taken", &[]).await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict(name) if name == "taken"));

    let err = coordinator.fetch_directory("absent").await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn test_receive_refuses_non_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("existing"), "x").unwrap();
    let session = SyncSession::new(CollabConfig::default(), "demo", dir.path()).unwrap();
    let err = session.receive().await.unwrap_err();
    assert!(matches!(err, SyncError::NotEmpty(_)));
}

#[tokio::test]
async fn test_local_edit_propagation() {
    let server = TestServer::start().await;
    let config = server.coordinator();
    let coordinator = Arc::new(HttpCoordinator::new(&config).unwrap());

    let host_dir = tempfile::tempdir().unwrap();
    populate_demo(host_dir.path());
    let (host_tree, claim) = publish(&coordinator, host_dir.path(), "demo").await;
    let host_link = RelayLink::connect(&config, "demo", Some(claim)).await.unwrap();
    assert!(host_link.is_host());

    let guest_dir = tempfile::tempdir().unwrap();
    let guest_tree = receive_into(&coordinator, guest_dir.path(), "demo").await;
    let guest_link = RelayLink::connect(&config, "demo", None).await.unwrap();
    assert!(!guest_link.is_host());

    let host = Reconciler::new(
        host_dir.path().to_path_buf(),
        host_tree,
        coordinator.clone(),
        Arc::new(NoopWatcher),
        MAX_BLOCK_SIZE,
    );
    let guest = Reconciler::new(
        guest_dir.path().to_path_buf(),
        guest_tree,
        coordinator.clone(),
        Arc::new(NoopWatcher),
        MAX_BLOCK_SIZE,
    );

    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(guest_dir.path().join("a/b.txt"))
        .unwrap();
    file.write_all(b", appended by the guest").unwrap();
    drop(file);

    let event = guest
        .handle_local(&LocalChange::new(LocalKind::Write, "a/b.txt"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.previous_chunks, Some(vec![ChunkDigest::of(b"hi")]));

    let (guest_tx, _guest_rx) = guest_link.split();
    let (_host_tx, mut host_rx) = host_link.split();
    guest_tx.send(event.to_wire().unwrap()).await.unwrap();

    let payload = timeout(Duration::from_secs(5), host_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let received = FileEvent::from_wire(&payload).unwrap();
    assert!(!received.local);
    assert_eq!(
        host.handle_remote(received.clone()).await.unwrap(),
        RemoteOutcome::Applied
    );
    assert_eq!(
        fs::read(host_dir.path().join("a/b.txt")).unwrap(),
        fs::read(guest_dir.path().join("a/b.txt")).unwrap()
    );

    // duplicate delivery and the host's own watcher echo are both no-ops
    assert_eq!(
        host.handle_remote(received).await.unwrap(),
        RemoteOutcome::Skipped
    );
    assert!(host
        .handle_local(&LocalChange::new(LocalKind::Write, "a/b.txt"))
        .await
        .unwrap()
        .is_none());
}

fn session_config(server: &TestServer) -> CollabConfig {
    CollabConfig {
        coordinator: server.coordinator(),
        ..CollabConfig::default()
    }
}

async fn host_connected(config: CoordinatorConfig, name: &'static str) -> bool {
    match RelayLink::connect(&config, name, None).await {
        Ok(link) => link.host_present(),
        Err(_) => false,
    }
}

fn read_or_empty(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_converge_both_ways() {
    let server = TestServer::start().await;
    let config = session_config(&server);

    let host_dir = tempfile::tempdir().unwrap();
    populate_demo(host_dir.path());
    let host = SyncSession::new(config.clone(), "demo", host_dir.path()).unwrap();
    let host_task = tokio::spawn(host.serve());
    assert!(eventually(|| host_connected(config.coordinator.clone(), "demo")).await);

    let guest_dir = tempfile::tempdir().unwrap();
    let guest = SyncSession::new(config.clone(), "demo", guest_dir.path()).unwrap();
    let guest_task = tokio::spawn(guest.receive());
    let guest_file = guest_dir.path().join("a/b.txt");
    let host_file = host_dir.path().join("a/b.txt");
    assert!(eventually(|| {
        let found = read_or_empty(&guest_file) == b"hi";
        async move { found }
    })
    .await);
    assert!(guest_dir.path().join("c").is_dir());

    // guest edit reaches the host; rewrites cover the window before the
    // guest's watches are registered
    assert!(eventually(|| {
        fs::write(&guest_file, "hi from the guest").unwrap();
        let seen = read_or_empty(&host_file) == b"hi from the guest";
        async move { seen }
    })
    .await);

    // a file created on the host appears on the guest
    let host_new = host_dir.path().join("c/new.txt");
    let guest_new = guest_dir.path().join("c/new.txt");
    fs::write(&host_new, "fresh").unwrap();
    assert!(eventually(|| {
        let seen = read_or_empty(&guest_new) == b"fresh";
        async move { seen }
    })
    .await);

    // and later edits of it follow
    fs::write(&host_new, "fresh, edited").unwrap();
    assert!(eventually(|| {
        let seen = read_or_empty(&guest_new) == b"fresh, edited";
        async move { seen }
    })
    .await);
    assert_eq!(fs::read(&host_file).unwrap(), fs::read(&guest_file).unwrap());

    assert!(!host_task.is_finished());
    assert!(!guest_task.is_finished());
    host_task.abort();

    // the host leaving ends the guest's session
    let ended = timeout(Duration::from_secs(5), guest_task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(ended, Err(SyncError::ShareEnded(_))));
}

#[tokio::test]
async fn test_receive_without_connected_host_ends() {
    let server = TestServer::start().await;
    let config = session_config(&server);
    let coordinator = HttpCoordinator::new(&config.coordinator).unwrap();
    let source = tempfile::tempdir().unwrap();
    populate_demo(source.path());
    publish(&coordinator, source.path(), "orphan").await;

    let dir = tempfile::tempdir().unwrap();
    let session = SyncSession::new(config, "orphan", dir.path()).unwrap();
    let err = session.receive().await.unwrap_err();
    assert!(matches!(err, SyncError::ShareEnded(_)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    // the publisher's claim survives the receiver's visit
    let err = coordinator.publish_directory("orphan", &[]).await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
}

#[tokio::test]
async fn test_serve_of_taken_name_conflicts() {
    let server = TestServer::start().await;
    let config = session_config(&server);
    let coordinator = HttpCoordinator::new(&config.coordinator).unwrap();
    coordinator.publish_directory("taken", &[]).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    populate_demo(dir.path());
    let session = SyncSession::new(config, "taken", dir.path()).unwrap();
    let err = session.serve().await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict(name) if name == "taken"));
}
