//! End-to-end scenarios: one registry and several agents in one process,
//! talking over loopback TCP.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use edge_p2p::core::protocol::{Request, Response};
use edge_p2p::network::RpcClient;
use edge_p2p::network::rpc::DEFAULT_MAX_MESSAGE_SIZE;
use edge_p2p::{
    AgentConfig, AgentState, ContentDigest, NodeAddress, P2PError, PeerAgent, RegistryClient,
    RegistryConfig, RegistryNode, Sha256Digest,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

async fn start_registry() -> RegistryNode {
    let config = RegistryConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        sweep_interval_secs: 1,
        ..RegistryConfig::default()
    };
    let node = RegistryNode::bind(config).await.unwrap();
    node.start().await.unwrap();
    node
}

fn agent_config(registry: &NodeAddress, dir: &Path) -> AgentConfig {
    AgentConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        shared_dir: dir.to_path_buf(),
        registry_host: registry.host.clone(),
        registry_port: registry.port,
        refresh_interval_secs: 3600,
        transfer_timeout_secs: 5,
        rpc_timeout_secs: 2,
        register_attempts: 2,
        ..AgentConfig::default()
    }
}

async fn start_agent(registry: &NodeAddress, files: &[(&str, &[u8])]) -> (PeerAgent, TempDir) {
    start_agent_refreshing(registry, files, 3600).await
}

async fn start_agent_refreshing(
    registry: &NodeAddress,
    files: &[(&str, &[u8])],
    refresh_interval_secs: u64,
) -> (PeerAgent, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    let config = AgentConfig {
        refresh_interval_secs,
        ..agent_config(registry, dir.path())
    };
    let agent = PeerAgent::new(config).await.unwrap();
    agent.start().await.unwrap();
    (agent, dir)
}

/// Poll `check` every 100ms until it holds or `limit` passes.
async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    check().await
}

fn client(registry: &NodeAddress) -> RegistryClient {
    RegistryClient::new(
        registry.clone(),
        RpcClient::new(Duration::from_secs(2), DEFAULT_MAX_MESSAGE_SIZE),
    )
}

#[tokio::test]
async fn test_register_find_and_fetch() {
    let registry = start_registry().await;
    let (a, _a_dir) = start_agent(registry.address(), &[("a.txt", b"hello from a")]).await;
    let (b, b_dir) = start_agent(registry.address(), &[]).await;
    assert_eq!(a.state().await, AgentState::Serving);

    let client = client(registry.address());
    assert_eq!(
        client.find_node_with_file("a.txt").await.unwrap(),
        Some(a.address().clone())
    );

    let outcome = b.fetch("a.txt").await.unwrap();
    let expected = Sha256Digest.digest(b"hello from a");
    assert_eq!(outcome.source, *a.address());
    assert_eq!(outcome.digest, expected);
    assert_eq!(
        std::fs::read(b_dir.path().join("a.txt")).unwrap(),
        b"hello from a"
    );

    // B re-registered after the fetch, so it is now a location too.
    let holders = client.search("a.txt").await.unwrap();
    assert_eq!(holders, vec![a.address().clone(), b.address().clone()]);
    assert_eq!(b.files().await.get("a.txt"), Some(&expected));
}

#[tokio::test]
async fn test_download_bytes_match_advertised_digest() {
    let registry = start_registry().await;
    let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let (a, _a_dir) = start_agent(registry.address(), &[("blob.bin", &content)]).await;

    let advertised = client(registry.address())
        .locate_file("blob.bin")
        .await
        .unwrap();
    assert_eq!(advertised.len(), 1);

    let response = RpcClient::default()
        .call(
            a.address(),
            Request::Download {
                filename: "blob.bin".to_string(),
            },
        )
        .await
        .unwrap();
    let Response::Content { data, .. } = response else {
        panic!("expected content");
    };
    let bytes = BASE64.decode(data).unwrap();
    assert_eq!(Sha256Digest.digest(&bytes), advertised[0].digest);
}

#[tokio::test]
async fn test_corrupted_peer_yields_integrity_mismatch() {
    let registry = start_registry().await;
    let (a, _a_dir) = start_agent(registry.address(), &[("a.txt", b"real content")]).await;
    let (b, b_dir) = start_agent(registry.address(), &[]).await;

    // The registry now advertises a digest A's bytes cannot match.
    registry
        .registry()
        .register_file(a.address().clone(), "a.txt", "00badbad")
        .await
        .unwrap();

    let result = b.fetch("a.txt").await;
    assert!(matches!(result, Err(P2PError::IntegrityMismatch { .. })));
    assert!(!b_dir.path().join("a.txt").exists());
    assert_eq!(b.metrics().get_metrics().await.integrity_failures, 1);
}

#[tokio::test]
async fn test_mismatch_falls_back_to_next_candidate() {
    let registry = start_registry().await;
    let (a, _a_dir) = start_agent(registry.address(), &[("a.txt", b"same bytes")]).await;
    let (c, _c_dir) = start_agent(registry.address(), &[("a.txt", b"same bytes")]).await;
    let (b, _b_dir) = start_agent(registry.address(), &[]).await;

    registry
        .registry()
        .register_file(a.address().clone(), "a.txt", "00badbad")
        .await
        .unwrap();

    let outcome = b.fetch("a.txt").await.unwrap();
    assert_eq!(outcome.source, *c.address());
    assert_eq!(outcome.digest, Sha256Digest.digest(b"same bytes"));
}

#[tokio::test]
async fn test_stale_registration_is_not_served() {
    let registry = start_registry().await;
    let (a, a_dir) = start_agent(registry.address(), &[("a.txt", b"soon gone")]).await;
    let (b, _b_dir) = start_agent(registry.address(), &[]).await;

    std::fs::remove_file(a_dir.path().join("a.txt")).unwrap();

    // The registry still lists A, but A no longer has the bytes.
    let client = client(registry.address());
    assert_eq!(
        client.find_node_with_file("a.txt").await.unwrap(),
        Some(a.address().clone())
    );
    assert!(matches!(b.fetch("a.txt").await, Err(P2PError::NotFound(_))));

    // After A refreshes, the registry forgets the file.
    a.refresh().await.unwrap();
    assert_eq!(client.find_node_with_file("a.txt").await.unwrap(), None);
    assert!(client.locate_file("a.txt").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_unknown_file_is_not_found() {
    let registry = start_registry().await;
    let (b, _b_dir) = start_agent(registry.address(), &[]).await;

    assert!(
        client(registry.address())
            .locate_file("missing.txt")
            .await
            .unwrap()
            .is_empty()
    );
    assert!(matches!(
        b.fetch("missing.txt").await,
        Err(P2PError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_fetch_never_targets_self() {
    let registry = start_registry().await;
    let (a, _a_dir) = start_agent(registry.address(), &[("own.txt", b"mine")]).await;

    assert!(matches!(a.fetch("own.txt").await, Err(P2PError::NotFound(_))));
}

#[tokio::test]
async fn test_unreachable_peer_is_skipped() {
    let registry = start_registry().await;
    let client = client(registry.address());

    // A dead node registered ahead of C.
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        NodeAddress::new("127.0.0.1", listener.local_addr().unwrap().port())
    };
    let mut files = BTreeMap::new();
    files.insert("a.txt".to_string(), Sha256Digest.digest(b"payload"));
    client.register_all(&dead, &files).await.unwrap();

    let (c, _c_dir) = start_agent(registry.address(), &[("a.txt", b"payload")]).await;
    let (b, _b_dir) = start_agent(registry.address(), &[]).await;
    assert_eq!(client.find_node_with_file("a.txt").await.unwrap(), Some(dead));

    let outcome = b.fetch("a.txt").await.unwrap();
    assert_eq!(outcome.source, *c.address());
}

#[tokio::test]
async fn test_startup_fails_without_registry() {
    let unused = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        NodeAddress::new("127.0.0.1", listener.local_addr().unwrap().port())
    };
    let dir = tempfile::tempdir().unwrap();
    let agent = PeerAgent::new(agent_config(&unused, dir.path()))
        .await
        .unwrap();

    let result = agent.start().await;
    assert!(matches!(result, Err(P2PError::Unreachable(_))));
    assert_ne!(agent.state().await, AgentState::Serving);
}

#[tokio::test]
async fn test_concurrent_remote_registrations() {
    let registry = start_registry().await;
    let mut tasks = Vec::new();

    for i in 0..32u16 {
        let client = client(registry.address());
        tasks.push(tokio::spawn(async move {
            let address = NodeAddress::new("10.0.0.1", 7000 + i);
            let mut files = BTreeMap::new();
            files.insert(format!("f{}.txt", i), format!("d{}", i));
            client.register_all(&address, &files).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let nodes = client(registry.address()).list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 32);
    for node in &nodes {
        let i = node.address.port - 7000;
        assert_eq!(node.files.get(&format!("f{}.txt", i)), Some(&format!("d{}", i)));
    }

    let listing = client(registry.address()).list_files().await.unwrap();
    assert_eq!(listing.len(), 32);
}

#[tokio::test]
async fn test_invalid_registration_is_returned_not_fatal() {
    let registry = start_registry().await;
    let client = client(registry.address());

    let result = client
        .register_node(&NodeAddress::new("", 9000), &BTreeMap::new())
        .await;
    assert!(matches!(result, Err(P2PError::InvalidArgument(_))));

    // The registry keeps serving.
    assert!(client.list_nodes().await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_unshareable_name_does_not_block_startup() {
    let registry = start_registry().await;
    let (a, _a_dir) = start_agent(
        registry.address(),
        &[("good.txt", b"fine"), ("report\\2024.txt", b"backslash")],
    )
    .await;

    assert_eq!(a.state().await, AgentState::Serving);
    let nodes = client(registry.address()).list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(
        nodes[0].files.keys().collect::<Vec<_>>(),
        vec!["good.txt"]
    );
}

#[tokio::test]
async fn test_periodic_refresh_drops_deleted_files() {
    let registry = start_registry().await;
    let (a, a_dir) = start_agent_refreshing(registry.address(), &[("a.txt", b"brief")], 1).await;
    let client = client(registry.address());
    assert_eq!(
        client.find_node_with_file("a.txt").await.unwrap(),
        Some(a.address().clone())
    );

    std::fs::remove_file(a_dir.path().join("a.txt")).unwrap();

    let lookup = &client;
    let forgotten = eventually(Duration::from_secs(3), move || async move {
        lookup.find_node_with_file("a.txt").await.unwrap().is_none()
    })
    .await;
    assert!(forgotten);
    assert!(client.locate_file("a.txt").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_failures_are_not_fatal() {
    let registry = start_registry().await;
    let (a, _a_dir) = start_agent_refreshing(registry.address(), &[("a.txt", b"x")], 1).await;

    // Stop accepting registry connections; every later refresh fails.
    registry.shutdown().await;

    let metrics = a.metrics();
    let failed_twice = eventually(Duration::from_secs(5), move || async move {
        metrics.get_metrics().await.refresh_failures >= 2
    })
    .await;
    assert!(failed_twice);
    assert_eq!(a.state().await, AgentState::Serving);
}
