use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::protocol::{FileListing, Location, NodeAddress, NodeEntry, Request, Response};
use crate::network::RpcHandler;
use crate::storage::{FileLocationIndex, NodeRegistry, validate_filename};
use crate::utils::{MetricsCollector, P2PError, Result};

/// Both tables live behind one lock so a registration is never observed
/// half-applied.
#[derive(Default)]
struct RegistryState {
    nodes: NodeRegistry,
    index: FileLocationIndex,
}

/// Process-wide registry of nodes and file locations.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
    metrics: MetricsCollector,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: MetricsCollector) -> Self {
        Self {
            state: Arc::default(),
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Replace everything known about `address`. The index follows under
    /// the same lock: claimed files get the new digests, files the node no
    /// longer claims are dropped.
    pub async fn register_node(
        &self,
        address: NodeAddress,
        files: BTreeMap<String, String>,
    ) -> Result<bool> {
        address.validate()?;
        for (filename, digest) in &files {
            validate_filename(filename)?;
            validate_digest(filename, digest)?;
        }

        let file_count = files.len();
        let stale: Vec<String> = {
            let mut state = self.state.write().await;
            for (filename, digest) in &files {
                state.index.register_file(address.clone(), filename, digest);
            }
            let claimed: Vec<String> = files.keys().cloned().collect();
            let previous = state.nodes.register(address.clone(), files);

            let stale: Vec<String> = previous
                .map(|old| {
                    old.into_keys()
                        .filter(|f| claimed.binary_search(f).is_err())
                        .collect()
                })
                .unwrap_or_default();
            for filename in &stale {
                state.index.remove(&address, filename);
            }
            stale
        };

        self.metrics.record_registration().await;
        info!("Registered node {} with {} files", address, file_count);
        if !stale.is_empty() {
            debug!("Node {} no longer holds: {:?}", address, stale);
        }
        Ok(true)
    }

    pub async fn register_file(
        &self,
        address: NodeAddress,
        filename: &str,
        digest: &str,
    ) -> Result<bool> {
        address.validate()?;
        validate_filename(filename)?;
        validate_digest(filename, digest)?;

        let mut state = self.state.write().await;
        let claimed = state
            .nodes
            .get(&address)
            .is_some_and(|entry| entry.files.contains_key(filename));
        if !claimed {
            warn!(
                "register_file for {} from {} without a matching node registration",
                filename, address
            );
        }
        state.index.register_file(address, filename, digest);
        Ok(true)
    }

    pub async fn find_node_with_file(&self, filename: &str) -> Option<NodeAddress> {
        self.metrics.record_lookup().await;
        let state = self.state.read().await;
        state.nodes.find_node_with_file(filename).cloned()
    }

    pub async fn locate_file(&self, filename: &str) -> Vec<Location> {
        self.metrics.record_lookup().await;
        self.state.read().await.index.locate_file(filename)
    }

    pub async fn search(&self, filename: &str) -> Vec<NodeAddress> {
        self.metrics.record_lookup().await;
        self.state.read().await.index.search(filename)
    }

    /// Consistent snapshot of every node entry.
    pub async fn list_nodes(&self) -> Vec<NodeEntry> {
        self.state.read().await.nodes.list_nodes()
    }

    pub async fn list_files(&self) -> Vec<FileListing> {
        self.state.read().await.nodes.list_files()
    }
}

fn validate_digest(filename: &str, digest: &str) -> Result<()> {
    if digest.trim().is_empty() {
        return Err(P2PError::InvalidArgument(format!(
            "empty digest for {}",
            filename
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl RpcHandler for Registry {
    async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::RegisterNode { address, files } => Ok(Response::Ack {
                success: self.register_node(address, files).await?,
            }),
            Request::RegisterFile { address, record } => Ok(Response::Ack {
                success: self
                    .register_file(address, &record.filename, &record.digest)
                    .await?,
            }),
            Request::FindNodeWithFile { filename } => Ok(Response::Node {
                address: self.find_node_with_file(&filename).await,
            }),
            Request::LocateFile { filename } => Ok(Response::Locations {
                locations: self.locate_file(&filename).await,
            }),
            Request::Search { filename } => Ok(Response::Addresses {
                addresses: self.search(&filename).await,
            }),
            Request::ListNodes => Ok(Response::Nodes {
                nodes: self.list_nodes().await,
            }),
            Request::ListFiles => Ok(Response::Files {
                files: self.list_files().await,
            }),
            Request::Download { .. } => Err(P2PError::ProtocolFault(
                "download is served by peer nodes, not the registry".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(f, d)| (f.to_string(), d.to_string()))
            .collect()
    }

    async fn register(registry: &Registry, address: &NodeAddress, pairs: &[(&str, &str)]) {
        registry
            .register_node(address.clone(), files(pairs))
            .await
            .unwrap();
        for (filename, digest) in pairs {
            registry
                .register_file(address.clone(), filename, digest)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_registered_files_are_findable() {
        let registry = Registry::new();
        let a = NodeAddress::new("localhost", 8001);
        register(&registry, &a, &[("a.txt", "d1"), ("b.txt", "d2")]).await;

        assert_eq!(registry.find_node_with_file("a.txt").await, Some(a.clone()));
        assert_eq!(registry.find_node_with_file("b.txt").await, Some(a.clone()));
        assert!(registry.locate_file("a.txt").await.contains(&Location {
            address: a.clone(),
            digest: "d1".to_string()
        }));
        assert_eq!(registry.search("b.txt").await, vec![a]);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let registry = Registry::new();
        let result = registry
            .register_node(NodeAddress::new("", 8001), BTreeMap::new())
            .await;
        assert!(matches!(result, Err(P2PError::InvalidArgument(_))));

        let result = registry
            .register_node(NodeAddress::new("localhost", 0), BTreeMap::new())
            .await;
        assert!(matches!(result, Err(P2PError::InvalidArgument(_))));
        assert!(registry.list_nodes().await.is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_drops_unclaimed_files() {
        let registry = Registry::new();
        let a = NodeAddress::new("localhost", 8001);
        register(&registry, &a, &[("a.txt", "d1"), ("b.txt", "d2")]).await;
        register(&registry, &a, &[("b.txt", "d2")]).await;

        assert_eq!(registry.find_node_with_file("a.txt").await, None);
        assert!(registry.locate_file("a.txt").await.is_empty());
        assert_eq!(registry.locate_file("b.txt").await.len(), 1);
    }

    #[tokio::test]
    async fn test_reregistration_keeps_other_nodes_locations() {
        let registry = Registry::new();
        let a = NodeAddress::new("localhost", 8001);
        let b = NodeAddress::new("localhost", 8002);
        register(&registry, &a, &[("shared.txt", "d1")]).await;
        register(&registry, &b, &[("shared.txt", "d1")]).await;
        register(&registry, &a, &[]).await;

        assert_eq!(registry.find_node_with_file("shared.txt").await, Some(b.clone()));
        assert_eq!(registry.search("shared.txt").await, vec![b]);
    }

    #[tokio::test]
    async fn test_reregistration_updates_kept_digest() {
        let registry = Registry::new();
        let a = NodeAddress::new("localhost", 8001);
        register(&registry, &a, &[("a.txt", "d1")]).await;

        // Only the node registration arrives; the index must not lag.
        registry
            .register_node(a.clone(), files(&[("a.txt", "d2")]))
            .await
            .unwrap();

        assert_eq!(
            registry.locate_file("a.txt").await,
            vec![Location {
                address: a,
                digest: "d2".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_digest_rejected() {
        let registry = Registry::new();
        let a = NodeAddress::new("localhost", 8001);

        let result = registry
            .register_node(a.clone(), files(&[("a.txt", "")]))
            .await;
        assert!(matches!(result, Err(P2PError::InvalidArgument(_))));

        let result = registry.register_file(a, "a.txt", " ").await;
        assert!(matches!(result, Err(P2PError::InvalidArgument(_))));
        assert!(registry.list_nodes().await.is_empty());
        assert!(registry.locate_file("a.txt").await.is_empty());
    }

    #[tokio::test]
    async fn test_locate_missing_is_empty() {
        let registry = Registry::new();
        assert!(registry.locate_file("missing.txt").await.is_empty());

        register(&registry, &NodeAddress::new("localhost", 8001), &[("a.txt", "d1")]).await;
        assert!(registry.locate_file("missing.txt").await.is_empty());
        assert_eq!(registry.find_node_with_file("missing.txt").await, None);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_are_all_visible() {
        let registry = Registry::new();
        let mut tasks = Vec::new();

        for i in 0..64u16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let address = NodeAddress::new("localhost", 9000 + i);
                let name = format!("file-{}.txt", i);
                let digest = format!("digest-{}", i);
                registry
                    .register_node(address.clone(), files(&[(name.as_str(), digest.as_str())]))
                    .await
                    .unwrap();
                registry
                    .register_file(address, &name, &digest)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let nodes = registry.list_nodes().await;
        assert_eq!(nodes.len(), 64);
        for i in 0..64u16 {
            let entry = nodes
                .iter()
                .find(|e| e.address.port == 9000 + i)
                .expect("node missing after concurrent registration");
            assert_eq!(
                entry.files.get(&format!("file-{}.txt", i)),
                Some(&format!("digest-{}", i))
            );
        }
        assert_eq!(registry.metrics().get_metrics().await.registrations, 64);
    }

    #[tokio::test]
    async fn test_handler_maps_validation_error() {
        let registry = Registry::new();
        let result = registry
            .handle(Request::RegisterNode {
                address: NodeAddress::new("", 1),
                files: BTreeMap::new(),
            })
            .await;
        assert!(matches!(result, Err(P2PError::InvalidArgument(_))));

        let result = registry
            .handle(Request::Download {
                filename: "a.txt".to_string(),
            })
            .await;
        assert!(matches!(result, Err(P2PError::ProtocolFault(_))));
    }
}
