use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::protocol::{Location, NodeAddress, Request, Response};
use crate::network::registry_client::unexpected;
use crate::network::{RegistryClient, RpcClient};
use crate::storage::{FileStore, validate_filename};
use crate::utils::{MetricsCollector, P2PError, Result};

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub filename: String,
    pub source: NodeAddress,
    pub digest: String,
    pub size: u64,
    pub path: PathBuf,
}

/// Resolves a filename through the registry and pulls it from a peer,
/// trying candidates in registry order until one passes verification.
pub struct Downloader {
    registry: RegistryClient,
    peers: RpcClient,
    store: Arc<FileStore>,
    self_address: NodeAddress,
    metrics: MetricsCollector,
}

impl Downloader {
    pub fn new(
        registry: RegistryClient,
        peers: RpcClient,
        store: Arc<FileStore>,
        self_address: NodeAddress,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            registry,
            peers,
            store,
            self_address,
            metrics,
        }
    }

    /// Candidate peers with the digest each one advertised. The node
    /// `find_node_with_file` answers with goes first; this node is never a
    /// candidate.
    pub async fn resolve_candidates(&self, filename: &str) -> Result<Vec<Location>> {
        let preferred = self.registry.find_node_with_file(filename).await?;
        let mut candidates = self.registry.locate_file(filename).await?;

        if let Some(preferred) = preferred {
            match candidates.iter().position(|loc| loc.address == preferred) {
                Some(pos) => {
                    let first = candidates.remove(pos);
                    candidates.insert(0, first);
                }
                None => debug!("{} has no advertised digest for {}", preferred, filename),
            }
        }

        candidates.retain(|loc| loc.address != self.self_address);
        Ok(candidates)
    }

    pub async fn fetch(&self, filename: &str) -> Result<FetchOutcome> {
        validate_filename(filename)?;
        info!("Starting fetch: {}", filename);

        let candidates = self.resolve_candidates(filename).await?;
        if candidates.is_empty() {
            return Err(P2PError::NotFound(format!(
                "File '{}' not found in the network",
                filename
            )));
        }

        let mut last_error = None;
        for candidate in &candidates {
            match self.fetch_from(candidate, filename).await {
                Ok(content) => {
                    let path = self.store.write_file(filename, &content).await?;
                    let size = content.len() as u64;
                    self.metrics.record_fetch_completed(size).await;
                    info!(
                        "Fetched {} from {} ({} bytes, digest {})",
                        filename, candidate.address, size, candidate.digest
                    );
                    return Ok(FetchOutcome {
                        filename: filename.to_string(),
                        source: candidate.address.clone(),
                        digest: candidate.digest.clone(),
                        size,
                        path,
                    });
                }
                Err(e) => {
                    if matches!(e, P2PError::IntegrityMismatch { .. }) {
                        self.metrics.record_integrity_failure().await;
                    }
                    warn!(
                        "Failed to fetch {} from {}: {}",
                        filename, candidate.address, e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| P2PError::NotFound(filename.to_string())))
    }

    /// Retrieve and verify against the digest `candidate` advertised.
    /// Nothing is written unless verification passes.
    async fn fetch_from(&self, candidate: &Location, filename: &str) -> Result<Vec<u8>> {
        let content = self.retrieve(&candidate.address, filename).await?;
        let digest = self.store.digest();
        if !digest.verify(&content, &candidate.digest) {
            return Err(P2PError::IntegrityMismatch {
                filename: filename.to_string(),
                expected: candidate.digest.clone(),
                actual: digest.digest(&content),
            });
        }
        Ok(content)
    }

    /// Raw `download` exchange with one peer.
    pub async fn retrieve(&self, peer: &NodeAddress, filename: &str) -> Result<Vec<u8>> {
        debug!("Requesting {} from {}", filename, peer);
        let request = Request::Download {
            filename: filename.to_string(),
        };

        match self.peers.call(peer, request).await? {
            Response::Content {
                filename: served,
                data,
            } => {
                if served != filename {
                    return Err(P2PError::ProtocolFault(format!(
                        "{} answered with {} instead of {}",
                        peer, served, filename
                    )));
                }
                BASE64.decode(data).map_err(|e| {
                    P2PError::ProtocolFault(format!("invalid base64 from {}: {}", peer, e))
                })
            }
            other => Err(unexpected("download", &other)),
        }
    }
}
