use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::core::AgentConfig;
use crate::core::protocol::NodeAddress;
use crate::network::{RegistryClient, RpcClient, RpcServer, rpc};
use crate::storage::{ContentDigest, FileStore, Sha256Digest};
use crate::transfer::{Downloader, FetchOutcome, Uploader};
use crate::utils::{MetricsCollector, P2PError, Result, RetryConfig, retry_with_backoff};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Scanning,
    Registered,
    Serving,
}

/// Rescans the shared directory and re-issues the full registration.
#[derive(Clone)]
struct Refresher {
    store: Arc<FileStore>,
    registry: RegistryClient,
    address: NodeAddress,
    files: Arc<RwLock<BTreeMap<String, String>>>,
}

impl Refresher {
    async fn scan(&self) -> Result<BTreeMap<String, String>> {
        let files = self.store.scan_files().await?;
        *self.files.write().await = files.clone();
        Ok(files)
    }

    async fn refresh(&self) -> Result<()> {
        let files = self.scan().await?;
        self.registry.register_all(&self.address, &files).await?;
        info!(
            "Refreshed registration of {} with {} files",
            self.address,
            files.len()
        );
        Ok(())
    }
}

/// A regular node: registers its shared files, serves them to peers and
/// fetches files from peers.
pub struct PeerAgent {
    config: AgentConfig,
    address: NodeAddress,
    registry: RegistryClient,
    uploader: Arc<Uploader>,
    downloader: Downloader,
    refresher: Refresher,
    state: RwLock<AgentState>,
    metrics: MetricsCollector,
    listener: Mutex<Option<TcpListener>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PeerAgent {
    pub async fn new(config: AgentConfig) -> Result<Self> {
        Self::with_digest(config, Arc::new(Sha256Digest)).await
    }

    /// Bind the agent's listener. Nothing is registered until `start`.
    pub async fn with_digest(config: AgentConfig, digest: Arc<dyn ContentDigest>) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(FileStore::new(config.shared_dir.clone(), digest).await?);
        let (listener, address) = rpc::bind(&config.host, config.port).await?;
        let metrics = MetricsCollector::new();

        let registry = RegistryClient::new(
            config.registry_address(),
            RpcClient::new(config.rpc_timeout(), config.max_message_size),
        );
        let peers = RpcClient::new(config.transfer_timeout(), config.max_message_size);

        let uploader = Arc::new(Uploader::new(store.clone(), metrics.clone()));
        let downloader = Downloader::new(
            registry.clone(),
            peers,
            store.clone(),
            address.clone(),
            metrics.clone(),
        );
        let refresher = Refresher {
            store,
            registry: registry.clone(),
            address: address.clone(),
            files: Arc::new(RwLock::new(BTreeMap::new())),
        };

        Ok(Self {
            config,
            address,
            registry,
            uploader,
            downloader,
            refresher,
            state: RwLock::new(AgentState::Idle),
            metrics,
            listener: Mutex::new(Some(listener)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    /// Files claimed at the last scan.
    pub async fn files(&self) -> BTreeMap<String, String> {
        self.refresher.files.read().await.clone()
    }

    /// Scan, register, then serve and refresh in the background.
    ///
    /// Registration is retried; if every attempt fails the agent cannot be
    /// found by peers and the error is returned.
    pub async fn start(&self) -> Result<()> {
        let listener = self.listener.lock().await.take().ok_or_else(|| {
            P2PError::InvalidArgument(format!("agent {} already started", self.address))
        })?;

        self.set_state(AgentState::Scanning).await;
        let files = self.refresher.scan().await?;

        let retry = RetryConfig::registration(self.config.register_attempts);
        retry_with_backoff(&retry, || self.registry.register_all(&self.address, &files))
            .await
            .map_err(|e| {
                error!(
                    "Could not register {} with registry {}: {}",
                    self.address,
                    self.registry.address(),
                    e
                );
                e
            })?;
        self.set_state(AgentState::Registered).await;
        info!(
            "Registered {} with {} files at {}",
            self.address,
            files.len(),
            self.registry.address()
        );

        let server = RpcServer::spawn(
            listener,
            self.uploader.clone(),
            self.config.max_message_size,
        );
        let refresh = self.spawn_refresh();
        self.tasks.lock().await.extend([server, refresh]);
        self.set_state(AgentState::Serving).await;

        info!("Node running on {}", self.address);
        Ok(())
    }

    /// Fetch `filename` from a peer, then re-register so the registry
    /// lists this node as a holder too.
    pub async fn fetch(&self, filename: &str) -> Result<FetchOutcome> {
        let outcome = self.downloader.fetch(filename).await?;
        if let Err(e) = self.refresher.refresh().await {
            warn!(
                "Fetched {} but could not update registration: {}",
                filename, e
            );
        }
        Ok(outcome)
    }

    /// Rescan and re-register now, outside the periodic schedule.
    pub async fn refresh(&self) -> Result<()> {
        self.refresher.refresh().await
    }

    /// `start`, then serve until Ctrl+C.
    pub async fn run(&self) -> Result<()> {
        self.start().await?;
        tokio::signal::ctrl_c().await?;
        info!("Ctrl+C received, shutting down");
        self.shutdown().await;
        Ok(())
    }

    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.set_state(AgentState::Idle).await;
    }

    fn spawn_refresh(&self) -> JoinHandle<()> {
        let refresher = self.refresher.clone();
        let metrics = self.metrics.clone();
        let period = self.config.refresh_interval();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match refresher.refresh().await {
                    Ok(()) => info!("Node metrics: {}", metrics.get_metrics().await),
                    Err(e) => {
                        metrics.record_refresh_failure().await;
                        warn!("Error updating the file list: {}", e);
                    }
                }
            }
        })
    }

    async fn set_state(&self, state: AgentState) {
        *self.state.write().await = state;
    }
}

impl Drop for PeerAgent {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
