use log::info;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::protocol::NodeAddress;
use crate::core::{LivenessSweep, Registry, RegistryConfig};
use crate::network::{RpcServer, rpc};
use crate::utils::{P2PError, Result};

/// The registry process: RPC listener plus the liveness sweep.
pub struct RegistryNode {
    config: RegistryConfig,
    address: NodeAddress,
    registry: Registry,
    listener: Mutex<Option<TcpListener>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RegistryNode {
    pub async fn bind(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let (listener, address) = rpc::bind(&config.host, config.port).await?;

        Ok(Self {
            config,
            address,
            registry: Registry::new(),
            listener: Mutex::new(Some(listener)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn start(&self) -> Result<()> {
        let listener = self.listener.lock().await.take().ok_or_else(|| {
            P2PError::InvalidArgument(format!("registry {} already started", self.address))
        })?;

        let server = RpcServer::spawn(
            listener,
            std::sync::Arc::new(self.registry.clone()),
            self.config.max_message_size,
        );
        let sweep =
            LivenessSweep::new(self.registry.clone(), self.config.sweep_interval()).spawn();
        self.tasks.lock().await.extend([server, sweep]);

        info!(
            "Registry running on {} (sweep every {:?})",
            self.address,
            self.config.sweep_interval()
        );
        Ok(())
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
    }
}

impl Drop for RegistryNode {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
