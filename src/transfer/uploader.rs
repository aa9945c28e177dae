use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info};
use std::sync::Arc;

use crate::core::protocol::{Request, Response};
use crate::network::RpcHandler;
use crate::storage::FileStore;
use crate::utils::{MetricsCollector, P2PError, Result};

/// Serves `download` requests from the local store. The disk, not the last
/// registration, decides whether a file exists.
pub struct Uploader {
    store: Arc<FileStore>,
    metrics: MetricsCollector,
}

impl Uploader {
    pub fn new(store: Arc<FileStore>, metrics: MetricsCollector) -> Self {
        Self { store, metrics }
    }

    pub async fn download(&self, filename: &str) -> Result<Vec<u8>> {
        info!("Received download request for file: {}", filename);
        let content = self.store.read_file(filename).await?;
        self.metrics
            .record_download_served(content.len() as u64)
            .await;
        debug!("Serving {} ({} bytes)", filename, content.len());
        Ok(content)
    }
}

#[async_trait::async_trait]
impl RpcHandler for Uploader {
    async fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::Download { filename } => {
                let content = self.download(&filename).await?;
                Ok(Response::Content {
                    filename,
                    data: BASE64.encode(content),
                })
            }
            other => Err(P2PError::ProtocolFault(format!(
                "{} is a registry operation; this is a peer node",
                other.operation()
            ))),
        }
    }
}
