use std::collections::BTreeMap;

use crate::core::protocol::{
    FileListing, FileRecord, Location, NodeAddress, NodeEntry, Request, Response,
};
use crate::network::RpcClient;
use crate::utils::{P2PError, Result};

/// Typed client for the registry's remote operations.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    registry: NodeAddress,
    rpc: RpcClient,
}

impl RegistryClient {
    pub fn new(registry: NodeAddress, rpc: RpcClient) -> Self {
        Self { registry, rpc }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.registry
    }

    pub async fn register_node(
        &self,
        address: &NodeAddress,
        files: &BTreeMap<String, String>,
    ) -> Result<bool> {
        let request = Request::RegisterNode {
            address: address.clone(),
            files: files.clone(),
        };
        match self.call(request).await? {
            Response::Ack { success } => Ok(success),
            other => Err(unexpected("register_node", &other)),
        }
    }

    pub async fn register_file(&self, address: &NodeAddress, record: FileRecord) -> Result<bool> {
        let request = Request::RegisterFile {
            address: address.clone(),
            record,
        };
        match self.call(request).await? {
            Response::Ack { success } => Ok(success),
            other => Err(unexpected("register_file", &other)),
        }
    }

    /// Full registration: the node entry first, then one index record per
    /// file.
    pub async fn register_all(
        &self,
        address: &NodeAddress,
        files: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.register_node(address, files).await?;
        for (filename, digest) in files {
            self.register_file(address, FileRecord::new(filename, digest))
                .await?;
        }
        Ok(())
    }

    pub async fn find_node_with_file(&self, filename: &str) -> Result<Option<NodeAddress>> {
        let request = Request::FindNodeWithFile {
            filename: filename.to_string(),
        };
        match self.call(request).await? {
            Response::Node { address } => Ok(address),
            other => Err(unexpected("find_node_with_file", &other)),
        }
    }

    pub async fn locate_file(&self, filename: &str) -> Result<Vec<Location>> {
        let request = Request::LocateFile {
            filename: filename.to_string(),
        };
        match self.call(request).await? {
            Response::Locations { locations } => Ok(locations),
            other => Err(unexpected("locate_file", &other)),
        }
    }

    pub async fn search(&self, filename: &str) -> Result<Vec<NodeAddress>> {
        let request = Request::Search {
            filename: filename.to_string(),
        };
        match self.call(request).await? {
            Response::Addresses { addresses } => Ok(addresses),
            other => Err(unexpected("search", &other)),
        }
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeEntry>> {
        match self.call(Request::ListNodes).await? {
            Response::Nodes { nodes } => Ok(nodes),
            other => Err(unexpected("list_nodes", &other)),
        }
    }

    pub async fn list_files(&self) -> Result<Vec<FileListing>> {
        match self.call(Request::ListFiles).await? {
            Response::Files { files } => Ok(files),
            other => Err(unexpected("list_files", &other)),
        }
    }

    async fn call(&self, request: Request) -> Result<Response> {
        self.rpc.call(&self.registry, request).await
    }
}

pub(crate) fn unexpected(operation: &str, response: &Response) -> P2PError {
    P2PError::ProtocolFault(format!(
        "unexpected response to {}: {:?}",
        operation, response
    ))
}
