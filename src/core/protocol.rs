use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::utils::{P2PError, Result};

/// Network identity of a node: the address its RPC listener answers on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(P2PError::InvalidArgument("empty host".to_string()));
        }
        if self.port == 0 {
            return Err(P2PError::InvalidArgument(format!(
                "invalid port {} for host {}",
                self.port, self.host
            )));
        }
        Ok(())
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for NodeAddress {
    type Err = P2PError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| P2PError::InvalidArgument(format!("expected host:port, got {}", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| P2PError::InvalidArgument(format!("invalid port in {}: {}", s, e)))?;
        let address = NodeAddress::new(host, port);
        address.validate()?;
        Ok(address)
    }
}

/// A file a node claims to hold, identified by name and content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub digest: String,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            digest: digest.into(),
        }
    }
}

/// Registry-side view of one node and everything it claimed at its last
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub address: NodeAddress,
    pub files: BTreeMap<String, String>,
}

/// One place a file can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub address: NodeAddress,
    pub digest: String,
}

/// Flattened `(filename, address, digest)` row returned by `list_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub filename: String,
    pub address: NodeAddress,
    pub digest: String,
}

/// Error classification carried across the wire in `Response::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    IntegrityMismatch,
    Unreachable,
    ProtocolFault,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    RegisterNode {
        address: NodeAddress,
        files: BTreeMap<String, String>,
    },
    RegisterFile {
        address: NodeAddress,
        record: FileRecord,
    },
    FindNodeWithFile {
        filename: String,
    },
    LocateFile {
        filename: String,
    },
    Search {
        filename: String,
    },
    ListNodes,
    ListFiles,
    Download {
        filename: String,
    },
}

impl Request {
    /// Operation name as used in logs and error messages.
    pub fn operation(&self) -> &'static str {
        match self {
            Request::RegisterNode { .. } => "register_node",
            Request::RegisterFile { .. } => "register_file",
            Request::FindNodeWithFile { .. } => "find_node_with_file",
            Request::LocateFile { .. } => "locate_file",
            Request::Search { .. } => "search",
            Request::ListNodes => "list_nodes",
            Request::ListFiles => "list_files",
            Request::Download { .. } => "download",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ack {
        success: bool,
    },
    Node {
        address: Option<NodeAddress>,
    },
    Locations {
        locations: Vec<Location>,
    },
    Addresses {
        addresses: Vec<NodeAddress>,
    },
    Nodes {
        nodes: Vec<NodeEntry>,
    },
    Files {
        files: Vec<FileListing>,
    },
    Content {
        filename: String,
        /// Base64 (standard alphabet) file bytes.
        data: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn error(err: &P2PError) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.detail(),
        }
    }

    /// Turn a remote `Error` response back into a local error.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Response::Error { kind, message } => Err(P2PError::from_remote(kind, message)),
            other => Ok(other),
        }
    }
}

/// Envelope for every frame on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    pub id: Uuid,
    pub timestamp: u64,
    pub body: T,
}

impl<T> Message<T> {
    pub fn new(body: T) -> Self {
        Self::with_id(Uuid::new_v4(), body)
    }

    /// Build a message answering the request identified by `id`.
    pub fn with_id(id: Uuid, body: T) -> Self {
        Self {
            id,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            body,
        }
    }
}
