//! Edge P2P File Sharing Library
//!
//! Regular nodes register their files with an edge registry, look up which
//! peer holds a file, and transfer it directly from that peer with digest
//! verification.

pub mod core;
pub mod network;
pub mod storage;
pub mod transfer;
pub mod utils;

// Re-export main types
pub use crate::core::{
    AgentConfig, AgentState, LivenessSweep, NodeAddress, PeerAgent, Registry, RegistryConfig,
    RegistryNode,
};
pub use crate::network::RegistryClient;
pub use crate::storage::{ContentDigest, Sha256Digest};
pub use crate::transfer::FetchOutcome;
pub use crate::utils::error::{P2PError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
