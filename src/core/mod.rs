pub mod agent;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod registry_node;
pub mod sweep;

pub use agent::{AgentState, PeerAgent};
pub use config::{AgentConfig, RegistryConfig};
pub use protocol::{FileListing, FileRecord, Location, NodeAddress, NodeEntry};
pub use registry::Registry;
pub use registry_node::RegistryNode;
pub use sweep::{LivenessSweep, SweepReport};
