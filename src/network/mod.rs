pub mod registry_client;
pub mod rpc;
pub mod transport;

pub use registry_client::RegistryClient;
pub use rpc::{RpcClient, RpcHandler, RpcServer};
pub use transport::Transport;
