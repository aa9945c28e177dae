pub mod digest;
pub mod file_store;
pub mod location_index;
pub mod node_registry;

pub use digest::{ContentDigest, Sha256Digest};
pub use file_store::{FileStore, validate_filename};
pub use location_index::FileLocationIndex;
pub use node_registry::NodeRegistry;
