use std::collections::HashMap;

use crate::core::protocol::{Location, NodeAddress};

/// Maps a filename to every location that registered it.
///
/// Insertion is a keyed upsert on `(address, filename)`: a repeated
/// registration updates the digest in place instead of appending.
#[derive(Debug, Default)]
pub struct FileLocationIndex {
    locations: HashMap<String, Vec<Location>>,
}

impl FileLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_file(&mut self, address: NodeAddress, filename: &str, digest: &str) {
        let entries = self.locations.entry(filename.to_string()).or_default();
        match entries.iter_mut().find(|loc| loc.address == address) {
            Some(existing) => existing.digest = digest.to_string(),
            None => entries.push(Location {
                address,
                digest: digest.to_string(),
            }),
        }
    }

    /// Drop `address` from the locations of `filename`.
    pub fn remove(&mut self, address: &NodeAddress, filename: &str) -> bool {
        let Some(entries) = self.locations.get_mut(filename) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|loc| &loc.address != address);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.locations.remove(filename);
        }
        removed
    }

    pub fn locate_file(&self, filename: &str) -> Vec<Location> {
        self.locations.get(filename).cloned().unwrap_or_default()
    }

    /// Addresses holding `filename`, in index order, without digests.
    pub fn search(&self, filename: &str) -> Vec<NodeAddress> {
        self.locations
            .get(filename)
            .map(|entries| entries.iter().map(|loc| loc.address.clone()).collect())
            .unwrap_or_default()
    }
}
