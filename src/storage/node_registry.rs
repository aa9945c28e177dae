use std::collections::{BTreeMap, HashMap};

use crate::core::protocol::{FileListing, NodeAddress, NodeEntry};

/// Table of known nodes and the files each claimed at its last registration.
///
/// Entries keep the position of their first registration, so iteration (and
/// therefore `find_node_with_file`) is deterministic for a given history.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    entries: Vec<NodeEntry>,
    positions: HashMap<NodeAddress, usize>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or wholesale replace the entry for `address`. Returns the
    /// previous file map, if any.
    pub fn register(
        &mut self,
        address: NodeAddress,
        files: BTreeMap<String, String>,
    ) -> Option<BTreeMap<String, String>> {
        match self.positions.get(&address) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].files, files)),
            None => {
                self.positions.insert(address.clone(), self.entries.len());
                self.entries.push(NodeEntry { address, files });
                None
            }
        }
    }

    pub fn find_node_with_file(&self, filename: &str) -> Option<&NodeAddress> {
        self.entries
            .iter()
            .find(|entry| entry.files.contains_key(filename))
            .map(|entry| &entry.address)
    }

    pub fn get(&self, address: &NodeAddress) -> Option<&NodeEntry> {
        self.positions.get(address).map(|&pos| &self.entries[pos])
    }

    pub fn list_nodes(&self) -> Vec<NodeEntry> {
        self.entries.clone()
    }

    pub fn list_files(&self) -> Vec<FileListing> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry.files.iter().map(|(filename, digest)| FileListing {
                    filename: filename.clone(),
                    address: entry.address.clone(),
                    digest: digest.clone(),
                })
            })
            .collect()
    }
}
