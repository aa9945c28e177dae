use log::{info, warn};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::core::Registry;
use crate::core::protocol::{NodeAddress, NodeEntry};
use crate::utils::{P2PError, Result};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// What one node claimed at the moment of the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub address: NodeAddress,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub nodes: Vec<NodeReport>,
    /// Entries that could not be reported; they never abort the sweep.
    pub skipped: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.skipped == 0
    }
}

/// Periodic diagnostic pass over the node registry.
///
/// Each tick takes the registry lock once for its snapshot, then reports
/// every node outside the lock.
pub struct LivenessSweep {
    registry: Registry,
    interval: Duration,
}

impl LivenessSweep {
    pub fn new(registry: Registry, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub async fn tick(&self) -> SweepReport {
        let snapshot = self.registry.list_nodes().await;
        let mut report = SweepReport::default();

        info!("Checking files on {} nodes", snapshot.len());
        for entry in snapshot {
            match Self::report_node(entry) {
                Ok(node) => {
                    info!("Node {} holds {} files:", node.address, node.files.len());
                    for filename in &node.files {
                        info!("  - {}", filename);
                    }
                    report.nodes.push(node);
                }
                Err(e) => {
                    warn!("Skipping node in sweep: {}", e);
                    report.skipped += 1;
                }
            }
        }

        info!("Registry metrics: {}", self.registry.metrics().get_metrics().await);
        report
    }

    fn report_node(entry: NodeEntry) -> Result<NodeReport> {
        entry.address.validate().map_err(|e| {
            P2PError::InvalidArgument(format!("malformed entry {}: {}", entry.address, e))
        })?;
        Ok(NodeReport {
            address: entry.address,
            files: entry.files.into_keys().collect(),
        })
    }

    /// Run the sweep on its own task until the handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}
