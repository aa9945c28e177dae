use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::protocol::NodeAddress;
use crate::network::rpc::DEFAULT_MAX_MESSAGE_SIZE;
use crate::utils::{P2PError, Result};

/// Registry process configuration.
///
/// Env overrides: `EDGE_REGISTRY_HOST`, `EDGE_REGISTRY_PORT`,
/// `EDGE_SWEEP_INTERVAL_SECS`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
    pub sweep_interval_secs: u64,
    pub max_message_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            sweep_interval_secs: 5,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("EDGE_REGISTRY_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("EDGE_REGISTRY_PORT") {
            self.port = parse_env("EDGE_REGISTRY_PORT", &port)?;
        }
        if let Some(secs) = lookup("EDGE_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse_env("EDGE_SWEEP_INTERVAL_SECS", &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(P2PError::ConfigError("registry host is empty".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(P2PError::ConfigError(
                "sweep interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Peer node agent configuration.
///
/// Env overrides: `EDGE_NODE_HOST`, `EDGE_NODE_PORT`, `EDGE_SHARED_DIR`,
/// `EDGE_REGISTRY_HOST`, `EDGE_REGISTRY_PORT`, `EDGE_REFRESH_INTERVAL_SECS`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub host: String,
    /// 0 lets the OS choose; the bound port is what gets registered.
    pub port: u16,
    pub shared_dir: PathBuf,
    pub registry_host: String,
    pub registry_port: u16,
    pub refresh_interval_secs: u64,
    pub transfer_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    pub register_attempts: u32,
    pub max_message_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
            shared_dir: PathBuf::from("./shared"),
            registry_host: "127.0.0.1".to_string(),
            registry_port: 8000,
            refresh_interval_secs: 60,
            transfer_timeout_secs: 30,
            rpc_timeout_secs: 5,
            register_attempts: 5,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl AgentConfig {
    pub fn registry_address(&self) -> NodeAddress {
        NodeAddress::new(self.registry_host.clone(), self.registry_port)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("EDGE_NODE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("EDGE_NODE_PORT") {
            self.port = parse_env("EDGE_NODE_PORT", &port)?;
        }
        if let Some(dir) = lookup("EDGE_SHARED_DIR") {
            self.shared_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("EDGE_REGISTRY_HOST") {
            self.registry_host = host;
        }
        if let Some(port) = lookup("EDGE_REGISTRY_PORT") {
            self.registry_port = parse_env("EDGE_REGISTRY_PORT", &port)?;
        }
        if let Some(secs) = lookup("EDGE_REFRESH_INTERVAL_SECS") {
            self.refresh_interval_secs = parse_env("EDGE_REFRESH_INTERVAL_SECS", &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(P2PError::ConfigError("node host is empty".to_string()));
        }
        self.registry_address()
            .validate()
            .map_err(|e| P2PError::ConfigError(format!("registry address: {}", e)))?;
        if self.refresh_interval_secs == 0 {
            return Err(P2PError::ConfigError(
                "refresh interval must be at least one second".to_string(),
            ));
        }
        if self.transfer_timeout_secs == 0 || self.rpc_timeout_secs == 0 {
            return Err(P2PError::ConfigError("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Load a TOML config file; missing keys fall back to defaults.
pub fn load_file<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw = std::fs::read_to_string(path)
        .map_err(|e| P2PError::ConfigError(format!("Failed to read {:?}: {}", path, e)))?;
    toml::from_str(&raw)
        .map_err(|e| P2PError::ConfigError(format!("Failed to parse {:?}: {}", path, e)))
}

/// Process environment lookup, for `apply_env`.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| P2PError::ConfigError(format!("{}={:?}: {}", key, value, e)))
}
