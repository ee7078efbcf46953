//! Relay server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub storage_path: PathBuf,
    pub max_payload_size: usize,
    /// Requests allowed per room per minute.
    pub rate_limit_per_minute: u32,
    /// Documents untouched for longer than this are pruned.
    pub request_retention_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8743".to_string(),
            storage_path: PathBuf::from("relay.db"),
            max_payload_size: 65_536,
            rate_limit_per_minute: 120,
            request_retention_secs: 7 * 86_400,
            cleanup_interval_secs: 3_600,
        }
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml_dep::from_str(&content)?;
        Ok(config)
    }
}
