//! Client configuration loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::get_default_config_path;
use crate::poll::PollOptions;
use crate::{KeyRelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub relay_url: String,
    /// Push gateway; notifications are unavailable when unset.
    pub push_url: Option<String>,
    pub http_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8743".to_string(),
            push_url: None,
            http_timeout_secs: 30,
            poll_interval_ms: 1_000,
            poll_timeout_secs: 300,
        }
    }
}

impl ClientConfig {
    pub fn default_path() -> PathBuf {
        get_default_config_path()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml_dep::from_str(&content)
            .map_err(|e| KeyRelayError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml_dep::to_string_pretty(self).map_err(|e| KeyRelayError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions::new(self.poll_interval_ms, self.poll_timeout_secs)
    }
}
