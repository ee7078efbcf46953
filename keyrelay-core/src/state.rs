//! Endpoint state persisted outside the relay.
//!
//! Holds the shared secret, so the file is written owner-only on unix.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::platform::get_default_state_path;
use crate::secret::SharedSecret;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointState {
    pub shared_secret: SharedSecret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    /// Unix milliseconds when the pairing was established.
    pub paired_at: i64,
}

impl EndpointState {
    pub fn new(shared_secret: SharedSecret) -> Self {
        Self {
            shared_secret,
            push_token: None,
            paired_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn default_path() -> PathBuf {
        get_default_state_path()
    }

    /// Load state; `None` when no pairing has been saved.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(self)?;
        write_private(path, &content)?;
        Ok(())
    }

    /// Delete saved state. Deleting absent state succeeds.
    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}
