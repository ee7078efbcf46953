//! In-process relay used by tests and local demos.

use super::path::validate_path;
use super::tree::{ancestors, assemble};
use super::{RelayBackend, RelayError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Relay held in memory. Clones share the same store, so two endpoints built
/// from clones of one `MemoryRelay` talk to each other.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    docs: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Copy of every stored document keyed by path.
    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.docs.read().await.clone()
    }
}

fn remove_subtree(docs: &mut BTreeMap<String, Value>, path: &str) {
    let child_prefix = format!("{}/", path);
    docs.remove(path);
    docs.retain(|key, _| !key.starts_with(&child_prefix));
}

#[async_trait]
impl RelayBackend for MemoryRelay {
    async fn get(&self, path: &str) -> Result<Option<Value>, RelayError> {
        validate_path(path)?;
        let docs = self.docs.read().await;
        let candidates = docs
            .range(path.to_string()..)
            .take_while(|(key, _)| key.starts_with(path))
            .map(|(key, value)| (key.as_str(), value));
        Ok(assemble(path, candidates))
    }

    async fn put(&self, path: &str, value: &Value) -> Result<(), RelayError> {
        validate_path(path)?;
        let mut docs = self.docs.write().await;
        remove_subtree(&mut docs, path);
        if value.is_null() {
            return Ok(());
        }
        for ancestor in ancestors(path) {
            docs.remove(ancestor);
        }
        docs.insert(path.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RelayError> {
        validate_path(path)?;
        remove_subtree(&mut *self.docs.write().await, path);
        Ok(())
    }
}
