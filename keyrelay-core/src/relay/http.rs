//! HTTP relay client speaking the `GET|PUT|DELETE {base}/{path}.json` protocol.

use super::path::validate_path;
use super::{RelayBackend, RelayError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Relay reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    /// Create a client for the relay at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    async fn status_error(path: &str, resp: reqwest::Response) -> RelayError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
        RelayError::Status {
            status,
            path: path.to_string(),
            body,
        }
    }
}

fn transport(e: reqwest::Error) -> RelayError {
    RelayError::Transport(e.to_string())
}

#[async_trait]
impl RelayBackend for HttpRelay {
    async fn get(&self, path: &str) -> Result<Option<Value>, RelayError> {
        validate_path(path)?;
        debug!("GET {}", path);

        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::status_error(path, resp).await);
        }

        let body = resp.text().await.map_err(transport)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| RelayError::InvalidResponse {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        Ok((!value.is_null()).then_some(value))
    }

    async fn put(&self, path: &str, value: &Value) -> Result<(), RelayError> {
        validate_path(path)?;
        debug!("PUT {}", path);

        let resp = self
            .client
            .put(self.url(path))
            .json(value)
            .send()
            .await
            .map_err(transport)?;

        if !resp.status().is_success() {
            return Err(Self::status_error(path, resp).await);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RelayError> {
        validate_path(path)?;
        debug!("DELETE {}", path);

        let resp = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .map_err(transport)?;

        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::status_error(path, resp).await)
        }
    }
}
