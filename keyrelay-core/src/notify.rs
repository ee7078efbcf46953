//! Push notification hook fired after a request is written.
//!
//! A notification only wakes the key-holding device; it carries the room and
//! request ids, never payload. Delivery is best effort: a failure is reported
//! in [`PushOutcome`] and never undoes the write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body delivered to the push endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub target_token: String,
    pub room_id: String,
    pub request_id: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Push transport error: {0}")]
    Transport(String),

    #[error("Push endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outcome of the notification attempt attached to a submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    NotRequested,
    Delivered,
    Failed(String),
}

impl PushOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify(&self, message: &PushMessage) -> Result<(), NotifyError>;
}

#[cfg(feature = "http")]
pub use http::HttpPushNotifier;

#[cfg(feature = "http")]
mod http {
    use super::{NotifyError, PushMessage, PushNotifier};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Posts [`PushMessage`] as JSON to a push gateway.
    #[derive(Debug, Clone)]
    pub struct HttpPushNotifier {
        client: reqwest::Client,
        endpoint: String,
    }

    impl HttpPushNotifier {
        pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, NotifyError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            Ok(Self {
                client,
                endpoint: endpoint.to_string(),
            })
        }
    }

    #[async_trait]
    impl PushNotifier for HttpPushNotifier {
        async fn notify(&self, message: &PushMessage) -> Result<(), NotifyError> {
            let resp = self
                .client
                .post(&self.endpoint)
                .json(message)
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
                return Err(NotifyError::Rejected { status, body });
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn message() -> PushMessage {
            PushMessage {
                target_token: "tok".to_string(),
                room_id: "ROOM".to_string(),
                request_id: "1-abc".to_string(),
            }
        }

        #[tokio::test]
        async fn posts_camel_case_body() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/push"))
                .and(body_json(json!({
                    "targetToken": "tok",
                    "roomId": "ROOM",
                    "requestId": "1-abc"
                })))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;

            let notifier =
                HttpPushNotifier::new(&format!("{}/push", server.uri()), Duration::from_secs(5))
                    .unwrap();
            notifier.notify(&message()).await.unwrap();
        }

        #[tokio::test]
        async fn non_success_is_rejected() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(503).set_body_string("down"))
                .mount(&server)
                .await;

            let notifier =
                HttpPushNotifier::new(&format!("{}/push", server.uri()), Duration::from_secs(5))
                    .unwrap();
            assert_eq!(
                notifier.notify(&message()).await.unwrap_err(),
                NotifyError::Rejected {
                    status: 503,
                    body: "down".to_string()
                }
            );
        }
    }
}
