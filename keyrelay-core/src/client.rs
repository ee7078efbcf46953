//! Relay client: the encrypted request lifecycle on top of a [`RelayBackend`].
//!
//! Every record the client writes is an envelope whose `data` is channel
//! ciphertext. Every record it reads is treated as untrusted: envelope
//! shape, declared type, authentication and payload schema are all checked
//! before anything is handed back. The relay has no transactions, so
//! `update_request` is a plain read-modify-write and the last writer wins.

use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::crypto::channel::{decrypt_with_schema, encrypt};
use crate::models::{
    AnyPayload, DeviceRegistration, Request, RequestPayload, RequestStatus, RequestType,
    StoredRegistration, StoredRequest,
};
use crate::notify::{PushMessage, PushNotifier, PushOutcome};
use crate::relay::{registration_path, request_path, room_requests_path, RelayBackend};
use crate::schema::{
    FieldViolation, ValidationError, DEVICE_REGISTRATION_SCHEMA, ENVELOPE_SCHEMA,
    REGISTRATION_ENVELOPE_SCHEMA,
};
use crate::secret::{RoomId, SharedSecret};
use crate::{KeyRelayError, Result};

/// Length of the random suffix of a request id.
const REQUEST_ID_SUFFIX_LEN: usize = 8;

/// Options for [`RelayClient::submit_request`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Wake the key-holding device through its registered push token.
    pub notify: bool,
}

impl SubmitOptions {
    pub fn notify() -> Self {
        Self { notify: true }
    }
}

/// Result of a successful submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub id: String,
    pub push: PushOutcome,
}

/// One endpoint's handle on a paired room.
pub struct RelayClient {
    backend: Arc<dyn RelayBackend>,
    secret: SharedSecret,
    room_id: RoomId,
    notifier: Option<Arc<dyn PushNotifier>>,
    push_token: RwLock<Option<String>>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("room_id", &self.room_id)
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

/// `{unix millis}-{8 random alphanumerics}`.
pub fn generate_request_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", now_millis(), suffix)
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn malformed(path: &str, reason: impl ToString) -> KeyRelayError {
    KeyRelayError::MalformedEnvelope {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_envelope(path: &str, value: Value) -> Result<StoredRequest> {
    ENVELOPE_SCHEMA
        .validate(&value)
        .map_err(|e| malformed(path, e))?;
    serde_json::from_value(value).map_err(|e| malformed(path, e))
}

fn status_of(value: &Value) -> Option<RequestStatus> {
    value.get("status").and_then(Value::as_str).and_then(RequestStatus::parse)
}

fn typed<T: RequestPayload>(request_type: RequestType, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        ValidationError::new(
            request_type.schema().name,
            vec![FieldViolation::new("$", e.to_string())],
        )
        .into()
    })
}

impl RelayClient {
    pub fn new(backend: Arc<dyn RelayBackend>, secret: SharedSecret) -> Self {
        let room_id = secret.room_id();
        Self {
            backend,
            secret,
            room_id,
            notifier: None,
            push_token: RwLock::new(None),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PushNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Seed the push-token cache, e.g. from persisted endpoint state.
    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = RwLock::new(Some(token.into()));
        self
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Push token last seen, if any.
    pub async fn push_token(&self) -> Option<String> {
        self.push_token.read().await.clone()
    }

    /// Encrypt and store a new request; status must be `pending`.
    pub async fn submit_request<T: RequestPayload>(
        &self,
        payload: &T,
        options: SubmitOptions,
    ) -> Result<Submitted> {
        let request_type = T::REQUEST_TYPE;
        let value = serde_json::to_value(payload)?;
        request_type.schema().validate(&value)?;
        if payload.status() != RequestStatus::Pending {
            return Err(ValidationError::new(
                request_type.schema().name,
                vec![FieldViolation::new(
                    "status",
                    format!("new requests must be pending, got {}", payload.status()),
                )],
            )
            .into());
        }

        // resolve push prerequisites before anything is written
        let push_target = if options.notify {
            let notifier = self.notifier.clone().ok_or_else(|| {
                KeyRelayError::Config("notification requested but no push notifier configured".into())
            })?;
            let token = self.resolve_push_token().await?;
            Some((notifier, token))
        } else {
            None
        };

        let id = generate_request_id();
        let envelope = StoredRequest {
            request_type,
            data: encrypt(&value, &self.secret)?,
            last_updated: now_millis(),
        };
        let path = request_path(&self.room_id, &id);
        self.backend
            .put(&path, &serde_json::to_value(&envelope)?)
            .await?;
        info!("Submitted {} request {} to room {}", request_type, id, self.room_id);

        let push = match push_target {
            None => PushOutcome::NotRequested,
            Some((notifier, token)) => {
                let message = PushMessage {
                    target_token: token,
                    room_id: self.room_id.to_string(),
                    request_id: id.clone(),
                };
                match notifier.notify(&message).await {
                    Ok(()) => PushOutcome::Delivered,
                    Err(e) => {
                        warn!("Push notification for request {} failed: {}", id, e);
                        PushOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        Ok(Submitted { id, push })
    }

    /// Shallow-merge `partial` over the stored payload and rewrite it.
    pub async fn update_request<T: RequestPayload>(
        &self,
        id: &str,
        partial: Map<String, Value>,
    ) -> Result<Request<T>> {
        let (value, last_updated) = self.update_value(id, T::REQUEST_TYPE, partial).await?;
        Ok(Request {
            id: id.to_string(),
            request_type: T::REQUEST_TYPE,
            payload: typed(T::REQUEST_TYPE, value)?,
            last_updated,
        })
    }

    /// [`update_request`](Self::update_request) with the type chosen at runtime.
    pub async fn update_any_request(
        &self,
        id: &str,
        request_type: RequestType,
        partial: Map<String, Value>,
    ) -> Result<Request<AnyPayload>> {
        let (value, last_updated) = self.update_value(id, request_type, partial).await?;
        Ok(Request {
            id: id.to_string(),
            request_type,
            payload: AnyPayload::from_value(request_type, value).map_err(|e| {
                KeyRelayError::from(ValidationError::new(
                    request_type.schema().name,
                    vec![FieldViolation::new("$", e.to_string())],
                ))
            })?,
            last_updated,
        })
    }

    async fn update_value(
        &self,
        id: &str,
        request_type: RequestType,
        partial: Map<String, Value>,
    ) -> Result<(Value, i64)> {
        let (current, _) = self.read_payload(id, request_type).await?;
        let from = status_of(&current).unwrap_or(RequestStatus::Pending);

        let mut merged = match current {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(partial);
        let merged = Value::Object(merged);
        request_type.schema().validate(&merged)?;

        let to = status_of(&merged).unwrap_or(from);
        if !from.can_transition_to(to) {
            return Err(KeyRelayError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }

        let envelope = StoredRequest {
            request_type,
            data: encrypt(&merged, &self.secret)?,
            last_updated: now_millis(),
        };
        self.backend
            .put(
                &request_path(&self.room_id, id),
                &serde_json::to_value(&envelope)?,
            )
            .await?;
        info!("Updated {} request {} ({} -> {})", request_type, id, from, to);

        Ok((merged, envelope.last_updated))
    }

    /// Fetch and decrypt one request of a known type.
    pub async fn get_request<T: RequestPayload>(&self, id: &str) -> Result<Request<T>> {
        let (value, last_updated) = self.read_payload(id, T::REQUEST_TYPE).await?;
        Ok(Request {
            id: id.to_string(),
            request_type: T::REQUEST_TYPE,
            payload: typed(T::REQUEST_TYPE, value)?,
            last_updated,
        })
    }

    /// [`get_request`](Self::get_request) with the type chosen at runtime.
    pub async fn get_any_request(
        &self,
        id: &str,
        request_type: RequestType,
    ) -> Result<Request<AnyPayload>> {
        let (value, last_updated) = self.read_payload(id, request_type).await?;
        let payload = AnyPayload::from_value(request_type, value).map_err(|e| {
            KeyRelayError::from(ValidationError::new(
                request_type.schema().name,
                vec![FieldViolation::new("$", e.to_string())],
            ))
        })?;
        Ok(Request {
            id: id.to_string(),
            request_type,
            payload,
            last_updated,
        })
    }

    /// Envelope checks, type check, then decrypt and schema-validate.
    async fn read_payload(&self, id: &str, expected: RequestType) -> Result<(Value, i64)> {
        let path = request_path(&self.room_id, id);
        let raw = self
            .backend
            .get(&path)
            .await?
            .ok_or_else(|| KeyRelayError::NotFound(format!("request {}", id)))?;

        let envelope = parse_envelope(&path, raw)?;
        if envelope.request_type != expected {
            return Err(KeyRelayError::TypeMismatch {
                id: id.to_string(),
                expected,
                actual: envelope.request_type,
            });
        }

        let value: Value = decrypt_with_schema(&envelope.data, &self.secret, expected.schema())?;
        debug!("Read {} request {}", expected, id);
        Ok((value, envelope.last_updated))
    }

    /// Every readable request in the room, oldest first.
    ///
    /// Entries that fail any check are logged and skipped; anyone who can
    /// guess the room id can write garbage here.
    pub async fn get_requests(&self) -> Result<Vec<Request<AnyPayload>>> {
        let path = room_requests_path(&self.room_id);
        let listing = match self.backend.get(&path).await? {
            None => return Ok(Vec::new()),
            Some(Value::Object(map)) => map,
            Some(other) => {
                warn!("Ignoring non-object listing at {}: {}", path, other);
                return Ok(Vec::new());
            }
        };

        let mut requests = Vec::with_capacity(listing.len());
        for (id, raw) in listing {
            match self.open_listed(&path, &id, raw) {
                Ok(request) => requests.push(request),
                Err(e) => warn!("Skipping request {} in room {}: {}", id, self.room_id, e),
            }
        }

        requests.sort_by(|a, b| {
            a.last_updated
                .cmp(&b.last_updated)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(requests)
    }

    fn open_listed(&self, room_path: &str, id: &str, raw: Value) -> Result<Request<AnyPayload>> {
        let path = format!("{}/{}", room_path, id);
        let envelope = parse_envelope(&path, raw)?;
        let request_type = envelope.request_type;
        let value: Value =
            decrypt_with_schema(&envelope.data, &self.secret, request_type.schema())?;
        let payload = AnyPayload::from_value(request_type, value).map_err(|e| malformed(&path, e))?;
        Ok(Request {
            id: id.to_string(),
            request_type,
            payload,
            last_updated: envelope.last_updated,
        })
    }

    /// Remove a request. Removing an absent request succeeds.
    pub async fn delete_request(&self, id: &str) -> Result<()> {
        self.backend
            .delete(&request_path(&self.room_id, id))
            .await?;
        info!("Deleted request {} from room {}", id, self.room_id);
        Ok(())
    }

    /// Store the key-holding device's push registration for this room.
    pub async fn submit_device(&self, registration: &DeviceRegistration) -> Result<()> {
        let value = serde_json::to_value(registration)?;
        DEVICE_REGISTRATION_SCHEMA.validate(&value)?;

        let envelope = StoredRegistration {
            data: encrypt(&value, &self.secret)?,
            last_updated: now_millis(),
        };
        self.backend
            .put(
                &registration_path(&self.room_id),
                &serde_json::to_value(&envelope)?,
            )
            .await?;
        *self.push_token.write().await = Some(registration.push_token.clone());
        info!("Registered device {:?} for room {}", registration.device_name, self.room_id);
        Ok(())
    }

    /// Read the push registration for this room.
    ///
    /// Absent, malformed or undecryptable records all read as `None`: a record
    /// we cannot open was most likely left behind by an earlier pairing, so
    /// any cached token is dropped with it. Relay transport failures still
    /// propagate.
    pub async fn get_device(&self) -> Result<Option<DeviceRegistration>> {
        let path = registration_path(&self.room_id);
        let Some(raw) = self.backend.get(&path).await? else {
            return Ok(None);
        };

        match self.open_registration(&path, raw) {
            Ok(registration) => {
                *self.push_token.write().await = Some(registration.push_token.clone());
                Ok(Some(registration))
            }
            Err(e) => {
                warn!("Treating registration in room {} as absent: {}", self.room_id, e);
                *self.push_token.write().await = None;
                Ok(None)
            }
        }
    }

    fn open_registration(&self, path: &str, raw: Value) -> Result<DeviceRegistration> {
        REGISTRATION_ENVELOPE_SCHEMA
            .validate(&raw)
            .map_err(|e| malformed(path, e))?;
        let envelope: StoredRegistration =
            serde_json::from_value(raw).map_err(|e| malformed(path, e))?;
        decrypt_with_schema(&envelope.data, &self.secret, &DEVICE_REGISTRATION_SCHEMA)
    }

    /// Remove the push registration for this room.
    pub async fn delete_device(&self) -> Result<()> {
        self.backend
            .delete(&registration_path(&self.room_id))
            .await?;
        *self.push_token.write().await = None;
        info!("Removed device registration for room {}", self.room_id);
        Ok(())
    }

    async fn resolve_push_token(&self) -> Result<String> {
        if let Some(token) = self.push_token().await {
            return Ok(token);
        }
        self.get_device()
            .await?
            .map(|registration| registration.push_token)
            .ok_or_else(|| {
                KeyRelayError::MissingCredential(format!(
                    "no push token registered for room {}",
                    self.room_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PairingRequest, SignPersonalMessageRequest};
    use crate::notify::NotifyError;
    use crate::relay::MemoryRelay;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const FROM: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<PushMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl PushNotifier for RecordingNotifier {
        async fn notify(&self, message: &PushMessage) -> std::result::Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                Err(NotifyError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn client_on(relay: &MemoryRelay, byte: u8) -> RelayClient {
        RelayClient::new(Arc::new(relay.clone()), SharedSecret::from_bytes([byte; 32]))
    }

    fn partial(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("partial must be an object"),
        }
    }

    #[test]
    fn request_id_format() {
        let id = generate_request_id();
        let (millis, suffix) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), REQUEST_ID_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[tokio::test]
    async fn stored_envelope_hides_payload() {
        let relay = MemoryRelay::new();
        let client = client_on(&relay, 1);
        let submitted = client
            .submit_request(&SignPersonalMessageRequest::new(FROM, "top secret"), SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(submitted.push, PushOutcome::NotRequested);

        let docs = relay.snapshot().await;
        let raw = docs
            .get(&request_path(client.room_id(), &submitted.id))
            .unwrap();
        assert_eq!(raw["type"], json!("signPersonalMessage"));
        assert!(!raw.to_string().contains("top secret"));
    }

    #[tokio::test]
    async fn submit_rejects_non_pending() {
        let client = client_on(&MemoryRelay::new(), 1);
        let mut payload = PairingRequest::pending();
        payload.status = RequestStatus::Approved;
        let err = client
            .submit_request(&payload, SubmitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRelayError::Validation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn submit_rejects_schema_violation() {
        let client = client_on(&MemoryRelay::new(), 1);
        let err = client
            .submit_request(&SignPersonalMessageRequest::new("not-an-address", "hi"), SubmitOptions::default())
            .await
            .unwrap_err();
        match err {
            KeyRelayError::Validation(v) => assert_eq!(v.fields(), vec!["from"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_merges_and_refreshes() {
        let client = client_on(&MemoryRelay::new(), 2);
        let id = client
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;

        let updated: Request<PairingRequest> = client
            .update_request(&id, partial(json!({"status": "approved", "deviceName": "Pixel"})))
            .await
            .unwrap();
        assert_eq!(updated.payload.status, RequestStatus::Approved);
        assert_eq!(updated.payload.device_name.as_deref(), Some("Pixel"));

        let read: Request<PairingRequest> = client.get_request(&id).await.unwrap();
        assert_eq!(read.payload, updated.payload);
        assert_eq!(read.last_updated, updated.last_updated);
    }

    #[tokio::test]
    async fn update_refuses_backward_transition() {
        let client = client_on(&MemoryRelay::new(), 2);
        let id = client
            .submit_request(&PairingRequest::pending(), SubmitOptions::default())
            .await
            .unwrap()
            .id;
        client
            .update_request::<PairingRequest>(&id, partial(json!({"status": "rejected"})))
            .await
            .unwrap();

        let err = client
            .update_request::<PairingRequest>(&id, partial(json!({"status": "pending"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KeyRelayError::InvalidTransition {
                from: RequestStatus::Rejected,
                to: RequestStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_rejects_invalid_merge() {
        let client = client_on(&MemoryRelay::new(), 2);
        let id = client
            .submit_request(&SignPersonalMessageRequest::new(FROM, "hi"), SubmitOptions::default())
            .await
            .unwrap()
            .id;
        let err = client
            .update_request::<SignPersonalMessageRequest>(
                &id,
                partial(json!({"status": "approved", "signature": "zz"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRelayError::Validation(_)));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let client = client_on(&MemoryRelay::new(), 2);
        let err = client
            .update_request::<PairingRequest>("1-missing", partial(json!({"status": "approved"})))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_envelope_reported() {
        let relay = MemoryRelay::new();
        let client = client_on(&relay, 3);
        relay
            .put(&request_path(client.room_id(), "1-bad"), &json!({"type": "pairing"}))
            .await
            .unwrap();
        let err = client.get_request::<PairingRequest>("1-bad").await.unwrap_err();
        assert!(matches!(err, KeyRelayError::MalformedEnvelope { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn schema_violation_is_validation_error() {
        let relay = MemoryRelay::new();
        let client = client_on(&relay, 3);
        let envelope = StoredRequest {
            request_type: RequestType::SignPersonalMessage,
            data: encrypt(
                &json!({"status": "pending", "from": "nobody"}),
                &SharedSecret::from_bytes([3; 32]),
            )
            .unwrap(),
            last_updated: 1,
        };
        relay
            .put(
                &request_path(client.room_id(), "1-invalid"),
                &serde_json::to_value(&envelope).unwrap(),
            )
            .await
            .unwrap();

        let err = client
            .get_request::<SignPersonalMessageRequest>("1-invalid")
            .await
            .unwrap_err();
        match err {
            KeyRelayError::Validation(e) => {
                let fields = e.fields();
                assert!(fields.contains(&"from"), "{fields:?}");
                assert!(fields.contains(&"message"), "{fields:?}");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_ciphertext_is_decryption_error() {
        let relay = MemoryRelay::new();
        let ours = client_on(&relay, 3);
        let envelope = StoredRequest {
            request_type: RequestType::Pairing,
            data: encrypt(&json!({"status": "pending"}), &SharedSecret::from_bytes([9; 32])).unwrap(),
            last_updated: 1,
        };
        relay
            .put(
                &request_path(ours.room_id(), "1-foreign"),
                &serde_json::to_value(&envelope).unwrap(),
            )
            .await
            .unwrap();

        let err = ours.get_request::<PairingRequest>("1-foreign").await.unwrap_err();
        assert!(matches!(err, KeyRelayError::Decryption(_)), "{err:?}");
    }

    #[tokio::test]
    async fn any_request_by_runtime_type() {
        let client = client_on(&MemoryRelay::new(), 4);
        let id = client
            .submit_request(&SignPersonalMessageRequest::new(FROM, "hi"), SubmitOptions::default())
            .await
            .unwrap()
            .id;

        let updated = client
            .update_any_request(
                &id,
                RequestType::SignPersonalMessage,
                partial(json!({"status": "approved", "signature": "0xabcd"})),
            )
            .await
            .unwrap();
        assert_eq!(updated.payload.status(), RequestStatus::Approved);

        let read = client
            .get_any_request(&id, RequestType::SignPersonalMessage)
            .await
            .unwrap();
        match read.payload {
            AnyPayload::SignPersonalMessage(p) => assert_eq!(p.signature.as_deref(), Some("0xabcd")),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn notify_without_token_fails_before_write() {
        let relay = MemoryRelay::new();
        let client = client_on(&relay, 5).with_notifier(Arc::new(RecordingNotifier::default()));
        let err = client
            .submit_request(&PairingRequest::pending(), SubmitOptions::notify())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRelayError::MissingCredential(_)));
        assert!(relay.is_empty().await);
    }

    #[tokio::test]
    async fn notify_without_notifier_is_config_error() {
        let client = client_on(&MemoryRelay::new(), 5).with_push_token("tok");
        let err = client
            .submit_request(&PairingRequest::pending(), SubmitOptions::notify())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRelayError::Config(_)));
    }

    #[tokio::test]
    async fn notify_uses_registered_token() {
        let relay = MemoryRelay::new();
        let device_side = client_on(&relay, 6);
        device_side
            .submit_device(&DeviceRegistration {
                push_token: "device-token".to_string(),
                device_name: "Pixel".to_string(),
            })
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let signer_side = client_on(&relay, 6).with_notifier(notifier.clone());
        let submitted = signer_side
            .submit_request(&PairingRequest::pending(), SubmitOptions::notify())
            .await
            .unwrap();

        assert_eq!(submitted.push, PushOutcome::Delivered);
        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![PushMessage {
                target_token: "device-token".to_string(),
                room_id: signer_side.room_id().to_string(),
                request_id: submitted.id.clone(),
            }]
        );
        assert_eq!(signer_side.push_token().await.as_deref(), Some("device-token"));
    }

    #[tokio::test]
    async fn failed_push_keeps_request() {
        let relay = MemoryRelay::new();
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let client = client_on(&relay, 7)
            .with_push_token("tok")
            .with_notifier(notifier);

        let submitted = client
            .submit_request(&PairingRequest::pending(), SubmitOptions::notify())
            .await
            .unwrap();
        assert!(matches!(submitted.push, PushOutcome::Failed(_)));
        assert!(client.get_request::<PairingRequest>(&submitted.id).await.is_ok());
    }

    #[tokio::test]
    async fn device_roundtrip_and_removal() {
        let client = client_on(&MemoryRelay::new(), 8);
        assert_eq!(client.get_device().await.unwrap(), None);

        let registration = DeviceRegistration {
            push_token: "abc".to_string(),
            device_name: "Phone".to_string(),
        };
        client.submit_device(&registration).await.unwrap();
        assert_eq!(client.get_device().await.unwrap(), Some(registration));

        client.delete_device().await.unwrap();
        assert_eq!(client.get_device().await.unwrap(), None);
        assert_eq!(client.push_token().await, None);
        client.delete_device().await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_registration_drops_cached_token() {
        let relay = MemoryRelay::new();
        let client = client_on(&relay, 8).with_push_token("stale");
        let leftover = StoredRegistration {
            data: encrypt(
                &json!({"pushToken": "old", "deviceName": "Old"}),
                &SharedSecret::from_bytes([9; 32]),
            )
            .unwrap(),
            last_updated: 1,
        };
        relay
            .put(
                &registration_path(client.room_id()),
                &serde_json::to_value(&leftover).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(client.get_device().await.unwrap(), None);
        assert_eq!(client.push_token().await, None);

        let client = client.with_notifier(Arc::new(RecordingNotifier::default()));
        let err = client
            .submit_request(&PairingRequest::pending(), SubmitOptions::notify())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRelayError::MissingCredential(_)), "{err:?}");
    }

    #[tokio::test]
    async fn empty_push_token_rejected() {
        let client = client_on(&MemoryRelay::new(), 8);
        let err = client
            .submit_device(&DeviceRegistration {
                push_token: " ".to_string(),
                device_name: "Phone".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KeyRelayError::Validation(_)));
    }
}
