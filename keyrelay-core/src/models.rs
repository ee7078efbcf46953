//! Relay data models: request types, payload shapes, envelopes, device registration.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::schema::{
    Schema, IMPORT_ACCOUNT_SCHEMA, PAIRING_SCHEMA, SIGN_MESSAGE_SCHEMA,
    SIGN_PERSONAL_MESSAGE_SCHEMA, SIGN_TRANSACTION_SCHEMA, SIGN_TYPED_DATA_SCHEMA,
};

/// Closed set of request kinds exchanged through a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    Pairing,
    ImportAccount,
    SignPersonalMessage,
    SignTransaction,
    SignTypedData,
    SignMessage,
}

impl RequestType {
    pub const ALL: [RequestType; 6] = [
        Self::Pairing,
        Self::ImportAccount,
        Self::SignPersonalMessage,
        Self::SignTransaction,
        Self::SignTypedData,
        Self::SignMessage,
    ];

    /// Wire name of the request type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pairing => "pairing",
            Self::ImportAccount => "importAccount",
            Self::SignPersonalMessage => "signPersonalMessage",
            Self::SignTransaction => "signTransaction",
            Self::SignTypedData => "signTypedData",
            Self::SignMessage => "signMessage",
        }
    }

    /// Parse a wire name; unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Schema the decrypted payload of this type must satisfy.
    pub fn schema(&self) -> &'static Schema {
        match self {
            Self::Pairing => &PAIRING_SCHEMA,
            Self::ImportAccount => &IMPORT_ACCOUNT_SCHEMA,
            Self::SignPersonalMessage => &SIGN_PERSONAL_MESSAGE_SCHEMA,
            Self::SignTransaction => &SIGN_TRANSACTION_SCHEMA,
            Self::SignTypedData => &SIGN_TYPED_DATA_SCHEMA,
            Self::SignMessage => &SIGN_MESSAGE_SCHEMA,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a request. Moves only forward: `pending` to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Error,
}

impl RequestStatus {
    /// Convert status to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }

    /// Parse a status from its string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether an update may move a request from `self` to `next`.
    ///
    /// Rewriting the same status is allowed (an update may only touch other
    /// fields); leaving a terminal status is not.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        *self == next || *self == Self::Pending
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed request payload bound to exactly one [`RequestType`].
pub trait RequestPayload: Serialize + DeserializeOwned + Send + Sync {
    const REQUEST_TYPE: RequestType;

    fn status(&self) -> RequestStatus;

    fn schema() -> &'static Schema {
        Self::REQUEST_TYPE.schema()
    }
}

/// Pairing confirmation from the key-holding device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request to import or create an account on the key-holding device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAccountRequest {
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `personal_sign` request: a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPersonalMessageRequest {
    pub status: RequestStatus,
    pub from: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Transaction signing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionRequest {
    pub status: RequestStatus,
    pub from: String,
    pub transaction: TransactionRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// EIP-712 typed data signing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTypedDataRequest {
    pub status: RequestStatus,
    pub from: String,
    pub typed_data: TypedData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw message signing request; `message` is hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageRequest {
    pub status: RequestStatus,
    pub from: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

macro_rules! impl_request_payload {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl RequestPayload for $ty {
                const REQUEST_TYPE: RequestType = RequestType::$variant;

                fn status(&self) -> RequestStatus {
                    self.status
                }
            }
        )*
    };
}

impl_request_payload! {
    PairingRequest => Pairing,
    ImportAccountRequest => ImportAccount,
    SignPersonalMessageRequest => SignPersonalMessage,
    SignTransactionRequest => SignTransaction,
    SignTypedDataRequest => SignTypedData,
    SignMessageRequest => SignMessage,
}

impl SignPersonalMessageRequest {
    pub fn new(from: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Pending,
            from: from.into(),
            message: message.into(),
            signature: None,
            error: None,
            extra: Map::new(),
        }
    }
}

impl SignMessageRequest {
    pub fn new(from: impl Into<String>, message_hex: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Pending,
            from: from.into(),
            message: message_hex.into(),
            signature: None,
            error: None,
            extra: Map::new(),
        }
    }
}

impl SignTransactionRequest {
    pub fn new(from: impl Into<String>, transaction: TransactionRequest) -> Self {
        Self {
            status: RequestStatus::Pending,
            from: from.into(),
            transaction,
            signature: None,
            error: None,
            extra: Map::new(),
        }
    }
}

impl SignTypedDataRequest {
    pub fn new(from: impl Into<String>, typed_data: TypedData) -> Self {
        Self {
            status: RequestStatus::Pending,
            from: from.into(),
            typed_data,
            signature: None,
            error: None,
            extra: Map::new(),
        }
    }
}

impl PairingRequest {
    pub fn pending() -> Self {
        Self {
            status: RequestStatus::Pending,
            device_name: None,
            error: None,
            extra: Map::new(),
        }
    }
}

impl ImportAccountRequest {
    pub fn pending() -> Self {
        Self {
            status: RequestStatus::Pending,
            address: None,
            name: None,
            error: None,
            extra: Map::new(),
        }
    }
}

/// Integer or `0x` hex quantity, as wallets emit both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(u64),
    Hex(String),
}

/// Unsigned transaction fields as handed over by the wallet host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// `None` for contract creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<Quantity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// EIP-712 typed data. `domain` and `message` stay arbitrary JSON maps; the
/// outer shape is enforced by the `signTypedData` schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub types: BTreeMap<String, Vec<TypedDataField>>,
    pub primary_type: String,
    pub domain: Map<String, Value>,
    pub message: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Payload of any request type, for listings that mix types.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyPayload {
    Pairing(PairingRequest),
    ImportAccount(ImportAccountRequest),
    SignPersonalMessage(SignPersonalMessageRequest),
    SignTransaction(SignTransactionRequest),
    SignTypedData(SignTypedDataRequest),
    SignMessage(SignMessageRequest),
}

impl AnyPayload {
    /// Deserialize a schema-checked value as the given request type.
    pub fn from_value(request_type: RequestType, value: Value) -> serde_json::Result<Self> {
        Ok(match request_type {
            RequestType::Pairing => Self::Pairing(serde_json::from_value(value)?),
            RequestType::ImportAccount => Self::ImportAccount(serde_json::from_value(value)?),
            RequestType::SignPersonalMessage => {
                Self::SignPersonalMessage(serde_json::from_value(value)?)
            }
            RequestType::SignTransaction => Self::SignTransaction(serde_json::from_value(value)?),
            RequestType::SignTypedData => Self::SignTypedData(serde_json::from_value(value)?),
            RequestType::SignMessage => Self::SignMessage(serde_json::from_value(value)?),
        })
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Self::Pairing(_) => RequestType::Pairing,
            Self::ImportAccount(_) => RequestType::ImportAccount,
            Self::SignPersonalMessage(_) => RequestType::SignPersonalMessage,
            Self::SignTransaction(_) => RequestType::SignTransaction,
            Self::SignTypedData(_) => RequestType::SignTypedData,
            Self::SignMessage(_) => RequestType::SignMessage,
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Pairing(p) => p.status,
            Self::ImportAccount(p) => p.status,
            Self::SignPersonalMessage(p) => p.status,
            Self::SignTransaction(p) => p.status,
            Self::SignTypedData(p) => p.status,
            Self::SignMessage(p) => p.status,
        }
    }
}

/// Cleartext envelope stored at `requests/{roomId}/{requestId}`.
///
/// Only the type tag and timestamp are visible to the relay; `data` is the
/// channel ciphertext of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub data: String,
    /// Unix milliseconds of the last write.
    pub last_updated: i64,
}

/// Cleartext envelope stored at `registrations/{roomId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRegistration {
    pub data: String,
    pub last_updated: i64,
}

/// Decrypted view of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<T> {
    pub id: String,
    pub request_type: RequestType,
    pub payload: T,
    pub last_updated: i64,
}

/// Push registration of the key-holding device, one per room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    pub push_token: String,
    pub device_name: String,
}
