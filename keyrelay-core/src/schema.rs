//! Declarative payload schemas.
//!
//! Anything read back from the relay is untrusted: the room id is public, so
//! any party can write records there. Each payload shape is described by a
//! static [`Schema`], and validation walks the whole value collecting every
//! violation instead of stopping at the first one. Unknown fields are allowed
//! and preserved; requests may carry extra data merged in by an update.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::models::{RequestStatus, RequestType};

/// One violated field, addressed by a dotted path (`typedData.types.Mail[0].name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// A decrypted payload that does not match its schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{schema} payload failed validation: {}", join_violations(.violations))]
pub struct ValidationError {
    pub schema: &'static str,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(schema: &'static str, violations: Vec<FieldViolation>) -> Self {
        Self { schema, violations }
    }

    /// Paths of all violated fields, in the order they were found.
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The shape a single field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    NonEmptyString,
    /// `0x` followed by 40 hex digits.
    Address,
    /// `0x` followed by an even number of hex digits.
    Hex,
    Status,
    RequestType,
    /// Non-negative integer (unix milliseconds).
    Timestamp,
    Transaction,
    TypedData,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// A named set of field specs for one JSON object shape.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub const fn new(name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self { name, fields }
    }

    /// Validate a value, reporting every violation.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let violations = self.check(value);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.name, violations))
        }
    }

    /// Collect all violations without failing.
    pub fn check(&self, value: &Value) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        let Some(object) = value.as_object() else {
            violations.push(FieldViolation::new(
                "$",
                format!("expected an object, got {}", kind_name(value)),
            ));
            return violations;
        };

        for spec in self.fields {
            match object.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    violations.push(FieldViolation::new(spec.name, "is required"));
                }
                None | Some(Value::Null) => {}
                Some(field) => check_field(spec.name, spec.kind, field, &mut violations),
            }
        }
        violations
    }
}

fn check_field(path: &str, kind: FieldKind, value: &Value, out: &mut Vec<FieldViolation>) {
    match kind {
        FieldKind::String => {
            if !value.is_string() {
                out.push(FieldViolation::new(path, "expected a string"));
            }
        }
        FieldKind::NonEmptyString => {
            if !value.as_str().is_some_and(|s| !s.trim().is_empty()) {
                out.push(FieldViolation::new(path, "expected a non-empty string"));
            }
        }
        FieldKind::Address => {
            if !value.as_str().is_some_and(is_address) {
                out.push(FieldViolation::new(
                    path,
                    "expected a 0x-prefixed 20-byte hex address",
                ));
            }
        }
        FieldKind::Hex => {
            if !value.as_str().is_some_and(is_hex_data) {
                out.push(FieldViolation::new(
                    path,
                    "expected 0x-prefixed hex with an even number of digits",
                ));
            }
        }
        FieldKind::Status => {
            if !value.as_str().is_some_and(|s| RequestStatus::parse(s).is_some()) {
                out.push(FieldViolation::new(
                    path,
                    "expected one of pending, approved, rejected, error",
                ));
            }
        }
        FieldKind::RequestType => match value.as_str() {
            Some(s) if RequestType::parse(s).is_some() => {}
            Some(s) => out.push(FieldViolation::new(
                path,
                format!("unknown request type {:?}", s),
            )),
            None => out.push(FieldViolation::new(path, "expected a request type string")),
        },
        FieldKind::Timestamp => {
            if value.as_u64().is_none() {
                out.push(FieldViolation::new(
                    path,
                    "expected a non-negative integer timestamp",
                ));
            }
        }
        FieldKind::Transaction => check_transaction(path, value, out),
        FieldKind::TypedData => check_typed_data(path, value, out),
    }
}

const TRANSACTION_QUANTITIES: &[&str] = &[
    "value",
    "gas",
    "gasLimit",
    "gasPrice",
    "maxFeePerGas",
    "maxPriorityFeePerGas",
    "nonce",
    "chainId",
];

fn check_transaction(path: &str, value: &Value, out: &mut Vec<FieldViolation>) {
    let Some(tx) = value.as_object() else {
        out.push(FieldViolation::new(path, "expected a transaction object"));
        return;
    };

    for (key, kind) in [("to", FieldKind::Address), ("from", FieldKind::Address)] {
        if let Some(field) = non_null(tx, key) {
            check_field(&format!("{}.{}", path, key), kind, field, out);
        }
    }
    if let Some(data) = non_null(tx, "data") {
        check_field(&format!("{}.data", path), FieldKind::Hex, data, out);
    }
    for key in TRANSACTION_QUANTITIES {
        if let Some(quantity) = non_null(tx, key) {
            if !is_quantity(quantity) {
                out.push(FieldViolation::new(
                    format!("{}.{}", path, key),
                    "expected a non-negative integer or 0x-prefixed hex quantity",
                ));
            }
        }
    }
}

fn check_typed_data(path: &str, value: &Value, out: &mut Vec<FieldViolation>) {
    let Some(typed) = value.as_object() else {
        out.push(FieldViolation::new(path, "expected a typed data object"));
        return;
    };

    let types = typed.get("types").and_then(Value::as_object);
    match typed.get("types") {
        None | Some(Value::Null) => out.push(FieldViolation::new(
            format!("{}.types", path),
            "is required",
        )),
        Some(_) if types.is_none() => out.push(FieldViolation::new(
            format!("{}.types", path),
            "expected an object of type definitions",
        )),
        Some(_) => {}
    }

    if let Some(types) = types {
        for (type_name, members) in types {
            let type_path = format!("{}.types.{}", path, type_name);
            let Some(members) = members.as_array() else {
                out.push(FieldViolation::new(type_path, "expected an array of members"));
                continue;
            };
            for (i, member) in members.iter().enumerate() {
                let member_path = format!("{}[{}]", type_path, i);
                let Some(member) = member.as_object() else {
                    out.push(FieldViolation::new(member_path, "expected {name, type}"));
                    continue;
                };
                for key in ["name", "type"] {
                    if !member.get(key).is_some_and(|v| v.as_str().is_some_and(|s| !s.is_empty()))
                    {
                        out.push(FieldViolation::new(
                            format!("{}.{}", member_path, key),
                            "expected a non-empty string",
                        ));
                    }
                }
            }
        }
    }

    match typed.get("primaryType").map(Value::as_str) {
        Some(Some(primary)) => {
            if let Some(types) = types {
                if !types.contains_key(primary) {
                    out.push(FieldViolation::new(
                        format!("{}.primaryType", path),
                        format!("{:?} is not defined in types", primary),
                    ));
                }
            }
        }
        Some(None) => out.push(FieldViolation::new(
            format!("{}.primaryType", path),
            "expected a string",
        )),
        None => out.push(FieldViolation::new(
            format!("{}.primaryType", path),
            "is required",
        )),
    }

    for key in ["domain", "message"] {
        match typed.get(key) {
            Some(Value::Object(_)) => {}
            None => out.push(FieldViolation::new(
                format!("{}.{}", path, key),
                "is required",
            )),
            Some(_) => out.push(FieldViolation::new(
                format!("{}.{}", path, key),
                "expected an object",
            )),
        }
    }
}

fn non_null<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `0x` followed by exactly 40 hex digits (either case).
pub fn is_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|digits| digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()))
}

/// `0x` followed by an even number of hex digits; `0x` alone is empty data.
pub fn is_hex_data(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|digits| digits.len() % 2 == 0 && digits.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_quantity(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_u64(),
        Value::String(s) => s
            .strip_prefix("0x")
            .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())),
        _ => false,
    }
}

use FieldKind::{
    Address, Hex, NonEmptyString, RequestType as Kind, Status, String as Text, Timestamp,
    Transaction, TypedData,
};

pub static PAIRING_SCHEMA: Schema = Schema::new(
    "pairing",
    &[
        FieldSpec::required("status", Status),
        FieldSpec::optional("deviceName", Text),
        FieldSpec::optional("error", Text),
    ],
);

pub static IMPORT_ACCOUNT_SCHEMA: Schema = Schema::new(
    "importAccount",
    &[
        FieldSpec::required("status", Status),
        FieldSpec::optional("address", Address),
        FieldSpec::optional("name", Text),
        FieldSpec::optional("error", Text),
    ],
);

pub static SIGN_PERSONAL_MESSAGE_SCHEMA: Schema = Schema::new(
    "signPersonalMessage",
    &[
        FieldSpec::required("status", Status),
        FieldSpec::required("from", Address),
        FieldSpec::required("message", Text),
        FieldSpec::optional("signature", Hex),
        FieldSpec::optional("error", Text),
    ],
);

pub static SIGN_TRANSACTION_SCHEMA: Schema = Schema::new(
    "signTransaction",
    &[
        FieldSpec::required("status", Status),
        FieldSpec::required("from", Address),
        FieldSpec::required("transaction", Transaction),
        FieldSpec::optional("signature", Hex),
        FieldSpec::optional("error", Text),
    ],
);

pub static SIGN_TYPED_DATA_SCHEMA: Schema = Schema::new(
    "signTypedData",
    &[
        FieldSpec::required("status", Status),
        FieldSpec::required("from", Address),
        FieldSpec::required("typedData", TypedData),
        FieldSpec::optional("signature", Hex),
        FieldSpec::optional("error", Text),
    ],
);

pub static SIGN_MESSAGE_SCHEMA: Schema = Schema::new(
    "signMessage",
    &[
        FieldSpec::required("status", Status),
        FieldSpec::required("from", Address),
        FieldSpec::required("message", Hex),
        FieldSpec::optional("signature", Hex),
        FieldSpec::optional("error", Text),
    ],
);

/// Cleartext envelope stored at `requests/{roomId}/{requestId}`.
pub static ENVELOPE_SCHEMA: Schema = Schema::new(
    "envelope",
    &[
        FieldSpec::required("type", Kind),
        FieldSpec::required("data", NonEmptyString),
        FieldSpec::required("lastUpdated", Timestamp),
    ],
);

/// Cleartext envelope stored at `registrations/{roomId}`.
pub static REGISTRATION_ENVELOPE_SCHEMA: Schema = Schema::new(
    "registrationEnvelope",
    &[
        FieldSpec::required("data", NonEmptyString),
        FieldSpec::required("lastUpdated", Timestamp),
    ],
);

/// Decrypted device registration.
pub static DEVICE_REGISTRATION_SCHEMA: Schema = Schema::new(
    "deviceRegistration",
    &[
        FieldSpec::required("pushToken", NonEmptyString),
        FieldSpec::required("deviceName", Text),
    ],
);
