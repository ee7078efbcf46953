//! JSON views of requests and registrations for stdout.

use chrono::{TimeZone, Utc};
use keyrelay_core::{AnyPayload, DeviceRegistration, Request};
use serde_json::{json, Value};

pub fn payload_json(payload: &AnyPayload) -> serde_json::Result<Value> {
    match payload {
        AnyPayload::Pairing(p) => serde_json::to_value(p),
        AnyPayload::ImportAccount(p) => serde_json::to_value(p),
        AnyPayload::SignPersonalMessage(p) => serde_json::to_value(p),
        AnyPayload::SignTransaction(p) => serde_json::to_value(p),
        AnyPayload::SignTypedData(p) => serde_json::to_value(p),
        AnyPayload::SignMessage(p) => serde_json::to_value(p),
    }
}

pub fn request_json(request: &Request<AnyPayload>) -> serde_json::Result<Value> {
    Ok(json!({
        "id": request.id,
        "type": request.request_type,
        "status": request.payload.status(),
        "lastUpdated": request.last_updated,
        "payload": payload_json(&request.payload)?,
    }))
}

/// One line per request for `request list`.
pub fn request_line(request: &Request<AnyPayload>) -> String {
    format!(
        "{:<24} {:<20} {:<9} {}",
        request.id,
        request.request_type.as_str(),
        request.payload.status().as_str(),
        format_millis(request.last_updated),
    )
}

pub fn device_json(registration: &DeviceRegistration) -> serde_json::Result<Value> {
    serde_json::to_value(registration)
}

pub fn format_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(at) => at.to_rfc3339(),
        None => millis.to_string(),
    }
}
