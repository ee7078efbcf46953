//! Key-value document handlers: `GET|PUT|DELETE /{path}.json`.

use crate::error::RelayError;
use crate::rate_limit::room_key;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use keyrelay_core::relay::validate_room_path;
use serde_json::Value;

/// Strip the `.json` suffix, check the path stays inside one room and charge
/// that room's bucket.
fn document_path<'a>(state: &AppState, raw: &'a str) -> Result<&'a str, RelayError> {
    let path = raw
        .strip_suffix(".json")
        .ok_or_else(|| RelayError::BadRequest(format!("Expected a .json path, got {}", raw)))?;
    validate_room_path(path).map_err(|_| RelayError::InvalidPath(path.to_string()))?;

    if !state.limiter.check(&room_key(path)) {
        tracing::warn!("Rate limited {}", room_key(path));
        return Err(RelayError::RateLimited);
    }
    Ok(path)
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, RelayError> {
    let path = document_path(&state, &raw)?;
    let value = state.storage.get_document(path)?;
    tracing::debug!("GET {} -> {}", path, if value.is_some() { "hit" } else { "miss" });
    Ok(Json(value.unwrap_or(Value::Null)))
}

pub async fn put_document(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let path = document_path(&state, &raw)?;
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| RelayError::BadRequest(format!("Body is not valid JSON: {}", e)))?;

    state
        .storage
        .put_document(path, &value, Utc::now().timestamp())?;
    tracing::debug!("PUT {} ({} bytes)", path, body.len());
    Ok(Json(value))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, RelayError> {
    let path = document_path(&state, &raw)?;
    let removed = state.storage.delete_document(path)?;
    tracing::debug!("DELETE {} removed {} document(s)", path, removed);
    Ok(Json(Value::Null))
}
