//! Key record handlers.

use crate::error::EscrowError;
use crate::server::AppState;
use crate::storage::models::{KeyRecord, KeyState, NewKeyRecord};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

/// A device submission read leniently from an untyped body: scalar values
/// become strings, anything else counts as absent.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CreateKeyRequest {
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub os_info: Option<String>,
    pub username: Option<String>,
    pub encryption_key: Option<String>,
    pub state: Option<String>,
}

impl CreateKeyRequest {
    pub fn from_json(body: &Value) -> Self {
        Self {
            hostname: text_field(body, "hostname"),
            ip_address: text_field(body, "ip_address"),
            mac_address: text_field(body, "mac_address"),
            os_info: text_field(body, "os_info"),
            username: text_field(body, "username"),
            encryption_key: text_field(body, "encryption_key"),
            state: text_field(body, "state"),
        }
    }
}

fn text_field(body: &Value, field: &str) -> Option<String> {
    match body.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub async fn list_keys(State(state): State<AppState>) -> Result<Json<Vec<KeyRecord>>, EscrowError> {
    let keys = state.storage.list_all()?;
    Ok(Json(keys))
}

pub async fn list_keys_by_owner(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<KeyRecord>>, EscrowError> {
    let keys = state.storage.list_by_owner(&username)?;
    Ok(Json(keys))
}

pub async fn update_key_state(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<KeyRecord>, EscrowError> {
    // Any unreadable body reads as an invalid state.
    let Json(body) = body.map_err(|e| match json_rejection(e) {
        EscrowError::PayloadTooLarge => EscrowError::PayloadTooLarge,
        _ => EscrowError::invalid_state(),
    })?;
    let new_state: KeyState = body
        .get("state")
        .and_then(|v| v.as_str())
        .ok_or_else(EscrowError::invalid_state)?
        .parse()?;

    let updated = state.storage.update_state(&key_id, new_state)?;
    tracing::info!(key_id = %updated.id, state = %updated.state, "Key state updated");
    Ok(Json(updated))
}

pub async fn create_key(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<KeyRecord>), EscrowError> {
    // A body sent without a JSON content type is not read at all.
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => Value::Null,
        Err(e) => return Err(json_rejection(e)),
    };
    let req = CreateKeyRequest::from_json(&body);
    let requested_state = resolve_create_state(req.state.as_deref(), state.strict_create_state)?;

    let record = state.storage.create(NewKeyRecord {
        hostname: req.hostname,
        ip_address: req.ip_address,
        mac_address: req.mac_address,
        os_info: req.os_info,
        username: req.username,
        encryption_key: req.encryption_key,
        state: requested_state,
    })?;

    tracing::info!(
        key_id = %record.id,
        hostname = record.hostname.as_deref().unwrap_or("-"),
        state = %record.state,
        "Key record created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<Value>, EscrowError> {
    state.storage.delete_by_id(&key_id)?;
    tracing::info!(%key_id, "Key record deleted");
    Ok(Json(
        serde_json::json!({"message": "Key deleted successfully"}),
    ))
}

fn json_rejection(e: JsonRejection) -> EscrowError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        EscrowError::PayloadTooLarge
    } else {
        EscrowError::BadRequest("Malformed JSON body".to_string())
    }
}

/// Map the optional wire `state` of a submission onto the enum. Absent or
/// empty means the store default. An unknown value falls back to the default
/// unless `strict` is set.
fn resolve_create_state(raw: Option<&str>, strict: bool) -> Result<Option<KeyState>, EscrowError> {
    match raw {
        None | Some("") => Ok(None),
        Some(value) => match value.parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) if strict => Err(e),
            Err(_) => {
                tracing::warn!(requested = value, "Unknown state on submission, using default");
                Ok(None)
            }
        },
    }
}
