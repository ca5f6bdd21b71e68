//! Request body validation.

use axum::{
    body::{Body, to_bytes},
    http::{HeaderMap, header},
};
use serde_json::{Map, Value};

use super::GatewayError;

/// Parse a bounded JSON object body.
///
/// The content type must mention `application/json`; a declared or actual
/// length above `max_bytes` is rejected before parsing.
///
/// # Errors
///
/// Returns the matching [`GatewayError`] for a wrong content type, an
/// oversized body, malformed JSON, or a non-object document.
pub async fn read_json_object(
    headers: &HeaderMap,
    body: Body,
    max_bytes: usize,
) -> Result<Map<String, Value>, GatewayError> {
    if !is_json(headers) {
        return Err(GatewayError::UnsupportedMediaType);
    }
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    if declared.is_some_and(|length| length > u64::try_from(max_bytes).unwrap_or(u64::MAX)) {
        return Err(GatewayError::PayloadTooLarge);
    }
    let bytes = to_bytes(body, max_bytes)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge)?;
    let document: Value =
        serde_json::from_slice(&bytes).map_err(|_| GatewayError::MalformedJson)?;
    match document {
        Value::Object(fields) => Ok(fields),
        _ => Err(GatewayError::InvalidField(
            "Request body must be a JSON object".to_owned(),
        )),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"))
}

/// Read a required string field.
///
/// Length bounds apply to the trimmed value; the original value is returned.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidField`] for a missing, non-string or short
/// value and [`GatewayError::FieldTooLong`] for an overlong one.
pub fn require_string_field(
    fields: &Map<String, Value>,
    name: &str,
    min_chars: usize,
    max_chars: usize,
) -> Result<String, GatewayError> {
    let Some(Value::String(value)) = fields.get(name) else {
        return Err(GatewayError::InvalidField(format!(
            "Field '{name}' must be a string"
        )));
    };
    let length = value.trim().chars().count();
    if length < min_chars {
        return Err(GatewayError::InvalidField(format!(
            "Field '{name}' must be at least {min_chars} character(s)"
        )));
    }
    if length > max_chars {
        return Err(GatewayError::FieldTooLong(format!(
            "Field '{name}' exceeds max length {max_chars}"
        )));
    }
    Ok(value.clone())
}
