//! JSON-over-HTTP exchange shared by the store clients.

use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use serde_json::Value;

use crate::store::error::{StoreError, StoreResult};

/// Longest upstream body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Send `request` and decode the JSON response body.
///
/// Failures before a complete response arrives are transport errors;
/// non-2xx statuses are upstream errors carrying the store's message. An
/// empty 2xx body decodes to `Value::Null`.
pub async fn send_json(resource: &str, request: RequestBuilder) -> StoreResult<Value> {
    let response = request
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| StoreError::transport(resource, e))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| StoreError::transport(resource, e))?;

    if !status.is_success() {
        let (code, message) = extract_error(&body);
        tracing::debug!(resource, status = status.as_u16(), "Store returned error status");
        return Err(StoreError::upstream(resource, status.as_u16(), code, message));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&body).map_err(|e| StoreError::decode(resource, e.to_string()))
}

/// Pull a code and message out of an error body from either store.
fn extract_error(body: &[u8]) -> (Option<String>, String) {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        // Graph: {"errors": [{"code": ..., "message": ...}]}
        if let Some(first) = value.get("errors").and_then(Value::as_array).and_then(|e| e.first()) {
            let code = first.get("code").and_then(Value::as_str).map(str::to_string);
            let message = first.get("message").and_then(Value::as_str).unwrap_or_default();
            return (code, message.to_string());
        }
        // Vector: {"status": {"error": ...}}
        if let Some(message) = value.pointer("/status/error").and_then(Value::as_str) {
            return (None, message.to_string());
        }
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return (None, message.to_string());
        }
    }

    let text = String::from_utf8_lossy(body);
    let excerpt: String = text.trim().chars().take(MAX_ERROR_BODY).collect();
    (None, excerpt)
}
