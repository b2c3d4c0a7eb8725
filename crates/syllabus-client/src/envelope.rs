//! Response envelope normalization.
//!
//! The course backend is not consistent about how it wraps results. The
//! following shapes are all accepted:
//!
//! - `{"success": true, "data": ...}` / `{"success": false, "message": ...}`
//! - `{"message": ..., "status_code": 200, "data": ...}`
//! - `{"error": "..."}` or `{"error": {"message": ...}}`
//! - `{"code": "NOT_FOUND", "message": ...}`
//! - a bare JSON value
//!
//! A failure may be signalled by the HTTP status, by the body, or both.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FailureKind, RemoteFailure};

/// Keys whose presence marks an object as an envelope rather than a bare value.
const ENVELOPE_KEYS: [&str; 4] = ["success", "status_code", "message", "timestamp"];

/// Longest non-JSON body quoted in a failure message.
const MAX_QUOTED_BODY: usize = 200;

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn error_message(object: &Map<String, Value>) -> Option<String> {
    let from_error = match object.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    let message = from_error.or_else(|| {
        object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
    })?;
    match object.get("code").and_then(Value::as_str) {
        Some(code) => Some(format!("{code}: {message}")),
        None => Some(message),
    }
}

/// A failure signalled inside a 2xx response body.
fn body_failure(status: u16, object: &Map<String, Value>) -> Option<RemoteFailure> {
    let message = || error_message(object).unwrap_or_else(|| "request failed".to_string());
    let flagged = object.get("success").and_then(Value::as_bool) == Some(false)
        || object.get("error").is_some_and(|e| !e.is_null());
    if flagged {
        return Some(RemoteFailure {
            kind: FailureKind::Rejected,
            message: message(),
            status: Some(status),
        });
    }
    object
        .get("status_code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| !is_success(*code))
        .map(|code| RemoteFailure::from_status(code, message()))
}

fn quote(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response".to_string();
    }
    body.chars().take(MAX_QUOTED_BODY).collect()
}

/// Extracts the payload of a response or the failure it carries.
pub fn unwrap_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, RemoteFailure> {
    let value = if body.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => value,
            Err(e) if is_success(status) => {
                return Err(RemoteFailure {
                    status: Some(status),
                    ..RemoteFailure::decode(format!("response is not JSON: {e}"))
                });
            }
            Err(_) => return Err(RemoteFailure::from_status(status, quote(body))),
        }
    };

    let data = match value {
        Value::Object(object) => {
            if !is_success(status) {
                let message = error_message(&object)
                    .unwrap_or_else(|| format!("request failed with status {status}"));
                return Err(RemoteFailure::from_status(status, message));
            }
            if let Some(failure) = body_failure(status, &object) {
                return Err(failure);
            }
            let wrapped = object.contains_key("data")
                && ENVELOPE_KEYS.iter().any(|key| object.contains_key(*key));
            if wrapped {
                object.get("data").cloned().unwrap_or(Value::Null)
            } else {
                Value::Object(object)
            }
        }
        other if is_success(status) => other,
        other => {
            return Err(RemoteFailure::from_status(
                status,
                format!("request failed with status {status}: {other}"),
            ))
        }
    };

    serde_json::from_value(data).map_err(|e| RemoteFailure {
        status: Some(status),
        ..RemoteFailure::decode(format!("unexpected response shape: {e}"))
    })
}

/// A remote result in the `{success, data}` / `{success, message}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// The payload of a successful call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// The failure message of an unsuccessful call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> From<Result<T, RemoteFailure>> for NormalizedResponse<T> {
    fn from(result: Result<T, RemoteFailure>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                message: None,
            },
            Err(failure) => Self {
                success: false,
                data: None,
                message: Some(failure.message),
            },
        }
    }
}
