//! Response decoding and status mapping

use http::header::RETRY_AFTER;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::HttpResponse;

/// Decode a buffered response into `T`, or into the matching [`Error`].
///
/// Non-2xx statuses map to a typed error carrying the server's `error`
/// message. A 2xx body with `"success": false` is reported as
/// [`Error::Api`] as well.
pub fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
    let HttpResponse {
        status,
        headers,
        body,
    } = response;

    let json: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    if !status.is_success() {
        let message = error_message(status, json.as_ref(), &body);
        return Err(status_error(status, &headers, message, json));
    }

    let json = json.ok_or_else(|| {
        Error::Decode(format!(
            "expected a JSON body with status {}, got {} bytes",
            status.as_u16(),
            body.len()
        ))
    })?;

    if json.get("success") == Some(&Value::Bool(false)) {
        return Err(Error::Api {
            status: status.as_u16(),
            message: error_message(status, Some(&json), &body),
            body: Some(json),
        });
    }

    serde_json::from_value(json).map_err(|e| Error::Decode(e.to_string()))
}

/// Map a non-2xx status to the error taxonomy
fn status_error(
    status: StatusCode,
    headers: &HeaderMap,
    message: String,
    body: Option<Value>,
) -> Error {
    match status {
        StatusCode::CONFLICT => Error::VersionConflict { message },
        StatusCode::NOT_FOUND => Error::NotFound { message },
        StatusCode::PAYLOAD_TOO_LARGE => Error::PayloadTooLarge { message },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            message,
            retry_after: retry_after(headers),
        },
        code => Error::Api {
            status: code.as_u16(),
            message,
            body,
        },
    }
}

/// `error` field of the JSON body, else the raw text, else `HTTP <status>`
fn error_message(status: StatusCode, json: Option<&Value>, raw: &[u8]) -> String {
    if let Some(message) = json.and_then(|j| j.get("error")).and_then(Value::as_str) {
        return message.to_string();
    }
    if json.is_none() {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
    }
    format!("HTTP {}", status.as_u16())
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
