//! Error types for the REST client.
//!
//! # Design
//! HTTP failures form a closed set of variants chosen by status code alone
//! (`ApiError::from_response`). Each carries the status and the error string
//! the server put in `meta.error`, so the rendered message is always
//! `"<status> <error>"` or `"<status> Internal error: <error>"`. Transport and
//! encoding failures sit beside them and are never produced by the mapper.

use serde_json::Value;

/// Placeholder used when the envelope carries no `meta.error`.
pub const UNKNOWN_ERROR: &str = "Unknown";

/// Errors returned by `RestClient` operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("{status} {message}")]
    NotFound { status: u16, message: String },

    /// The server returned 401 or 403.
    #[error("{status} {message}")]
    PermissionDenied { status: u16, message: String },

    /// The server returned 400. `extra` is the full decoded error body, which
    /// usually names the offending fields.
    #[error("{status} {message}")]
    InvalidRequest {
        status: u16,
        message: String,
        extra: Value,
    },

    /// Any other failing status.
    #[error("{status} Internal error: {message}")]
    Server { status: u16, message: String },

    /// A `Location` header the client cannot follow.
    #[error("unsupported redirect target: {0}")]
    UnsupportedRedirect(String),

    /// The client configuration cannot produce a working transport.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A payload could not be converted to or from JSON.
    #[error("JSON conversion failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection, DNS, TLS or timeout failure from the HTTP stack.
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),
}

impl ApiError {
    /// Map a failing status and its decoded body to a typed failure.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let message = error_message(body);
        match status {
            404 => ApiError::NotFound { status, message },
            401 | 403 => ApiError::PermissionDenied { status, message },
            400 => ApiError::InvalidRequest {
                status,
                message,
                extra: body.clone(),
            },
            _ => ApiError::Server { status, message },
        }
    }

    /// HTTP status for failures produced by the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { status, .. }
            | ApiError::PermissionDenied { status, .. }
            | ApiError::InvalidRequest { status, .. }
            | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Decoded error body attached to an `InvalidRequest`.
    pub fn extra(&self) -> Option<&Value> {
        match self {
            ApiError::InvalidRequest { extra, .. } => Some(extra),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Extract `meta.error`, rendering non-string values as JSON.
fn error_message(body: &Value) -> String {
    match body.get("meta").and_then(|meta| meta.get("error")) {
        None | Some(Value::Null) => UNKNOWN_ERROR.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
