//! Normalized client errors.
//!
//! Every terminal failure of [`ResilientHttpClient`](crate::ResilientHttpClient)
//! resolves to a single [`ClientError`] shape so callers never branch on
//! transport-specific error types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Category of a terminal client failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No connectivity, or the connection failed after every retry.
    NetworkUnavailable,
    /// 401 persisted after one refresh-and-retry; re-authentication required.
    SessionExpired,
    /// 403, never retried.
    PermissionDenied,
    /// 404, never retried.
    NotFound,
    /// 5xx or timeout after the retry budget was spent.
    ServerError,
    /// 400/409/422 business-rule or payload rejection.
    ValidationError,
    /// Anything else, including undecodable success bodies.
    Unknown,
}

impl ErrorKind {
    /// Fallback message when the server body carries none.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::NetworkUnavailable => "No internet connection. Please check your network.",
            ErrorKind::SessionExpired => "Session expired. Please login again.",
            ErrorKind::PermissionDenied => "You do not have permission to perform this action.",
            ErrorKind::NotFound => "Resource not found.",
            ErrorKind::ServerError => "Server error. Please try again later.",
            ErrorKind::ValidationError => "The request was rejected.",
            ErrorKind::Unknown => "An error occurred",
        }
    }

    /// Whether the caller may reasonably retry the same operation later.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::NetworkUnavailable | ErrorKind::ServerError)
    }
}

/// Uniform terminal failure: `{message, kind, status_code?, cause}`.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct ClientError {
    pub message: String,
    pub kind: ErrorKind,
    pub status_code: Option<u16>,
    /// Lower-level cause, rendered as text.
    pub cause: Option<String>,
    /// JSON error payload returned by the server, if any.
    pub body: Option<Value>,
}

impl ClientError {
    /// Error with the kind's default message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            message: kind.default_message().to_string(),
            kind,
            status_code: None,
            cause: None,
            body: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Attach the server's JSON body and prefer its `error`/`message` text.
    pub fn with_body(mut self, body: Value) -> Self {
        if let Some(message) = server_message(&body) {
            self.message = message;
        }
        self.body = Some(body);
        self
    }

    pub fn network_unavailable() -> Self {
        Self::new(ErrorKind::NetworkUnavailable)
    }

    pub fn session_expired() -> Self {
        Self::new(ErrorKind::SessionExpired).with_status(401)
    }

    /// Read a field from the server error body.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.get(key))
    }
}

/// Extract a human message from a server error body (`error` wins over `message`).
pub fn server_message(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .filter_map(|key| body.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

pub type ClientResult<T> = Result<T, ClientError>;
