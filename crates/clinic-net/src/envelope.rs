//! Immutable request envelopes.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// HTTP method subset used by the clinic API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// Description of one logical request.
///
/// The envelope is never mutated while a request is in flight. Retries reuse
/// the same envelope and pass the attempt number alongside it, so every
/// attempt shares one `request_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub method: Method,
    /// Path relative to the API base URL, with leading slash.
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Stable idempotency key shared by all attempts.
    pub request_id: Uuid,
    /// Per-attempt deadline override.
    pub timeout: Option<Duration>,
}

impl RequestEnvelope {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            request_id: Uuid::new_v4(),
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach a JSON body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach an already-built JSON value.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the concrete request for one attempt.
    pub(crate) fn prepare(
        &self,
        base_url: &str,
        attempt: u32,
        bearer: Option<&str>,
    ) -> PreparedRequest {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("X-Request-Id".to_string(), self.request_id.to_string()),
            ("X-Retry-Count".to_string(), attempt.to_string()),
        ];
        headers.extend(self.headers.iter().cloned());
        if let Some(token) = bearer {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        PreparedRequest {
            method: self.method,
            url: join_url(base_url, &self.path),
            headers,
            body: self.body.clone(),
            attempt,
        }
    }
}

/// A fully-resolved request handed to a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// 0 for the original attempt, 1..=N for retries.
    pub attempt: u32,
}

impl PreparedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Bearer token attached to this attempt.
    pub fn bearer(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Percent-encode one path segment or query value.
///
/// Only the RFC 3986 unreserved set passes through, so `/`, `?` and `#` in an
/// id can never change which resource is addressed.
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_headers() {
        let envelope = RequestEnvelope::post("/prescriptions").with_body(json!({"meds": []}));
        let req = envelope.prepare("http://localhost:5000/api/", 2, Some("tok"));

        assert_eq!(req.url, "http://localhost:5000/api/prescriptions");
        assert_eq!(req.header("x-retry-count"), Some("2"));
        assert_eq!(req.header("X-Request-Id"), Some(envelope.request_id.to_string().as_str()));
        assert_eq!(req.bearer(), Some("tok"));
        assert_eq!(req.body, Some(json!({"meds": []})));
    }

    #[test]
    fn test_prepare_unauthenticated() {
        let req = RequestEnvelope::get("appointments").prepare("http://h/api", 0, None);
        assert_eq!(req.url, "http://h/api/appointments");
        assert!(req.bearer().is_none());
    }

    #[test]
    fn test_attempts_share_request_id() {
        let envelope = RequestEnvelope::get("/appointments/a1");
        let first = envelope.prepare("http://h", 0, None);
        let retry = envelope.prepare("http://h", 1, None);
        assert_eq!(first.header("X-Request-Id"), retry.header("X-Request-Id"));
        assert_ne!(first.header("X-Retry-Count"), retry.header("X-Retry-Count"));
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("in-progress"), "in-progress");
        assert_eq!(encode_component("a b&c"), "a%20b%26c");
        // Path separators stay inside the segment
        assert_eq!(encode_component("rx/1?x#y"), "rx%2F1%3Fx%23y");
    }

    #[test]
    fn test_encoded_segment_keeps_resource_path() {
        let path = format!("/prescriptions/{}", encode_component("../appointments"));
        let req = RequestEnvelope::put(path).prepare("http://h/api", 0, None);
        assert_eq!(req.url, "http://h/api/prescriptions/..%2Fappointments");
    }
}
