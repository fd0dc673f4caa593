//! Wire transport abstraction.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::envelope::PreparedRequest;

/// Failures below the HTTP status layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Status and decoded body of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// JSON body; `Null` when empty, a JSON string when not JSON.
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, Value::Null)
    }

    /// Decode raw bytes the way the clinic API returns them.
    pub fn from_bytes(status: u16, bytes: &[u8]) -> Self {
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
        };
        Self { status, body }
    }
}

/// Executes a single prepared request. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;
}

#[cfg(feature = "http")]
pub use http::ReqwestTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::envelope::Method;

    /// `reqwest`-backed transport.
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| TransportError::Other(e.to_string()))?;
            Ok(Self { client })
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    fn to_reqwest(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    fn classify(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn execute(
            &self,
            request: &PreparedRequest,
        ) -> Result<RawResponse, TransportError> {
            let mut builder = self
                .client
                .request(to_reqwest(request.method), &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(classify)?;
            let status = response.status().as_u16();
            let bytes = response.bytes().await.map_err(classify)?;

            Ok(RawResponse::from_bytes(status, &bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_bytes() {
        assert_eq!(RawResponse::from_bytes(204, b"").body, Value::Null);
        assert_eq!(RawResponse::from_bytes(200, b"  \n").body, Value::Null);
        assert_eq!(
            RawResponse::from_bytes(200, br#"{"ok":true}"#).body,
            json!({"ok": true})
        );
        assert_eq!(
            RawResponse::from_bytes(502, b"Bad Gateway").body,
            json!("Bad Gateway")
        );
    }
}
