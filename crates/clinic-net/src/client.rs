//! Resilient HTTP client.
//!
//! Order of operations for [`ResilientHttpClient::send`]:
//!
//! ```text
//! connectivity? ──no──► NetworkUnavailable (no attempt, no delay)
//!      │yes
//! attach bearer (best-effort)
//!      │
//! attempt n ──2xx──► body
//!      ├─401──► refresh once (not counted) ──► same attempt again ──401──► SessionExpired + clear
//!      ├─403/404/4xx──► terminal, no retry
//!      └─5xx/timeout/connect──► n < 3 ? sleep(min(1000·2^(n+1), 10000)) : terminal
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connectivity::ConnectivityGate;
use crate::envelope::RequestEnvelope;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
use crate::token::TokenProvider;
use crate::transport::{RawResponse, Transport, TransportError};

/// HTTP client with auth injection, connectivity gating and bounded retry.
pub struct ResilientHttpClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenProvider>,
    connectivity: Arc<dyn ConnectivityGate>,
    policy: RetryPolicy,
}

impl ResilientHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenProvider>,
        connectivity: Arc<dyn ConnectivityGate>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            tokens,
            connectivity,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Send an envelope and return the JSON body of the first 2xx response.
    pub async fn send(&self, envelope: &RequestEnvelope) -> ClientResult<Value> {
        if !self.connectivity.is_reachable().await {
            tracing::warn!(
                method = envelope.method.as_str(),
                path = %envelope.path,
                "Request rejected: no connectivity"
            );
            return Err(ClientError::network_unavailable());
        }

        let mut bearer = self.tokens.current().await;
        let mut refreshed = false;
        let mut attempt: u32 = 0;
        let timeout = envelope.timeout.unwrap_or(self.policy.attempt_timeout);

        loop {
            let request = envelope.prepare(&self.base_url, attempt, bearer.as_deref());
            tracing::debug!(
                method = envelope.method.as_str(),
                path = %envelope.path,
                attempt,
                authenticated = bearer.is_some(),
                "Sending request"
            );

            let result = match tokio::time::timeout(timeout, self.transport.execute(&request)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            let (outcome, response, failure) = match result {
                Ok(response) => (AttemptOutcome::from_status(response.status), Some(response), None),
                Err(TransportError::Timeout) => (
                    AttemptOutcome::Retryable(ErrorKind::ServerError),
                    None,
                    Some(TransportError::Timeout),
                ),
                Err(e @ TransportError::Connect(_)) => (
                    AttemptOutcome::Retryable(ErrorKind::NetworkUnavailable),
                    None,
                    Some(e),
                ),
                Err(e @ TransportError::Other(_)) => {
                    (AttemptOutcome::Terminal(ErrorKind::Unknown), None, Some(e))
                }
            };

            match self.policy.decide(attempt, outcome) {
                RetryDecision::Done => {
                    tracing::debug!(path = %envelope.path, attempt, "Request succeeded");
                    return Ok(response.map(|r| r.body).unwrap_or(Value::Null));
                }
                RetryDecision::RefreshCredential => {
                    if refreshed {
                        tracing::warn!(path = %envelope.path, "Still unauthorized after refresh");
                        return Err(self.expire_session(response, None).await);
                    }
                    refreshed = true;
                    match self.tokens.refresh(bearer.as_deref()).await {
                        Ok(token) => {
                            tracing::info!(path = %envelope.path, "Retrying with refreshed credential");
                            bearer = Some(token);
                        }
                        Err(e) => {
                            tracing::warn!(path = %envelope.path, error = %e, "Credential refresh failed");
                            return Err(self.expire_session(response, Some(e.to_string())).await);
                        }
                    }
                }
                RetryDecision::RetryAfter { retry, delay } => {
                    tracing::warn!(
                        method = envelope.method.as_str(),
                        path = %envelope.path,
                        retry,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        status = response.as_ref().map(|r| r.status),
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    if !self.connectivity.is_reachable().await {
                        return Err(ClientError::network_unavailable());
                    }
                    attempt = retry;
                }
                RetryDecision::Fail(kind) => {
                    let error = terminal_error(kind, response, failure);
                    tracing::warn!(
                        method = envelope.method.as_str(),
                        path = %envelope.path,
                        attempt,
                        kind = ?error.kind,
                        status = error.status_code,
                        "Request failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Send and decode the body into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, envelope: &RequestEnvelope) -> ClientResult<T> {
        let body = self.send(envelope).await?;
        serde_json::from_value(body).map_err(|e| {
            ClientError::new(ErrorKind::Unknown)
                .with_message("Unexpected response format")
                .with_cause(e)
        })
    }

    async fn expire_session(&self, response: Option<RawResponse>, cause: Option<String>) -> ClientError {
        self.tokens.clear().await;
        let mut error = ClientError::session_expired();
        error.cause = cause;
        error.body = response.map(|r| r.body).filter(|b| !b.is_null());
        error
    }
}

fn terminal_error(
    kind: ErrorKind,
    response: Option<RawResponse>,
    failure: Option<TransportError>,
) -> ClientError {
    let mut error = ClientError::new(kind);
    if let Some(failure) = failure {
        if failure == TransportError::Timeout {
            error = error.with_message("Request timed out");
        }
        error = error.with_cause(failure);
    }
    if let Some(response) = response {
        error = error.with_status(response.status);
        // 5xx bodies are not shown to operators
        if kind == ErrorKind::ServerError {
            error.body = Some(response.body).filter(|b| !b.is_null());
        } else if response.body.is_object() {
            error = error.with_body(response.body);
        }
    }
    error
}
