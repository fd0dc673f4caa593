//! In-process test doubles for the network seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::PreparedRequest;
use crate::token::{Credential, CredentialStore, TokenError, TokenResult, TokenSource};
use crate::transport::{RawResponse, Transport, TransportError};

type Handler = Box<dyn Fn(&PreparedRequest) -> Result<RawResponse, TransportError> + Send + Sync>;

enum Step {
    Respond(RawResponse),
    Fail(TransportError),
    Stall(Duration),
}

/// Transport that replays a scripted sequence, then falls back to a handler.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response.
    pub fn respond(self, status: u16, body: Value) -> Self {
        self.push(Step::Respond(RawResponse::new(status, body)))
    }

    /// Queue a response `times` times.
    pub fn respond_times(mut self, status: u16, body: Value, times: usize) -> Self {
        for _ in 0..times {
            self = self.respond(status, body.clone());
        }
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, error: TransportError) -> Self {
        self.push(Step::Fail(error))
    }

    /// Queue an attempt that hangs for `duration` before answering 200.
    pub fn stall(self, duration: Duration) -> Self {
        self.push(Step::Stall(duration))
    }

    /// Answer every request after the script runs out.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PreparedRequest) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
        self
    }

    /// Every request attempted so far.
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of attempts that reached the transport.
    pub fn attempts(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Requests whose URL ends with `suffix`.
    pub fn requests_to(&self, suffix: &str) -> Vec<PreparedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(suffix))
            .collect()
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let step = self.script.lock().ok().and_then(|mut s| s.pop_front());

        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(RawResponse::empty(200))
            }
            None => match &self.handler {
                Some(handler) => handler(request),
                None => Err(TransportError::Other("no scripted response".into())),
            },
        }
    }
}

/// Identity provider double with fixed tokens.
pub struct StaticTokenSource {
    token: Option<String>,
    refreshed: Option<String>,
    fetch_fails: bool,
    refresh_delay: Duration,
    fetches: AtomicUsize,
    refreshes: AtomicUsize,
}

impl StaticTokenSource {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_string),
            refreshed: None,
            fetch_fails: false,
            refresh_delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn failing_fetch() -> Self {
        Self {
            fetch_fails: true,
            ..Self::new(None)
        }
    }

    /// Token returned by `refresh_token`; without it refresh fails.
    pub fn refreshing_to(mut self, token: &str) -> Self {
        self.refreshed = Some(token.to_string());
        self
    }

    /// Simulated identity-provider latency for refreshes.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> TokenResult<Option<Credential>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fetch_fails {
            return Err(TokenError::Provider("session unavailable".into()));
        }
        Ok(self.token.as_deref().map(Credential::new))
    }

    async fn refresh_token(&self) -> TokenResult<Credential> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        self.refreshed
            .as_deref()
            .map(Credential::new)
            .ok_or(TokenError::NoSession)
    }
}

/// Credential store held in memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn with(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }

    pub fn snapshot(&self) -> Option<Credential> {
        self.credential.lock().ok().and_then(|c| c.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> TokenResult<Option<Credential>> {
        Ok(self.snapshot())
    }

    async fn save(&self, credential: &Credential) -> TokenResult<()> {
        let mut slot = self
            .credential
            .lock()
            .map_err(|e| TokenError::Store(e.to_string()))?;
        *slot = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> TokenResult<()> {
        let mut slot = self
            .credential
            .lock()
            .map_err(|e| TokenError::Store(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}
