//! Bearer credential lifecycle.
//!
//! [`TokenProvider`] owns the single credential slot. It is injected into the
//! HTTP client at construction; nothing reaches it through global state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Token acquisition failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("No active session")]
    NoSession,

    #[error("Credential store error: {0}")]
    Store(String),
}

pub type TokenResult<T> = Result<T, TokenError>;

/// Opaque bearer token plus an optional expiry hint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub token: String,
    /// Best-effort expiry; the true TTL is only known to the issuer.
    pub expires_at: Option<DateTime<Utc>>,
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
            obtained_at: Utc::now(),
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True only when the expiry hint is known and has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

/// External identity provider session.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current session token, if signed in.
    async fn fetch_token(&self) -> TokenResult<Option<Credential>>;

    /// Force a session reload and return the new token.
    async fn refresh_token(&self) -> TokenResult<Credential>;
}

/// Persisted copy of the credential used on cold start.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> TokenResult<Option<Credential>>;
    async fn save(&self, credential: &Credential) -> TokenResult<()>;
    async fn clear(&self) -> TokenResult<()>;
}

#[derive(Debug, Default)]
struct Slot {
    credential: Option<Credential>,
    /// Bumped every time the slot receives a refreshed token.
    generation: u64,
}

/// Owner of the process-wide credential slot.
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    store: Arc<dyn CredentialStore>,
    slot: Mutex<Slot>,
}

impl TokenProvider {
    pub fn new(source: Arc<dyn TokenSource>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            source,
            store,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Best-effort current token.
    ///
    /// Order: live slot, identity provider, persisted copy. Failures are
    /// logged and reported as `None`; the request then goes out unauthenticated.
    pub async fn current(&self) -> Option<String> {
        let mut slot = self.slot.lock().await;

        if let Some(cred) = &slot.credential {
            if !cred.is_expired_at(Utc::now()) {
                return Some(cred.token.clone());
            }
        }

        match self.source.fetch_token().await {
            Ok(Some(cred)) => {
                if let Err(e) = self.store.save(&cred).await {
                    tracing::warn!(error = %e, "Failed to persist credential");
                }
                let token = cred.token.clone();
                slot.credential = Some(cred);
                return Some(token);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Identity provider token fetch failed"),
        }

        match self.store.load().await {
            Ok(Some(cred)) if !cred.is_expired_at(Utc::now()) => {
                let token = cred.token.clone();
                slot.credential = Some(cred);
                Some(token)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted credential");
                None
            }
        }
    }

    /// Refresh after `stale` was rejected.
    ///
    /// Callers serialize on the slot. If another caller already replaced the
    /// rejected token, the newer one is returned without a second refresh.
    pub async fn refresh(&self, stale: Option<&str>) -> TokenResult<String> {
        let mut slot = self.slot.lock().await;

        if let Some(cred) = &slot.credential {
            let already_refreshed = match stale {
                Some(stale) => cred.token != stale,
                None => slot.generation > 0,
            };
            if already_refreshed && !cred.is_expired_at(Utc::now()) {
                tracing::debug!(generation = slot.generation, "Reusing in-flight refresh result");
                return Ok(cred.token.clone());
            }
        }

        let cred = self.source.refresh_token().await?;
        if let Err(e) = self.store.save(&cred).await {
            tracing::warn!(error = %e, "Failed to persist refreshed credential");
        }
        let token = cred.token.clone();
        slot.credential = Some(cred);
        slot.generation += 1;
        tracing::info!(generation = slot.generation, "Session token refreshed");
        Ok(token)
    }

    /// Drop the live and persisted credential.
    pub async fn clear(&self) {
        let mut slot = self.slot.lock().await;
        slot.credential = None;
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear persisted credential");
        }
    }

    /// Number of refreshes performed by this provider.
    pub async fn refresh_generation(&self) -> u64 {
        self.slot.lock().await.generation
    }
}
