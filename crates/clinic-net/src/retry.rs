//! Retry classification and exponential backoff.

use std::time::Duration;

use crate::error::ErrorKind;

/// Default number of retries after the original attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Base backoff in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
/// Backoff ceiling in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Per-attempt client deadline.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `min(base * 2^retry, max)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.checked_pow(retry).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Decide what to do after `attempt` (0-based) ended with `outcome`.
    pub fn decide(&self, attempt: u32, outcome: AttemptOutcome) -> RetryDecision {
        match outcome {
            AttemptOutcome::Success => RetryDecision::Done,
            AttemptOutcome::Unauthorized => RetryDecision::RefreshCredential,
            AttemptOutcome::Terminal(kind) => RetryDecision::Fail(kind),
            AttemptOutcome::Retryable(kind) => {
                if attempt < self.max_retries {
                    let retry = attempt + 1;
                    RetryDecision::RetryAfter {
                        retry,
                        delay: self.delay_for(retry),
                    }
                } else {
                    RetryDecision::Fail(kind)
                }
            }
        }
    }
}

/// Classification of a single attempt's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// 401: eligible for the single credential refresh.
    Unauthorized,
    /// 5xx, timeout or dropped connection.
    Retryable(ErrorKind),
    /// Never retried.
    Terminal(ErrorKind),
}

impl AttemptOutcome {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => AttemptOutcome::Success,
            401 => AttemptOutcome::Unauthorized,
            403 => AttemptOutcome::Terminal(ErrorKind::PermissionDenied),
            404 => AttemptOutcome::Terminal(ErrorKind::NotFound),
            400 | 409 | 422 => AttemptOutcome::Terminal(ErrorKind::ValidationError),
            500..=599 => AttemptOutcome::Retryable(ErrorKind::ServerError),
            _ => AttemptOutcome::Terminal(ErrorKind::Unknown),
        }
    }
}

/// What the retry loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Done,
    RefreshCredential,
    RetryAfter { retry: u32, delay: Duration },
    Fail(ErrorKind),
}
