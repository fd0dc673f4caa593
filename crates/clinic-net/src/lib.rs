//! Resilient network client for the clinic API.
//!
//! Every mobile and web host embeds one [`ResilientHttpClient`]. It checks
//! connectivity, attaches the bearer credential from an injected
//! [`TokenProvider`], retries transient failures with capped exponential
//! backoff, and normalizes every terminal failure into a [`ClientError`].

pub mod client;
pub mod connectivity;
pub mod envelope;
pub mod error;
pub mod mock;
pub mod retry;
pub mod token;
pub mod transport;

pub use client::ResilientHttpClient;
pub use connectivity::{AlwaysOnline, ConnectivityFlag, ConnectivityGate};
pub use envelope::{encode_component, Method, PreparedRequest, RequestEnvelope};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy};
pub use token::{Credential, CredentialStore, TokenError, TokenProvider, TokenResult, TokenSource};
pub use transport::{RawResponse, Transport, TransportError};

#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
