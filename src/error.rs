//! Error types for the resilience layer
//!
//! Two levels of failure exist. [`FetchError`] is what a single provider call
//! can produce (network, status, parsing, timeout). [`ResilienceError`] is what
//! the orchestrator surfaces to callers once retries and fallback have been
//! considered.

use thiserror::Error;

use crate::providers::Provider;

/// Errors that can occur during a single call to a provider
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status code
    #[error("Provider returned status {code}")]
    Status {
        /// HTTP status code
        code: u16,
    },

    /// Failed to parse the provider response
    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    /// The call did not complete within the per-call timeout
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// The provider requires credentials that were not configured
    #[error("Missing credentials for provider")]
    MissingCredentials,
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Quota exhausted or provider throttled, and fallback is disabled
    #[error("Rate limit exceeded for {provider}, retry after {retry_after_ms}ms")]
    RateLimitExceeded {
        /// The provider that refused the call
        provider: Provider,
        /// How long until a call may be admitted
        retry_after_ms: u64,
    },

    /// Provider kept failing after all retries, and no fallback exists
    #[error("Provider {provider} unavailable after {attempts} attempt(s): {message}")]
    ProviderUnavailable {
        /// The failing provider
        provider: Provider,
        /// Number of calls made
        attempts: u32,
        /// Last failure observed
        message: String,
    },

    /// Caller misuse: unknown provider, missing executor or malformed params
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ResilienceError {
    /// Whether the error is transient (worth retrying later) rather than misuse
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }

    /// Suggested delay before retrying, if the error carries one
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
