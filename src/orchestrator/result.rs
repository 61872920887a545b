//! Result types returned by the orchestrator

use std::collections::BTreeMap;

use serde::Serialize;

use crate::limiter::ProviderStatus;
use crate::providers::{Provider, ProviderData};

/// Where the data in a [`FetchResult`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh call to the provider
    Live,
    /// Unexpired cache entry
    Cache,
    /// Last known good response, past its TTL
    StaleCache,
    /// Built-in seed dataset
    Seed,
}

/// Quota view attached to every response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub calls_remaining: u32,
    /// Wall-clock time (Unix ms) at which the oldest call leaves the window
    pub reset_time_ms: i64,
    pub is_throttled: bool,
}

impl RateLimitStatus {
    pub(crate) fn from_status(status: &ProviderStatus, now_ms: i64) -> Self {
        Self {
            calls_remaining: status.calls_remaining,
            reset_time_ms: now_ms + status.reset_in_ms as i64,
            is_throttled: status.is_throttled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    /// Unix ms when the response was assembled
    pub timestamp_ms: i64,
    /// Time spent inside the orchestrator, retries included
    pub response_time_ms: u64,
    pub provider: Provider,
}

/// Response for a single provider operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub data: ProviderData,
    pub from_cache: bool,
    pub cache_age_ms: Option<u64>,
    /// Served from stale cache or seed data because a live call failed
    pub degraded: bool,
    pub source: DataSource,
    /// Why the response is degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub rate_limit_status: RateLimitStatus,
    pub metadata: ResponseMetadata,
}

/// Response for a fan-out request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchAllResult {
    pub per_provider: BTreeMap<Provider, FetchResult>,
    /// Providers whose request failed outright (fallback disabled or misuse)
    pub errors: BTreeMap<Provider, String>,
    /// Live responses
    pub success_count: usize,
    /// Degraded responses plus outright failures
    pub error_count: usize,
    /// Fresh cache hits
    pub from_cache_count: usize,
    /// Wall clock of the whole fan-out, i.e. of the slowest provider
    pub total_time_ms: u64,
}

impl FetchAllResult {
    pub(crate) fn new(
        per_provider: BTreeMap<Provider, FetchResult>,
        errors: BTreeMap<Provider, String>,
        total_time_ms: u64,
    ) -> Self {
        let success_count = per_provider
            .values()
            .filter(|r| r.source == DataSource::Live)
            .count();
        let from_cache_count = per_provider
            .values()
            .filter(|r| r.source == DataSource::Cache)
            .count();
        let degraded = per_provider.values().filter(|r| r.degraded).count();

        Self {
            success_count,
            error_count: degraded + errors.len(),
            from_cache_count,
            total_time_ms,
            per_provider,
            errors,
        }
    }
}
