//! Health reporting
//!
//! Aggregates rate limiter and cache state into a 0-100 score. The report is
//! observability only; nothing in the request path reads it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::CacheStats;
use crate::limiter::{ProviderStatus, THROTTLE_THRESHOLD};
use crate::providers::Provider;

/// Penalty per throttled provider
const THROTTLED_PENALTY: u32 = 20;

/// Penalty when the cache hit rate is below [`LOW_HIT_RATE`]
const LOW_HIT_RATE_PENALTY: u32 = 10;

/// Penalty when the cache hit rate is below [`VERY_LOW_HIT_RATE`]
const VERY_LOW_HIT_RATE_PENALTY: u32 = 20;

/// Penalty per provider failing more than [`THROTTLE_THRESHOLD`] times in a row
const FAILING_PENALTY: u32 = 15;

const LOW_HIT_RATE: f64 = 50.0;
const VERY_LOW_HIT_RATE: f64 = 30.0;

/// Score at or above which the system counts as healthy
const HEALTHY_SCORE: u8 = 80;

/// Score at or above which the system counts as degraded but working
const WARNING_SCORE: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    fn from_score(score: u8) -> Self {
        if score >= HEALTHY_SCORE {
            HealthStatus::Healthy
        } else if score >= WARNING_SCORE {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

/// Health of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub rate_limit: ProviderStatus,
    /// Fresh-cache entries tagged with this provider
    pub cached_entries: usize,
    /// Whether a fetch executor is registered and has its credentials
    pub configured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub score: u8,
    pub per_provider: BTreeMap<Provider, ProviderHealth>,
    pub cache: CacheStats,
    pub recommendations: Vec<String>,
    pub timestamp_ms: i64,
}

impl HealthReport {
    pub(crate) fn build(
        per_provider: BTreeMap<Provider, ProviderHealth>,
        cache: CacheStats,
        timestamp_ms: i64,
    ) -> Self {
        let statuses: Vec<&ProviderStatus> =
            per_provider.values().map(|h| &h.rate_limit).collect();
        let (score, mut recommendations) = assess(&statuses, &cache);

        for (provider, health) in &per_provider {
            if !health.configured {
                recommendations.push(format!(
                    "{}: no fetch executor or credentials configured; only seed data can be served",
                    provider
                ));
            }
        }

        Self {
            status: HealthStatus::from_score(score),
            score,
            per_provider,
            cache,
            recommendations,
            timestamp_ms,
        }
    }
}

/// Computes the health score and recommendations
pub fn assess(statuses: &[&ProviderStatus], cache: &CacheStats) -> (u8, Vec<String>) {
    let mut penalty = 0u32;
    let mut recommendations = Vec::new();

    for status in statuses {
        if status.is_throttled {
            penalty += THROTTLED_PENALTY;
            recommendations.push(format!(
                "{}: throttled for another {}s after repeated failures; responses are degraded",
                status.provider,
                status.throttled_for_ms.unwrap_or(0).div_ceil(1000)
            ));
        }

        if status.consecutive_failures > THROTTLE_THRESHOLD {
            penalty += FAILING_PENALTY;
            recommendations.push(format!(
                "{}: {} consecutive failures; check provider availability and credentials",
                status.provider, status.consecutive_failures
            ));
        }

        if !status.is_throttled
            && u64::from(status.calls_remaining) * 10 < u64::from(status.max_calls)
        {
            recommendations.push(format!(
                "{}: only {} of {} calls left in the current window; consider longer cache TTLs",
                status.provider, status.calls_remaining, status.max_calls
            ));
        }
    }

    // Hit rate means nothing before the cache has served a request
    if cache.hits + cache.misses > 0 {
        if cache.hit_rate < VERY_LOW_HIT_RATE {
            penalty += VERY_LOW_HIT_RATE_PENALTY;
            recommendations.push(format!(
                "Cache hit rate is {:.1}%; requests vary too much or TTLs are too short",
                cache.hit_rate
            ));
        } else if cache.hit_rate < LOW_HIT_RATE {
            penalty += LOW_HIT_RATE_PENALTY;
            recommendations.push(format!(
                "Cache hit rate is {:.1}%; consider longer cache TTLs",
                cache.hit_rate
            ));
        }
    }

    let score = 100u32.saturating_sub(penalty) as u8;
    (score, recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(provider: Provider) -> ProviderStatus {
        ProviderStatus {
            provider,
            calls_in_window: 0,
            max_calls: 100,
            calls_remaining: 100,
            reset_in_ms: 0,
            is_throttled: false,
            throttled_for_ms: None,
            consecutive_failures: 0,
            last_success_ago_ms: None,
            failures_in_window: 0,
            average_latency_ms: None,
        }
    }

    fn cache_stats(hits: u64, misses: u64) -> CacheStats {
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: 0,
            max_size: 500,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64 * 100.0
            },
            oldest_entry_age_ms: None,
            newest_entry_age_ms: None,
        }
    }

    #[test]
    fn test_fresh_system_is_healthy() {
        let s = status(Provider::GitHub);
        let (score, recommendations) = assess(&[&s], &cache_stats(0, 0));
        assert_eq!(score, 100);
        assert!(recommendations.is_empty());
        assert_eq!(HealthStatus::from_score(score), HealthStatus::Healthy);
    }

    #[test]
    fn test_throttled_provider_penalty() {
        let mut s = status(Provider::ProductHunt);
        s.is_throttled = true;
        s.throttled_for_ms = Some(1500);
        s.consecutive_failures = 3;

        let (score, recommendations) = assess(&[&s], &cache_stats(10, 0));
        assert_eq!(score, 80);
        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].contains("product_hunt"));
        assert!(recommendations[0].contains("2s"));
    }

    #[test]
    fn test_hit_rate_penalties_escalate() {
        let s = status(Provider::HackerNews);
        assert_eq!(assess(&[&s], &cache_stats(4, 6)).0, 90);
        assert_eq!(assess(&[&s], &cache_stats(2, 8)).0, 80);
        assert_eq!(assess(&[&s], &cache_stats(5, 5)).0, 100);
    }

    #[test]
    fn test_many_failures_penalty() {
        let mut s = status(Provider::GitHub);
        s.consecutive_failures = 4;
        s.is_throttled = true;

        let (score, recommendations) = assess(&[&s], &cache_stats(0, 0));
        assert_eq!(score, 65);
        assert_eq!(recommendations.len(), 2);
        assert_eq!(HealthStatus::from_score(score), HealthStatus::Warning);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let statuses: Vec<ProviderStatus> = Provider::ALL
            .into_iter()
            .map(|p| {
                let mut s = status(p);
                s.is_throttled = true;
                s.consecutive_failures = 10;
                s
            })
            .collect();
        let refs: Vec<&ProviderStatus> = statuses.iter().collect();

        let (score, _) = assess(&refs, &cache_stats(0, 10));
        assert_eq!(score, 0);
        assert_eq!(HealthStatus::from_score(score), HealthStatus::Critical);
    }

    #[test]
    fn test_low_quota_recommendation_has_no_penalty() {
        let mut s = status(Provider::GitHub);
        s.calls_remaining = 5;
        let (score, recommendations) = assess(&[&s], &cache_stats(0, 0));
        assert_eq!(score, 100);
        assert_eq!(recommendations.len(), 1);
        assert!(recommendations[0].contains("5 of 100"));
    }

    #[test]
    fn test_huge_quota_does_not_overflow() {
        let mut s = status(Provider::GitHub);
        s.max_calls = 1_000_000_000;
        s.calls_remaining = 999_999_999;
        let (score, recommendations) = assess(&[&s], &cache_stats(0, 0));
        assert_eq!(score, 100);
        assert!(recommendations.is_empty());

        s.calls_remaining = 50_000_000;
        let (_, recommendations) = assess(&[&s], &cache_stats(0, 0));
        assert_eq!(recommendations.len(), 1);
    }
}
