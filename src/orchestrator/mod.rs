//! Orchestrator composing cache, rate limiter and fetch executors
//!
//! The orchestrator is the entry point used by the front end. For every
//! provider operation it:
//!
//! 1. derives a cache key from provider, operation and parameters
//! 2. serves a fresh cache hit without touching the rate limiter
//! 3. asks the rate limiter for a slot
//! 4. calls the provider's executor under a timeout, caching successes
//! 5. retries failures a bounded number of times, then degrades to the last
//!    known good response or to seed data
//!
//! Transient failures only reach the caller when fallback is disabled.

mod health;
mod result;

pub use health::{assess, HealthReport, HealthStatus, ProviderHealth};
pub use result::{DataSource, FetchAllResult, FetchResult, RateLimitStatus, ResponseMetadata};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, SweepHandle};
use crate::config::{ConfigError, ResilienceConfig};
use crate::error::{FetchError, ResilienceError};
use crate::limiter::{CallPermit, RateDecision, RateLimiter};
use crate::providers::{
    seed_data, FetchExecutor, FetchParams, GitHubClient, HackerNewsClient, ProductHuntClient,
    Provider, ProviderData,
};

/// Coordinates provider calls behind a cache, a rate limiter and fallbacks
pub struct Orchestrator {
    config: ResilienceConfig,
    /// Fresh responses, each under its provider's TTL
    cache: Arc<CacheStore<ProviderData>>,
    /// Last known good responses, kept for fallback long after they go stale
    last_good: Arc<CacheStore<ProviderData>>,
    limiter: Arc<RateLimiter>,
    executors: HashMap<Provider, Arc<dyn FetchExecutor>>,
    sweepers: Mutex<Vec<SweepHandle>>,
}

impl Orchestrator {
    /// Creates an orchestrator around an existing cache and rate limiter
    ///
    /// No executors are registered; add them with
    /// [`with_executor`](Self::with_executor). The limiter keeps whatever
    /// provider settings it was built with.
    pub fn new(
        config: ResilienceConfig,
        cache: Arc<CacheStore<ProviderData>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let last_good = Arc::new(CacheStore::new(config.cache_max_size));
        Self {
            config,
            cache,
            last_good,
            limiter,
            executors: HashMap::new(),
            sweepers: Mutex::new(Vec::new()),
        }
    }

    /// Builds an orchestrator with the HTTP clients for all three providers
    pub fn from_config(config: ResilienceConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = Arc::new(CacheStore::new(config.cache_max_size));
        let limiter = Arc::new(RateLimiter::new(&config.providers));
        let credentials = config.credentials.clone();

        Ok(Self::new(config, cache, limiter)
            .with_executor(Arc::new(ProductHuntClient::new(
                credentials.product_hunt_token,
            )))
            .with_executor(Arc::new(HackerNewsClient::new()))
            .with_executor(Arc::new(
                GitHubClient::new().with_token(credentials.github_token),
            )))
    }

    /// Registers the executor for the provider it reports
    pub fn with_executor(mut self, executor: Arc<dyn FetchExecutor>) -> Self {
        self.executors.insert(executor.provider(), executor);
        self
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore<ProviderData>> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Starts the background expiry sweeps for both caches
    ///
    /// Calling it again while the sweeps run does nothing.
    pub fn start(&self) {
        let mut sweepers = self.sweepers.lock().unwrap_or_else(|p| p.into_inner());
        if !sweepers.is_empty() {
            return;
        }
        let interval = self.config.sweep_interval();
        sweepers.push(self.cache.start_sweeper(interval));
        sweepers.push(self.last_good.start_sweeper(interval));
        info!(interval_ms = interval.as_millis() as u64, "cache sweepers started");
    }

    /// Stops the background sweeps and waits for them to exit
    pub async fn shutdown(&self) {
        let handles: Vec<SweepHandle> = {
            let mut sweepers = self.sweepers.lock().unwrap_or_else(|p| p.into_inner());
            sweepers.drain(..).collect()
        };
        for handle in handles {
            handle.shutdown().await;
        }
        debug!("cache sweepers stopped");
    }

    /// Fetches data for one provider
    ///
    /// Returns live, cached or degraded data. Fails only on caller misuse,
    /// or on transient failure when fallback is disabled.
    pub async fn fetch(
        &self,
        provider: Provider,
        params: &FetchParams,
    ) -> Result<FetchResult, ResilienceError> {
        let started = Instant::now();

        provider.validate(params)?;
        let executor = self.executors.get(&provider).cloned().ok_or_else(|| {
            ResilienceError::Configuration(format!("no fetch executor registered for {}", provider))
        })?;
        let key = cache_key(provider, params);

        if self.config.enable_caching {
            if let Some((data, age)) = self.cache.get_with_age(&key) {
                debug!(%provider, key = %key, age_ms = age.as_millis() as u64, "cache hit");
                return Ok(self.respond(provider, data, DataSource::Cache, Some(age), None, started));
            }
        }

        if !executor.is_configured() {
            let failure = ResilienceError::Configuration(format!(
                "{} requires credentials that are not configured",
                provider
            ));
            return self.degrade(provider, &key, failure, started);
        }

        let mut attempts = 0u32;
        let mut last_error: Option<FetchError> = None;
        loop {
            let permit = match self.admit(provider) {
                Ok(permit) => permit,
                Err(decision) => {
                    let failure = match last_error {
                        // Throttled by this request's own failures
                        Some(err) => ResilienceError::ProviderUnavailable {
                            provider,
                            attempts,
                            message: err.to_string(),
                        },
                        None => ResilienceError::RateLimitExceeded {
                            provider,
                            retry_after_ms: decision.retry_after_ms.unwrap_or(0),
                        },
                    };
                    return self.degrade(provider, &key, failure, started);
                }
            };

            attempts += 1;
            match self.call(provider, executor.as_ref(), params, permit).await {
                Ok(data) => {
                    self.remember(provider, &key, &data);
                    info!(%provider, attempts, "fetched live data");
                    return Ok(self.respond(provider, data, DataSource::Live, None, None, started));
                }
                Err(err) => {
                    warn!(%provider, attempt = attempts, error = %err, "provider call failed");
                    if attempts > self.config.max_retries {
                        let failure = ResilienceError::ProviderUnavailable {
                            provider,
                            attempts,
                            message: err.to_string(),
                        };
                        return self.degrade(provider, &key, failure, started);
                    }
                    last_error = Some(err);
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
            }
        }
    }

    /// Fetches several providers concurrently
    ///
    /// `params` is shared; each provider receives only the keys it accepts.
    /// Duplicate providers are fetched once.
    pub async fn fetch_all(&self, providers: &[Provider], params: &FetchParams) -> FetchAllResult {
        let started = Instant::now();
        let unique: BTreeSet<Provider> = providers.iter().copied().collect();

        let requests = unique.into_iter().map(|provider| {
            let params = params.for_provider(provider);
            async move { (provider, self.fetch(provider, &params).await) }
        });
        let outcomes = join_all(requests).await;

        let mut per_provider = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for (provider, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    per_provider.insert(provider, result);
                }
                Err(err) => {
                    errors.insert(provider, err.to_string());
                }
            }
        }

        let result = FetchAllResult::new(per_provider, errors, elapsed_ms(started));
        info!(
            success = result.success_count,
            cached = result.from_cache_count,
            errors = result.error_count,
            total_ms = result.total_time_ms,
            "fan-out complete"
        );
        result
    }

    /// Health of one provider, or of all when `provider` is `None`
    pub fn health(&self, provider: Option<Provider>) -> HealthReport {
        let providers: Vec<Provider> = match provider {
            Some(p) => vec![p],
            None => Provider::ALL.to_vec(),
        };

        let per_provider = providers
            .into_iter()
            .map(|p| {
                let health = ProviderHealth {
                    rate_limit: self.limiter.status(p),
                    cached_entries: self.cache.count_by_tag(p.as_str()),
                    configured: self.executors.get(&p).is_some_and(|e| e.is_configured()),
                };
                (p, health)
            })
            .collect();

        HealthReport::build(per_provider, self.cache.stats(), Utc::now().timestamp_millis())
    }

    /// Drops cached responses carrying `tag`, returning how many fresh entries went
    ///
    /// Last known good copies carrying the tag are dropped as well.
    pub fn invalidate(&self, tag: &str) -> usize {
        self.last_good.invalidate_by_tag(tag);
        self.cache.invalidate_by_tag(tag)
    }

    /// Empties both caches; rate limiter state is kept
    pub fn clear_all(&self) {
        self.cache.clear();
        self.last_good.clear();
        info!("all caches cleared");
    }

    /// Reserves a rate limiter slot when rate limiting is enabled
    fn admit(&self, provider: Provider) -> Result<Option<CallPermit>, RateDecision> {
        if !self.config.enable_rate_limiting {
            return Ok(None);
        }
        self.limiter.try_acquire(provider).map(Some)
    }

    /// Runs the executor under the per-call timeout and records the outcome
    async fn call(
        &self,
        provider: Provider,
        executor: &dyn FetchExecutor,
        params: &FetchParams,
        permit: Option<CallPermit>,
    ) -> Result<ProviderData, FetchError> {
        let timeout = self.config.request_timeout();
        let call_started = Instant::now();

        let outcome = match tokio::time::timeout(timeout, executor.fetch(params)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
        };
        let outcome = outcome.and_then(|data| {
            if data.provider() == provider {
                Ok(data)
            } else {
                Err(FetchError::Parse(format!(
                    "executor for {} returned data for {}",
                    provider,
                    data.provider()
                )))
            }
        });

        let latency = call_started.elapsed();
        let success = outcome.is_ok();
        match permit {
            Some(permit) => self.limiter.complete(permit, success, latency),
            None => self.limiter.record_call(provider, success, latency),
        }
        outcome
    }

    /// Stores a live response in the fresh cache and the fallback store
    fn remember(&self, provider: Provider, key: &str, data: &ProviderData) {
        let tags = [provider.as_str(), provider.operation()];
        if self.config.enable_caching {
            let ttl = self.config.provider(provider).cache_ttl();
            self.cache.set(key, data.clone(), ttl, &tags);
        }
        if self.config.fallback_enabled {
            self.last_good
                .set(key, data.clone(), self.config.stale_ttl(), &tags);
        }
    }

    /// Falls back to the last known good response or seed data
    ///
    /// Surfaces `failure` unchanged when fallback is disabled.
    fn degrade(
        &self,
        provider: Provider,
        key: &str,
        failure: ResilienceError,
        started: Instant,
    ) -> Result<FetchResult, ResilienceError> {
        if !self.config.fallback_enabled {
            return Err(failure);
        }

        let reason = Some(failure.to_string());
        match self.last_good.get_with_age(key) {
            Some((data, age)) => {
                warn!(%provider, age_ms = age.as_millis() as u64, reason = %failure, "serving stale data");
                Ok(self.respond(provider, data, DataSource::StaleCache, Some(age), reason, started))
            }
            None => {
                warn!(%provider, reason = %failure, "serving seed data");
                Ok(self.respond(provider, seed_data(provider), DataSource::Seed, None, reason, started))
            }
        }
    }

    fn respond(
        &self,
        provider: Provider,
        data: ProviderData,
        source: DataSource,
        cache_age: Option<Duration>,
        degraded_reason: Option<String>,
        started: Instant,
    ) -> FetchResult {
        let now_ms = Utc::now().timestamp_millis();
        let status = self.limiter.status(provider);

        FetchResult {
            data,
            from_cache: matches!(source, DataSource::Cache | DataSource::StaleCache),
            cache_age_ms: cache_age.map(|age| age.as_millis() as u64),
            degraded: matches!(source, DataSource::StaleCache | DataSource::Seed),
            source,
            degraded_reason,
            rate_limit_status: RateLimitStatus::from_status(&status, now_ms),
            metadata: ResponseMetadata {
                timestamp_ms: now_ms,
                response_time_ms: elapsed_ms(started),
                provider,
            },
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut executors: Vec<&Provider> = self.executors.keys().collect();
        executors.sort();
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("cache_size", &self.cache.len())
            .field("executors", &executors)
            .finish()
    }
}

/// Cache key for a provider operation, e.g. `github:repositories:{"query":"rust"}`
pub fn cache_key(provider: Provider, params: &FetchParams) -> String {
    format!(
        "{}:{}:{}",
        provider.as_str(),
        provider.operation(),
        params.stable_key()
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        let params = FetchParams::new().with("query", "rust").with("limit", "5");
        assert_eq!(
            cache_key(Provider::GitHub, &params),
            r#"github:repositories:{"limit":"5","query":"rust"}"#
        );
        assert_eq!(
            cache_key(Provider::HackerNews, &FetchParams::new()),
            "hacker_news:stories:{}"
        );
    }

    #[tokio::test]
    async fn test_from_config_registers_all_providers() {
        let mut config = ResilienceConfig::default();
        config.credentials.product_hunt_token = Some("token".to_string());
        let orchestrator = Orchestrator::from_config(config).unwrap();
        let report = orchestrator.health(None);
        assert_eq!(report.per_provider.len(), 3);
        assert!(report.per_provider.values().all(|h| h.configured));
    }

    #[tokio::test]
    async fn test_missing_token_is_reported_unconfigured() {
        let orchestrator = Orchestrator::from_config(ResilienceConfig::default()).unwrap();
        let report = orchestrator.health(None);
        assert!(!report.per_provider[&Provider::ProductHunt].configured);
        assert!(report.per_provider[&Provider::GitHub].configured);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.starts_with("product_hunt")));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let config = ResilienceConfig {
            cache_max_size: 0,
            ..Default::default()
        };
        assert!(Orchestrator::from_config(config).is_err());
    }

    #[tokio::test]
    async fn test_missing_executor_is_configuration_error() {
        let orchestrator = Orchestrator::new(
            ResilienceConfig::default(),
            Arc::new(CacheStore::new(10)),
            Arc::new(RateLimiter::default()),
        );
        let err = orchestrator
            .fetch(Provider::GitHub, &FetchParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::Configuration(_)));

        let report = orchestrator.health(Some(Provider::GitHub));
        assert!(!report.per_provider[&Provider::GitHub].configured);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_shutdown_stops() {
        let orchestrator = Orchestrator::from_config(ResilienceConfig::default()).unwrap();
        orchestrator.start();
        orchestrator.start();
        assert_eq!(orchestrator.sweepers.lock().unwrap().len(), 2);

        orchestrator.shutdown().await;
        assert!(orchestrator.sweepers.lock().unwrap().is_empty());
    }
}
