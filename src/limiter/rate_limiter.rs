//! Per-provider sliding-window rate limiter with failure backoff.
//!
//! Each provider has two states:
//!
//! - **Open**: calls are admitted while the window has room.
//! - **Throttled**: calls are refused until a deadline.
//!
//! A provider becomes Throttled after [`THROTTLE_THRESHOLD`] consecutive
//! failures. The deadline grows geometrically with further failures up to the
//! configured ceiling. It returns to Open once the deadline passes, or at once
//! on the next success. A single success clears any amount of prior failure;
//! there is no half-open trial period.
//!
//! State is in memory and resets on process restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::window::{CallOutcome, CallRecord, RateWindow};
use crate::config::{ProviderConfig, ProviderConfigs};
use crate::providers::Provider;

/// Consecutive failures that switch a provider to Throttled
pub const THROTTLE_THRESHOLD: u32 = 3;

/// Why a call was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Backing off after repeated failures
    Throttled,
    /// Window already holds the maximum number of calls
    QuotaExhausted,
}

/// Answer to "may I call this provider now?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub retry_after_ms: Option<u64>,
    pub reason: Option<DenyReason>,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_ms: None,
            reason: None,
        }
    }

    fn deny(reason: DenyReason, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            // Round up so a caller waiting this long is never early
            retry_after_ms: Some(duration_ms_ceil(retry_after).max(1)),
            reason: Some(reason),
        }
    }
}

/// A reserved slot in a provider's window
///
/// Returned by [`RateLimiter::try_acquire`] and handed back to
/// [`RateLimiter::complete`] once the call finished.
#[derive(Debug)]
#[must_use = "a permit should be completed with the call outcome"]
pub struct CallPermit {
    provider: Provider,
    id: u64,
}

impl CallPermit {
    pub fn provider(&self) -> Provider {
        self.provider
    }
}

/// Read-only snapshot of a provider's limiter state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub provider: Provider,
    pub calls_in_window: usize,
    pub max_calls: u32,
    pub calls_remaining: u32,
    /// Time until the oldest call leaves the window
    pub reset_in_ms: u64,
    pub is_throttled: bool,
    pub throttled_for_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_success_ago_ms: Option<u64>,
    pub failures_in_window: usize,
    pub average_latency_ms: Option<u64>,
}

/// Mutable state for one provider
#[derive(Debug, Default)]
struct ProviderState {
    window: RateWindow,
    consecutive_failures: u32,
    throttled_until: Option<Instant>,
    last_success_at: Option<Instant>,
    next_id: u64,
}

impl ProviderState {
    fn is_throttled(&self, now: Instant) -> bool {
        self.throttled_until.is_some_and(|until| now < until)
    }

    fn evaluate(&mut self, config: &ProviderConfig, now: Instant) -> RateDecision {
        self.window.prune(now, config.window());

        if let Some(until) = self.throttled_until {
            if now < until {
                return RateDecision::deny(DenyReason::Throttled, until - now);
            }
            // Deadline passed: back to Open
            self.throttled_until = None;
        }

        if self.window.len() >= config.max_calls_per_window as usize {
            let wait = self
                .window
                .time_until_slot_frees(now, config.window())
                .max(config.base_retry_delay());
            return RateDecision::deny(DenyReason::QuotaExhausted, wait);
        }

        RateDecision::allow()
    }

    fn push_record(&mut self, now: Instant, outcome: CallOutcome, latency: Duration) -> u64 {
        self.next_id += 1;
        self.window.push(CallRecord {
            id: self.next_id,
            timestamp: now,
            outcome,
            latency,
        });
        self.next_id
    }

    fn apply_outcome(
        &mut self,
        provider: Provider,
        config: &ProviderConfig,
        success: bool,
        now: Instant,
    ) {
        if success {
            if self.is_throttled(now) {
                info!(%provider, "rate limiter: success clears throttle");
            }
            self.consecutive_failures = 0;
            self.last_success_at = Some(now);
            self.throttled_until = None;
            return;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= THROTTLE_THRESHOLD {
            let backoff = backoff_delay(config, self.consecutive_failures);
            self.throttled_until = Some(now + backoff);
            warn!(
                %provider,
                failures = self.consecutive_failures,
                backoff_ms = backoff.as_millis() as u64,
                "rate limiter: provider throttled"
            );
        } else {
            debug!(
                %provider,
                failures = self.consecutive_failures,
                "rate limiter: recorded failure"
            );
        }
    }
}

/// Backoff for a provider that has failed `consecutive_failures` times in a row
///
/// Zero below the threshold, then `base * multiplier^(failures - threshold)`
/// capped at the configured maximum.
pub fn backoff_delay(config: &ProviderConfig, consecutive_failures: u32) -> Duration {
    if consecutive_failures < THROTTLE_THRESHOLD {
        return Duration::ZERO;
    }
    let exponent = (consecutive_failures - THROTTLE_THRESHOLD) as i32;
    let max_ms = config.max_backoff_delay_ms as f64;
    let delay_ms = config.base_retry_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    Duration::from_millis(delay_ms.min(max_ms) as u64)
}

fn duration_ms_ceil(d: Duration) -> u64 {
    let ms = d.as_millis() as u64;
    if d > Duration::from_millis(ms) {
        ms + 1
    } else {
        ms
    }
}

/// Rate limiter for multiple providers.
///
/// Thread-safe limiter keeping one state per provider, created on first use.
/// The outer lock only locates a provider's state; each state has its own
/// mutex so check-and-reserve for one provider never waits on another.
#[derive(Debug)]
pub struct RateLimiter {
    states: Mutex<HashMap<Provider, Arc<Mutex<ProviderState>>>>,
    configs: Mutex<HashMap<Provider, ProviderConfig>>,
}

impl RateLimiter {
    /// Creates a limiter using the given per-provider settings
    pub fn new(configs: &ProviderConfigs) -> Self {
        let configs = Provider::ALL
            .into_iter()
            .map(|p| (p, configs.get(p).clone()))
            .collect();
        Self {
            states: Mutex::new(HashMap::new()),
            configs: Mutex::new(configs),
        }
    }

    /// Lock the states map, recovering from poison if necessary.
    ///
    /// For rate limiting, it's safe to recover from a poisoned mutex since
    /// the worst case is slightly incorrect rate limiting, which is better
    /// than panicking.
    fn lock_states(&self) -> MutexGuard<'_, HashMap<Provider, Arc<Mutex<ProviderState>>>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter states mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<Provider, ProviderConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_provider(state: &Mutex<ProviderState>) -> MutexGuard<'_, ProviderState> {
        state.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter provider mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// State for `provider`, created on first use
    fn state_for(&self, provider: Provider) -> Arc<Mutex<ProviderState>> {
        let mut states = self.lock_states();
        Arc::clone(states.entry(provider).or_default())
    }

    /// Current settings for `provider`
    pub fn config(&self, provider: Provider) -> ProviderConfig {
        self.lock_configs()
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderConfig::for_provider(provider))
    }

    /// Replaces the settings for `provider` and forgets its history
    pub fn configure(&self, provider: Provider, config: ProviderConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider, config);
        drop(configs); // Release configs lock before acquiring states lock

        self.reset(provider);
    }

    /// Checks whether a call would be admitted right now
    ///
    /// Does not reserve anything; a concurrent caller may take the slot.
    /// Use [`try_acquire`](Self::try_acquire) when the answer leads to a call.
    pub fn can_call(&self, provider: Provider) -> RateDecision {
        let config = self.config(provider);
        let state = self.state_for(provider);
        let mut state = Self::lock_provider(&state);
        state.evaluate(&config, Instant::now())
    }

    /// Checks and reserves a slot in one step
    ///
    /// The reservation counts against the quota immediately, so two callers
    /// racing for the last slot cannot both be admitted.
    pub fn try_acquire(&self, provider: Provider) -> Result<CallPermit, RateDecision> {
        let config = self.config(provider);
        let state = self.state_for(provider);
        let mut state = Self::lock_provider(&state);
        let now = Instant::now();

        let decision = state.evaluate(&config, now);
        if !decision.allowed {
            debug!(%provider, ?decision, "rate limiter: call refused");
            return Err(decision);
        }

        let id = state.push_record(now, CallOutcome::Pending, Duration::ZERO);
        Ok(CallPermit { provider, id })
    }

    /// Records the outcome of a call admitted by [`try_acquire`](Self::try_acquire)
    pub fn complete(&self, permit: CallPermit, success: bool, latency: Duration) {
        let provider = permit.provider;
        let config = self.config(provider);
        let state = self.state_for(provider);
        let mut state = Self::lock_provider(&state);

        // The reservation may already have aged out of the window
        if let Some(record) = state.window.find_mut(permit.id) {
            record.outcome = if success {
                CallOutcome::Success
            } else {
                CallOutcome::Failure
            };
            record.latency = latency;
        }
        state.apply_outcome(provider, &config, success, Instant::now());
    }

    /// Appends a completed call to the window and updates failure tracking
    pub fn record_call(&self, provider: Provider, success: bool, latency: Duration) {
        let config = self.config(provider);
        let state = self.state_for(provider);
        let mut state = Self::lock_provider(&state);
        let now = Instant::now();

        let outcome = if success {
            CallOutcome::Success
        } else {
            CallOutcome::Failure
        };
        state.push_record(now, outcome, latency);
        state.apply_outcome(provider, &config, success, now);
    }

    /// Snapshot for health reporting
    ///
    /// Prunes the window but changes nothing else.
    pub fn status(&self, provider: Provider) -> ProviderStatus {
        let config = self.config(provider);
        let now = Instant::now();
        let max_calls = config.max_calls_per_window;

        let existing = self.lock_states().get(&provider).cloned();
        let Some(state) = existing else {
            return ProviderStatus {
                provider,
                calls_in_window: 0,
                max_calls,
                calls_remaining: max_calls,
                reset_in_ms: 0,
                is_throttled: false,
                throttled_for_ms: None,
                consecutive_failures: 0,
                last_success_ago_ms: None,
                failures_in_window: 0,
                average_latency_ms: None,
            };
        };

        let mut state = Self::lock_provider(&state);
        state.window.prune(now, config.window());

        let calls_in_window = state.window.len();
        let throttled_for = state
            .throttled_until
            .filter(|until| now < *until)
            .map(|until| until - now);

        ProviderStatus {
            provider,
            calls_in_window,
            max_calls,
            calls_remaining: max_calls.saturating_sub(calls_in_window as u32),
            reset_in_ms: duration_ms_ceil(state.window.time_until_slot_frees(now, config.window())),
            is_throttled: throttled_for.is_some(),
            throttled_for_ms: throttled_for.map(duration_ms_ceil),
            consecutive_failures: state.consecutive_failures,
            last_success_ago_ms: state
                .last_success_at
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            failures_in_window: state.window.count(CallOutcome::Failure),
            average_latency_ms: state.window.average_latency().map(|d| d.as_millis() as u64),
        }
    }

    /// Forgets all state for `provider`
    pub fn reset(&self, provider: Provider) {
        self.lock_states().remove(&provider);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&ProviderConfigs::default())
    }
}
