//! Rate limiting for provider calls
//!
//! Quotas are counted over a sliding window per provider, and repeated
//! failures push a provider into a throttled state with growing backoff.

mod rate_limiter;
mod window;

pub use rate_limiter::{
    backoff_delay, CallPermit, DenyReason, ProviderStatus, RateDecision, RateLimiter,
    THROTTLE_THRESHOLD,
};
