//! Pulsegate
//!
//! Rate-limited, cached and fault-tolerant access to a launch board, a
//! discussion board and code-repository search. The [`Orchestrator`] is the
//! entry point; the cache and rate limiter are usable on their own.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod limiter;
pub mod orchestrator;
pub mod providers;

pub use cache::{CacheStats, CacheStore};
pub use config::{ConfigError, ResilienceConfig};
pub use error::{FetchError, ResilienceError};
pub use limiter::{RateDecision, RateLimiter};
pub use orchestrator::{FetchAllResult, FetchResult, HealthReport, Orchestrator};
pub use providers::{FetchExecutor, FetchParams, Provider, ProviderData};
