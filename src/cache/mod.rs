//! Cache module for keeping provider responses in memory
//!
//! This module provides a tagged TTL/LRU store shared across concurrent
//! requests, plus a background task that sweeps expired entries. Nothing is
//! written to disk; the cache starts empty on every process start.

mod store;
mod sweeper;

pub use store::{CacheStats, CacheStore};
pub use sweeper::SweepHandle;
