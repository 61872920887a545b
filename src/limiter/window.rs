//! Sliding call window
//!
//! Keeps the calls made to one provider during the trailing window, oldest
//! first. Pruning is a linear filter over a deque, which is plenty for
//! quotas in the low thousands per hour.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a call in the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallOutcome {
    /// Slot reserved, call still in flight
    Pending,
    Success,
    Failure,
}

/// One call counted against the quota
#[derive(Debug, Clone)]
pub(crate) struct CallRecord {
    pub(crate) id: u64,
    pub(crate) timestamp: Instant,
    pub(crate) outcome: CallOutcome,
    pub(crate) latency: Duration,
}

/// Calls made within the trailing window, oldest first
#[derive(Debug, Default)]
pub(crate) struct RateWindow {
    records: VecDeque<CallRecord>,
}

impl RateWindow {
    /// Drops records that are `window` or more in the past
    pub(crate) fn prune(&mut self, now: Instant, window: Duration) {
        self.records
            .retain(|r| now.saturating_duration_since(r.timestamp) < window);
    }

    pub(crate) fn push(&mut self, record: CallRecord) {
        self.records.push_back(record);
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn oldest(&self) -> Option<&CallRecord> {
        self.records.front()
    }

    pub(crate) fn find_mut(&mut self, id: u64) -> Option<&mut CallRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Time until the oldest record leaves the window
    pub(crate) fn time_until_slot_frees(&self, now: Instant, window: Duration) -> Duration {
        self.oldest()
            .map(|r| (r.timestamp + window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Mean latency of completed calls
    pub(crate) fn average_latency(&self) -> Option<Duration> {
        let completed: Vec<Duration> = self
            .records
            .iter()
            .filter(|r| r.outcome != CallOutcome::Pending)
            .map(|r| r.latency)
            .collect();
        if completed.is_empty() {
            return None;
        }
        Some(completed.iter().sum::<Duration>() / completed.len() as u32)
    }

    /// Count of records with the given outcome
    pub(crate) fn count(&self, outcome: CallOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }
}
