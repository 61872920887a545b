//! Background expiry sweep
//!
//! Runs [`CacheStore::sweep_expired`] on a fixed interval so entries written
//! once and never read again do not pin memory until they are evicted.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::CacheStore;

/// Handle for stopping a running sweep task
///
/// Dropping the handle also stops the task at its next wake-up.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stops the sweep task and waits for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }

    /// Whether the task has already exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T: Clone + Send + 'static> CacheStore<T> {
    /// Spawns a task sweeping expired entries every `interval`
    ///
    /// The task only holds a weak reference, so it also ends once the store
    /// itself is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let store: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the first tick (immediate)
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else {
                            break;
                        };
                        let removed = store.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        SweepHandle { shutdown_tx, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries_without_reads() {
        let cache = Arc::new(CacheStore::new(10));
        cache.set("short", 1, Duration::from_millis(50), &[]);
        cache.set("long", 2, Duration::from_secs(60), &[]);

        let handle = cache.start_sweeper(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let cache: Arc<CacheStore<u8>> = Arc::new(CacheStore::new(10));
        let handle = cache.start_sweeper(Duration::from_millis(100));
        assert!(!handle.is_finished());

        handle.shutdown().await;

        // Entries written after shutdown are never swept
        cache.set("short", 1, Duration::from_millis(10), &[]);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ends_when_store_is_dropped() {
        let cache: Arc<CacheStore<u8>> = Arc::new(CacheStore::new(10));
        let handle = cache.start_sweeper(Duration::from_millis(100));
        drop(cache);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(handle.is_finished());
    }
}
