//! Background persistence of dirty stock counters.
//!
//! ## Usage
//!
//! ```ignore
//! let scheduler = PersistScheduler::spawn(Arc::clone(&cache), Duration::from_secs(5));
//!
//! // ... serve traffic ...
//!
//! // Stops the loop after one last sweep
//! scheduler.shutdown().await;
//! ```

use crate::stock_cache::StockCache;
use stockgate_core::environment::Clock;
use stockgate_core::store::{CounterStore, DurableStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawns the periodic persist sweep.
pub struct PersistScheduler;

impl PersistScheduler {
    /// Run [`StockCache::persist_sweep`] every `period` until shut down.
    ///
    /// Missed ticks are skipped rather than bunched up. Sweep errors are
    /// logged and the loop carries on; the affected items stay dirty.
    ///
    /// Must be called from inside a Tokio runtime.
    #[must_use]
    pub fn spawn<S, D, C>(cache: Arc<StockCache<S, D, C>>, period: Duration) -> PersistSchedulerHandle
    where
        S: CounterStore + 'static,
        D: DurableStore + 'static,
        C: Clock + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(
                namespace = cache.namespace(),
                period_ms = period.as_millis(),
                "Persist scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => sweep(&cache).await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            // Flush whatever changed since the last tick
            sweep(&cache).await;
            tracing::info!(namespace = cache.namespace(), "Persist scheduler stopped");
        });

        PersistSchedulerHandle { shutdown_tx, task }
    }
}

async fn sweep<S, D, C>(cache: &StockCache<S, D, C>)
where
    S: CounterStore,
    D: DurableStore,
    C: Clock,
{
    if let Err(e) = cache.persist_sweep().await {
        tracing::error!(error = %e, namespace = cache.namespace(), "Persist sweep failed");
    }
}

/// Handle to a running [`PersistScheduler`].
///
/// Dropping the handle also stops the loop (after a final sweep), but
/// without waiting for it.
pub struct PersistSchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PersistSchedulerHandle {
    /// Stop the loop and wait for its final sweep.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Persist scheduler task failed");
        }
    }

    /// Whether the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use stockgate_core::{Floor, ItemId};
    use stockgate_testing::{InMemoryCounterStore, InMemoryDurableStore, ManualClock};

    async fn setup() -> (
        Arc<StockCache<InMemoryCounterStore, InMemoryDurableStore, ManualClock>>,
        InMemoryDurableStore,
    ) {
        let durable = InMemoryDurableStore::new();
        durable.insert("a", 10);
        let cache = StockCache::new(
            "prize",
            InMemoryCounterStore::new(),
            durable.clone(),
            ManualClock::default(),
        );
        cache.warm_up().await.unwrap();
        (Arc::new(cache), durable)
    }

    #[tokio::test]
    async fn test_periodic_sweep_persists_changes() {
        let (cache, durable) = setup().await;
        let handle = PersistScheduler::spawn(Arc::clone(&cache), Duration::from_millis(10));

        cache.incr(&ItemId::from("a"), -3, Floor::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(durable.quantity(&"a".into()), Some(7));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_runs_final_sweep() {
        let (cache, durable) = setup().await;
        let handle = PersistScheduler::spawn(Arc::clone(&cache), Duration::from_secs(3600));

        // Let the immediate first tick pass before changing stock
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.incr(&ItemId::from("a"), -1, Floor::ZERO).await.unwrap();

        handle.shutdown().await;
        assert_eq!(durable.quantity(&"a".into()), Some(9));
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_loop() {
        let (cache, _) = setup().await;
        let handle = PersistScheduler::spawn(Arc::clone(&cache), Duration::from_millis(5));
        drop(handle);

        tokio::time::sleep(Duration::from_millis(30)).await;
        // Only the test still holds the cache once the task has exited
        assert_eq!(Arc::strong_count(&cache), 1);
    }
}
