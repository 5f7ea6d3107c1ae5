//! Admission gate: cap how many requests run a protected section at once.
//!
//! Unlike an in-process semaphore, the count lives in the shared counter
//! store, so the cap holds across every process serving the same queue.
//!
//! ## Algorithm
//!
//! ```text
//! while budget > 0:
//!     n = INCRBY queue +1
//!     if n <= limit: admitted
//!     INCRBY queue -1
//!     sleep random [min_backoff, max_backoff), at most the remaining budget
//! timed out
//! ```
//!
//! Callers that were admitted must [`release`](AdmissionGate::release)
//! exactly once. [`admit`](AdmissionGate::admit) pairs the two around a
//! future. A process that dies while admitted leaks its slot.
//!
//! ## Usage
//!
//! ```ignore
//! let gate = AdmissionGate::new(counters, AdmissionConfig::default());
//! let limits = gate.limits().await?;
//!
//! match gate.admit("blind-box", limits.queue_size, limits.max_wait, draw()).await? {
//!     Admission::Admitted(result) => result?,
//!     Admission::Busy => return Err(too_busy()),
//! }
//! ```

use crate::metrics::AdmissionMetrics;
use rand::Rng;
use stockgate_core::error::Result;
use stockgate_core::store::CounterStore;
use std::future::Future;
use std::time::{Duration, Instant};

/// Queue size used when none is configured in the counter store.
pub const DEFAULT_QUEUE_SIZE: i64 = 20;

/// Wait budget (seconds) used when none is configured in the counter store.
pub const DEFAULT_MAX_WAIT_SECS: i64 = 3;

/// Admission gate configuration.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Prefix for the in-flight counters and the tunable limit keys
    pub key_prefix: String,
    /// Shortest pause between attempts
    pub min_backoff: Duration,
    /// Longest pause between attempts (exclusive)
    pub max_backoff: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            key_prefix: "app-limit".to_string(),
            min_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Runtime-tunable limits read from the counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    /// Maximum concurrent holders, at least 1
    pub queue_size: i64,
    /// Wait budget, at least one second
    pub max_wait: Duration,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS.unsigned_abs()),
        }
    }
}

/// Result of [`AdmissionGate::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission<T> {
    /// The protected future ran and produced `T`
    Admitted(T),
    /// No slot freed up within the wait budget; nothing ran
    Busy,
}

impl<T> Admission<T> {
    /// Whether the protected future ran.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    /// The future's output, if it ran.
    #[must_use]
    pub fn into_inner(self) -> Option<T> {
        match self {
            Self::Admitted(value) => Some(value),
            Self::Busy => None,
        }
    }
}

/// Distributed concurrency cap over a [`CounterStore`].
pub struct AdmissionGate<S> {
    counters: S,
    config: AdmissionConfig,
}

impl<S: CounterStore> AdmissionGate<S> {
    /// Create a gate.
    #[must_use]
    pub const fn new(counters: S, config: AdmissionConfig) -> Self {
        Self { counters, config }
    }

    /// Gate configuration.
    #[must_use]
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:in-flight:{queue}", self.config.key_prefix)
    }

    /// Wait up to `max_wait` for one of `limit` slots on `queue`.
    ///
    /// Returns `Ok(true)` when admitted, `Ok(false)` when the budget ran out.
    /// A `limit` below 1 never admits.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`](stockgate_core::StockError::Store) if
    /// the counter store fails.
    pub async fn acquire(&self, queue: &str, limit: i64, max_wait: Duration) -> Result<bool> {
        let key = self.queue_key(queue);
        let started = Instant::now();
        let mut remaining = max_wait;

        while !remaining.is_zero() {
            let in_flight = self.counters.incr_by(&key, 1).await?;
            if in_flight <= limit {
                AdmissionMetrics::record(true, started.elapsed());
                tracing::debug!(queue, in_flight, limit, "Admitted");
                return Ok(true);
            }

            if let Err(e) = self.counters.incr_by(&key, -1).await {
                tracing::error!(error = %e, queue, "Failed to undo rejected admission");
                return Err(e.into());
            }

            let pause = self.backoff().min(remaining);
            tokio::time::sleep(pause).await;
            remaining = remaining.saturating_sub(pause);
        }

        AdmissionMetrics::record(false, started.elapsed());
        tracing::warn!(
            queue,
            limit,
            waited_ms = started.elapsed().as_millis(),
            "Admission timed out"
        );

        Ok(false)
    }

    /// Free the slot taken by a successful [`acquire`](Self::acquire).
    ///
    /// Not guarded against double release; call exactly once per admission.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`](stockgate_core::StockError::Store) if
    /// the counter store fails.
    pub async fn release(&self, queue: &str) -> Result<()> {
        self.counters.incr_by(&self.queue_key(queue), -1).await?;
        Ok(())
    }

    /// Acquire, run `fut`, release.
    ///
    /// The slot is released on every exit path that returns normally. A
    /// release failure is logged and the future's output is still returned,
    /// since the protected work has already happened.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`](stockgate_core::StockError::Store) if
    /// acquiring fails.
    pub async fn admit<F, T>(
        &self,
        queue: &str,
        limit: i64,
        max_wait: Duration,
        fut: F,
    ) -> Result<Admission<T>>
    where
        F: Future<Output = T>,
    {
        if !self.acquire(queue, limit, max_wait).await? {
            return Ok(Admission::Busy);
        }

        let output = fut.await;

        if let Err(e) = self.release(queue).await {
            tracing::error!(error = %e, queue, "Failed to release admission slot");
        }

        Ok(Admission::Admitted(output))
    }

    /// Current holder count for `queue` (0 when the counter is absent).
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`](stockgate_core::StockError::Store) if
    /// the counter store fails.
    pub async fn in_flight(&self, queue: &str) -> Result<i64> {
        Ok(self
            .counters
            .get(&self.queue_key(queue))
            .await?
            .unwrap_or(0))
    }

    /// Read the tunable limits, writing the defaults if they are not set.
    ///
    /// Stored under `{prefix}:queue-size` and `{prefix}:max-wait-secs` so
    /// operators can change them without a deploy. Values below 1 are
    /// raised to 1.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`](stockgate_core::StockError::Store) if
    /// the counter store fails.
    pub async fn limits(&self) -> Result<AdmissionLimits> {
        let prefix = &self.config.key_prefix;
        let queue_size = self
            .read_or_seed(&format!("{prefix}:queue-size"), DEFAULT_QUEUE_SIZE)
            .await?;
        let max_wait_secs = self
            .read_or_seed(&format!("{prefix}:max-wait-secs"), DEFAULT_MAX_WAIT_SECS)
            .await?;

        Ok(AdmissionLimits {
            queue_size: queue_size.max(1),
            max_wait: Duration::from_secs(max_wait_secs.max(1).unsigned_abs()),
        })
    }

    async fn read_or_seed(&self, key: &str, default: i64) -> Result<i64> {
        if self.counters.set_if_absent(key, default).await? {
            tracing::info!(key, default, "Seeded admission limit");
            return Ok(default);
        }
        Ok(self.counters.get(key).await?.unwrap_or(default))
    }

    /// Random pause in `[min_backoff, max_backoff)`, never zero.
    fn backoff(&self) -> Duration {
        let min = duration_micros(self.config.min_backoff);
        let max = duration_micros(self.config.max_backoff);

        let micros = if max > min {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        };

        Duration::from_micros(micros.max(1_000))
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use stockgate_testing::InMemoryCounterStore;

    fn gate() -> (AdmissionGate<InMemoryCounterStore>, InMemoryCounterStore) {
        let counters = InMemoryCounterStore::new();
        let config = AdmissionConfig {
            key_prefix: "test-limit".into(),
            min_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        };
        (AdmissionGate::new(counters.clone(), config), counters)
    }

    #[tokio::test]
    async fn test_acquire_within_limit() {
        let (gate, _) = gate();
        assert!(gate.acquire("q", 2, Duration::from_millis(100)).await.unwrap());
        assert!(gate.acquire("q", 2, Duration::from_millis(100)).await.unwrap());
        assert_eq!(gate.in_flight("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_times_out_and_leaves_count_unchanged() {
        let (gate, _) = gate();
        assert!(gate.acquire("q", 1, Duration::from_millis(100)).await.unwrap());

        let started = Instant::now();
        let admitted = gate.acquire("q", 1, Duration::from_millis(100)).await.unwrap();

        assert!(!admitted);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(gate.in_flight("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_never_touches_counter() {
        let (gate, counters) = gate();
        assert!(!gate.acquire("q", 5, Duration::ZERO).await.unwrap());
        assert_eq!(counters.call_count(), 0);
    }

    #[tokio::test]
    async fn test_release_frees_slot_for_waiter() {
        let (gate, _) = gate();
        let gate = std::sync::Arc::new(gate);
        assert!(gate.acquire("q", 1, Duration::from_millis(50)).await.unwrap());

        let waiter = {
            let gate = std::sync::Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire("q", 1, Duration::from_secs(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.release("q").await.unwrap();

        assert!(waiter.await.unwrap().unwrap());
        assert_eq!(gate.in_flight("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let (gate, _) = gate();
        assert!(gate.acquire("a", 1, Duration::from_millis(50)).await.unwrap());
        assert!(gate.acquire("b", 1, Duration::from_millis(50)).await.unwrap());
    }

    #[tokio::test]
    async fn test_admit_runs_future_and_releases() {
        let (gate, _) = gate();
        let admission = gate
            .admit("q", 1, Duration::from_millis(50), async { 7 })
            .await
            .unwrap();

        assert_eq!(admission, Admission::Admitted(7));
        assert_eq!(gate.in_flight("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admit_busy_skips_future() {
        let (gate, _) = gate();
        assert!(gate.acquire("q", 1, Duration::from_millis(50)).await.unwrap());

        let mut ran = false;
        let admission = gate
            .admit("q", 1, Duration::from_millis(30), async { ran = true })
            .await
            .unwrap();

        assert_eq!(admission, Admission::Busy);
        assert!(admission.into_inner().is_none());
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_acquire_surfaces_store_fault() {
        let (gate, counters) = gate();
        counters.set_offline(true);
        assert!(gate.acquire("q", 1, Duration::from_millis(50)).await.is_err());
    }

    #[tokio::test]
    async fn test_limits_seed_defaults() {
        let (gate, counters) = gate();
        let limits = gate.limits().await.unwrap();

        assert_eq!(limits, AdmissionLimits::default());
        assert_eq!(counters.value("test-limit:queue-size"), Some(20));
        assert_eq!(counters.value("test-limit:max-wait-secs"), Some(3));
    }

    #[tokio::test]
    async fn test_limits_read_and_clamp_stored_values() {
        let (gate, counters) = gate();
        counters.set("test-limit:queue-size", 0).await.unwrap();
        counters.set("test-limit:max-wait-secs", 10).await.unwrap();

        let limits = gate.limits().await.unwrap();
        assert_eq!(limits.queue_size, 1);
        assert_eq!(limits.max_wait, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_stays_in_range() {
        let (gate, _) = gate();
        for _ in 0..100 {
            let pause = gate.backoff();
            assert!(pause >= Duration::from_millis(5));
            assert!(pause < Duration::from_millis(20));
        }
    }

    #[test]
    fn test_backoff_never_zero() {
        let gate = AdmissionGate::new(
            InMemoryCounterStore::new(),
            AdmissionConfig {
                key_prefix: "p".into(),
                min_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
        );
        assert_eq!(gate.backoff(), Duration::from_millis(1));
    }
}
