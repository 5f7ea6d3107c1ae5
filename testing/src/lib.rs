//! # Stockgate Testing
//!
//! Testing utilities for the stockgate inventory engine.
//!
//! This crate provides:
//! - [`InMemoryCounterStore`]: an atomic counter store with failure injection
//! - [`InMemoryDurableStore`]: a durable store that counts its writes
//! - [`FixedClock`] and [`ManualClock`]: deterministic time
//! - [`init_test_tracing`]: opt-in log output for debugging tests
//!
//! ## Example
//!
//! ```ignore
//! use stockgate_testing::{InMemoryCounterStore, InMemoryDurableStore, ManualClock};
//! use stockgate_runtime::StockCache;
//!
//! #[tokio::test]
//! async fn test_deduction() {
//!     let cache = StockCache::new(
//!         "prize-stock",
//!         InMemoryCounterStore::new(),
//!         InMemoryDurableStore::new(),
//!         ManualClock::default(),
//!     );
//!     cache.seed(&"a".into(), 1).await.unwrap();
//!     assert!(cache.incr(&"a".into(), -1, Floor::ZERO).await.unwrap().is_applied());
//! }
//! ```

pub mod counter_store;
pub mod durable_store;

use chrono::{DateTime, TimeZone, Utc};
use stockgate_core::environment::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

pub use counter_store::InMemoryCounterStore;
pub use durable_store::InMemoryDurableStore;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Arc, AtomicI64, Clock, DateTime, Ordering, TimeZone, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use stockgate_testing::mocks::FixedClock;
    /// use stockgate_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Dirty tracking compares millisecond timestamps, so tests that need a
    /// change to count as "after" the last persist advance this clock between
    /// operations. Clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        millis: Arc<AtomicI64>,
    }

    impl ManualClock {
        /// Create a clock reading `millis` since the Unix epoch.
        #[must_use]
        pub fn at_millis(millis: i64) -> Self {
            Self {
                millis: Arc::new(AtomicI64::new(millis)),
            }
        }

        /// Move the clock forward.
        pub fn advance_millis(&self, millis: i64) {
            self.millis.fetch_add(millis, Ordering::SeqCst);
        }

        /// Current reading in epoch milliseconds.
        #[must_use]
        pub fn millis(&self) -> i64 {
            self.millis.load(Ordering::SeqCst)
        }
    }

    impl Default for ManualClock {
        /// Starts at 2025-01-01 00:00:00 UTC.
        fn default() -> Self {
            Self::at_millis(1_735_689_600_000)
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_millis_opt(self.millis())
                .single()
                .unwrap_or_default()
        }

        fn now_millis(&self) -> i64 {
            self.millis()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            Utc.timestamp_millis_opt(1_735_689_600_000)
                .single()
                .unwrap_or_default(),
        )
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
///
/// Safe to call from every test; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_manual_clock_shares_time_between_clones() {
        let clock = ManualClock::at_millis(1_000);
        let other = clock.clone();
        clock.advance_millis(5);
        assert_eq!(other.now_millis(), 1_005);
        assert_eq!(other.now().timestamp_millis(), 1_005);
    }
}
