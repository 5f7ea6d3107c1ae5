//! # Stockgate Core
//!
//! Core types and provider traits for the stockgate inventory engine.
//!
//! The engine sells strictly limited quantities (blind-box prizes, wheel
//! prizes, flash-sale stock) under heavy concurrent demand without
//! overselling. This crate holds everything that does no I/O:
//!
//! - **Types**: [`ItemId`], [`StockLevel`], [`Candidate`], [`Floor`],
//!   [`StockDelta`], [`DirtyMarker`] and the outcome types returned by
//!   counter operations
//! - **Providers**: the [`CounterStore`] and [`DurableStore`] traits that
//!   concrete backends (Redis, `PostgreSQL`, in-memory mocks) implement
//! - **Environment**: the [`Clock`](environment::Clock) abstraction
//! - **Errors**: [`StoreError`], [`StockError`] and [`DrawError`]
//!
//! ## Architecture
//!
//! ```text
//! AdmissionGate ──► DrawEngine ──► StockCache ──► CounterStore (atomic INCRBY)
//!                                      │
//!                                      └── persist sweep ──► DurableStore
//! ```
//!
//! Components never look up a store through global state; every provider
//! is injected at construction time.

pub mod error;
pub mod store;
pub mod types;

pub use error::{DrawError, StockError, StoreError};
pub use store::{CounterStore, DurableStore, StoreResult};
pub use types::{
    BatchOutcome, Candidate, DirtyMarker, Floor, IncrOutcome, ItemId, StockDelta, StockLevel,
};

/// Environment module - Dependency injection traits
///
/// All time-dependent behavior (dirty markers, persist timestamps) reads the
/// current time through [`Clock`](environment::Clock) so tests can control it.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use stockgate_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let millis = clock.now_millis();
    /// assert!(millis > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current time as Unix epoch milliseconds.
        fn now_millis(&self) -> i64 {
            self.now().timestamp_millis()
        }
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};
    use std::sync::Arc;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn test_arc_clock_delegates() {
        let clock: Arc<SystemClock> = Arc::new(SystemClock);
        assert!(clock.now_millis() > 1_600_000_000_000);
    }
}
