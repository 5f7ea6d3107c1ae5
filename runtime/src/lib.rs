//! # Stockgate Runtime
//!
//! Concurrency engine for selling strictly limited stock.
//!
//! ## Core Components
//!
//! - [`StockCache`]: atomic, floor-bounded counters with dirty tracking and
//!   deferred persistence
//! - [`DrawEngine`]: weighted multi-winner draws with full rollback
//! - [`AdmissionGate`]: distributed cap on concurrent requests
//! - [`PersistScheduler`]: periodic write-back of dirty counters
//!
//! ## Example
//!
//! ```ignore
//! use stockgate_runtime::{AdmissionGate, DrawEngine, StockCache};
//!
//! let cache = Arc::new(StockCache::new("prize-stock", counters.clone(), durable, SystemClock));
//! let engine = DrawEngine::new(Arc::clone(&cache));
//! let gate = AdmissionGate::new(counters, AdmissionConfig::default());
//!
//! let limits = gate.limits().await?;
//! let admission = gate
//!     .admit("draw", limits.queue_size, limits.max_wait, engine.draw(&candidates, 1))
//!     .await?;
//! ```

/// Distributed admission gate
pub mod admission;

/// Environment-driven configuration
pub mod config;

/// Weighted multi-winner draws
pub mod draw;

/// Prometheus metrics for observability
pub mod metrics;

/// Background persistence
pub mod scheduler;

/// Cache-first stock counters
pub mod stock_cache;

/// Weighted random selection
pub mod weighted;

pub use admission::{Admission, AdmissionConfig, AdmissionGate, AdmissionLimits};
pub use config::EngineConfig;
pub use draw::DrawEngine;
pub use scheduler::{PersistScheduler, PersistSchedulerHandle};
pub use stock_cache::{StockCache, StockReservation, SweepReport};
