//! Error types for counter stores, the stock cache and the draw engine.
//!
//! Floor violations and partial batch failures are *outcomes*, not errors:
//! they are reported through [`IncrOutcome`](crate::IncrOutcome) and
//! [`BatchOutcome`](crate::BatchOutcome). Admission timeouts are reported as
//! `Ok(false)`. Only genuine faults and failed draws live here.

use thiserror::Error;

/// Errors raised by [`CounterStore`](crate::CounterStore) and
/// [`DurableStore`](crate::DurableStore) implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// The backend rejected or failed a command.
    #[error("Store command failed: {0}")]
    Command(String),

    /// A stored value could not be interpreted as an integer.
    #[error("Invalid value at {key}: {value}")]
    InvalidValue {
        /// Key (or `hash/field`) holding the bad value
        key: String,
        /// Raw value found
        value: String,
    },
}

/// Errors raised by the stock cache.
///
/// The cache never retries internally; callers choose their own policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Counter store fault.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Durable store fault during warm-up or persistence.
    #[error("Durable store error: {0}")]
    Durable(String),

    /// A change whose compensation cannot be represented (`i64::MIN`).
    ///
    /// Rejected before anything is written.
    #[error("Invalid stock change {delta} for item {item}")]
    InvalidDelta {
        /// Item the change was aimed at
        item: String,
        /// Requested change
        delta: i64,
    },
}

/// Result type alias for stock cache operations.
pub type Result<T> = std::result::Result<T, StockError>;

/// Reasons a draw session failed.
///
/// Whatever the variant, every deduction made during the failed session has
/// been compensated (or the compensation failure was logged) before the error
/// reaches the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DrawError {
    // ═══════════════════════════════════════════════════════════
    // Stock exhaustion
    // ═══════════════════════════════════════════════════════════

    /// Fewer distinct in-stock candidates remain than slots still required.
    #[error("Insufficient candidates: {required} slots required, {available} available")]
    InsufficientCandidates {
        /// Slots still to fill
        required: usize,
        /// Candidates left in the pool
        available: usize,
    },

    /// Weighted selection returned nothing (empty pool or zero total weight).
    #[error("No candidate could be selected")]
    NoSelection,

    /// A slot lost more races than the pool had candidates.
    #[error("Retries exhausted while filling slot {slot}")]
    RetriesExhausted {
        /// 1-based slot index
        slot: usize,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Stock cache fault (should not be exposed to users).
    #[error(transparent)]
    Stock(#[from] StockError),
}

impl DrawError {
    /// Returns `true` if the draw failed because stock ran out rather than
    /// because of an infrastructure fault.
    ///
    /// # Examples
    ///
    /// ```
    /// # use stockgate_core::DrawError;
    /// assert!(DrawError::NoSelection.is_stock_unavailable());
    /// ```
    #[must_use]
    pub const fn is_stock_unavailable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientCandidates { .. } | Self::NoSelection | Self::RetriesExhausted { .. }
        )
    }

    /// Message safe to show end users. Never contains internal detail.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        if self.is_stock_unavailable() {
            "Prizes are temporarily out of stock, please retry later"
        } else {
            "The draw could not be completed, please retry later"
        }
    }
}
