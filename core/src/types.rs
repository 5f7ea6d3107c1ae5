//! Domain types shared by the stock cache, draw engine and store backends.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identity
// ============================================================================

/// Identity of a stock item.
///
/// Items are keyed by either integer primary keys or string codes; both are
/// stored verbatim as the suffix of the counter key and as hash fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create an item id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u32> for ItemId {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for ItemId {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

/// Authoritative quantity of one item as exchanged with the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    /// Item identity
    pub item: ItemId,
    /// Quantity on record
    pub quantity: i64,
}

impl StockLevel {
    /// Create a stock level.
    #[must_use]
    pub fn new(item: impl Into<ItemId>, quantity: i64) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}

// ============================================================================
// Counter arguments and outcomes
// ============================================================================

/// Lower bound enforced by a counter change.
///
/// `Floor::Unbounded` skips the check entirely and is what restocks and
/// rollbacks use, since they must always succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Floor {
    /// The value after the change must be `>=` this bound.
    AtLeast(i64),
    /// No bound.
    #[default]
    Unbounded,
}

impl Floor {
    /// Floor of zero: the usual oversell boundary.
    pub const ZERO: Self = Self::AtLeast(0);

    /// Bounded floor at `value`.
    #[must_use]
    pub const fn at(value: i64) -> Self {
        Self::AtLeast(value)
    }

    /// Returns `true` if `value` violates this floor.
    #[must_use]
    pub const fn is_violated_by(self, value: i64) -> bool {
        match self {
            Self::AtLeast(bound) => value < bound,
            Self::Unbounded => false,
        }
    }
}

impl From<Option<i64>> for Floor {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Unbounded, Self::AtLeast)
    }
}

/// One entry of a batch counter change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDelta {
    /// Item to change
    pub item: ItemId,
    /// Signed change (negative to deduct)
    pub delta: i64,
    /// Bound the resulting value must respect
    pub floor: Floor,
}

impl StockDelta {
    /// Create a batch entry.
    #[must_use]
    pub fn new(item: impl Into<ItemId>, delta: i64, floor: Floor) -> Self {
        Self {
            item: item.into(),
            delta,
            floor,
        }
    }

    /// Deduct `quantity` units, never going below zero.
    #[must_use]
    pub fn deduct(item: impl Into<ItemId>, quantity: u32) -> Self {
        Self::new(item, -i64::from(quantity), Floor::ZERO)
    }

    /// The entry that undoes this one.
    ///
    /// `None` when `delta` is `i64::MIN`, which has no negation.
    #[must_use]
    pub fn compensation(&self) -> Option<Self> {
        Some(Self {
            item: self.item.clone(),
            delta: self.delta.checked_neg()?,
            floor: Floor::Unbounded,
        })
    }
}

/// Outcome of a single bounded counter change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrOutcome {
    /// The change stuck; `value` is the counter after it.
    Applied {
        /// New counter value
        value: i64,
    },
    /// The change would have crossed the floor and was compensated.
    Rejected,
}

impl IncrOutcome {
    /// Returns `true` if the change was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// New counter value, or `0` for a rejected change.
    #[must_use]
    pub const fn value(&self) -> i64 {
        match self {
            Self::Applied { value } => *value,
            Self::Rejected => 0,
        }
    }
}

/// Outcome of an all-or-nothing batch counter change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every entry applied; new values in entry order.
    Applied(Vec<(ItemId, i64)>),
    /// `item` hit its floor; every earlier entry has been compensated.
    Rejected {
        /// First entry that failed its floor check
        item: ItemId,
    },
}

impl BatchOutcome {
    /// Returns `true` if the whole batch applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// New values in entry order; empty for a rejected batch.
    #[must_use]
    pub fn results(&self) -> &[(ItemId, i64)] {
        match self {
            Self::Applied(results) => results,
            Self::Rejected { .. } => &[],
        }
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Update and persist bookkeeping for one item.
///
/// Timestamps are epoch milliseconds. `persisted_at` is read from the clock
/// *before* the live value is fetched for a flush, so a change racing the
/// flush is never stamped as older than it. Two changes in the same
/// millisecond as a flush cannot be ordered by time alone, which is what
/// `persisted_quantity` is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirtyMarker {
    /// Last successful change of the live counter
    pub updated_at: Option<i64>,
    /// Clock reading taken just before the last successful flush
    pub persisted_at: Option<i64>,
    /// Live value written by the last successful flush
    pub persisted_quantity: Option<i64>,
}

impl DirtyMarker {
    /// Returns `true` if the timestamps alone show an unpersisted change.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        match (self.updated_at, self.persisted_at) {
            (Some(updated), Some(persisted)) => updated > persisted,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Returns `true` if an item whose live counter reads `live` must be
    /// flushed: it changed after the last flush, or it holds a value other
    /// than the one last written.
    ///
    /// Items that were never changed through the cache are never stale.
    #[must_use]
    pub fn is_stale(&self, live: i64) -> bool {
        self.updated_at.is_some() && (self.is_dirty() || self.persisted_quantity != Some(live))
    }
}

// ============================================================================
// Draw candidates
// ============================================================================

/// A stock item eligible for a weighted draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Item backing the candidate
    pub item: ItemId,
    /// Effective selection weight; zero means never selected
    pub weight: u64,
}

impl Candidate {
    /// Create a candidate with an explicit weight.
    #[must_use]
    pub fn new(item: impl Into<ItemId>, weight: u64) -> Self {
        Self {
            item: item.into(),
            weight,
        }
    }

    /// Create a candidate whose weight is `weight * multiplier`, saturating.
    ///
    /// Wheel sections multiply the prize weight by a section factor.
    #[must_use]
    pub fn scaled(item: impl Into<ItemId>, weight: u64, multiplier: u64) -> Self {
        Self::new(item, weight.saturating_mul(multiplier))
    }
}
