//! Weighted random selection.
//!
//! Pure functions over a candidate slice; no I/O and no stock checks. The
//! draw engine calls [`select`] once per attempt and removes the chosen
//! candidate from its pool afterwards.

use rand::Rng;
use stockgate_core::{Candidate, ItemId};

/// Sum of all weights, saturating at `u64::MAX`.
#[must_use]
pub fn total_weight(pool: &[Candidate]) -> u64 {
    pool.iter()
        .fold(0_u64, |total, candidate| total.saturating_add(candidate.weight))
}

/// Pick an index with probability proportional to its weight.
///
/// Returns `None` for an empty pool or a pool whose weights sum to zero.
/// Zero-weight candidates are never chosen.
pub fn select<R: Rng + ?Sized>(pool: &[Candidate], rng: &mut R) -> Option<usize> {
    let total = total_weight(pool);
    if total == 0 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)] // Exact below 2^53; see `select_clamped`
    let point = rng.gen_range(0.0..total as f64);
    select_clamped(pool, point)
}

/// [`select_at`], falling back to the last weighted candidate.
///
/// Above 2^53 the rounded running sum can end short of the rounded total,
/// leaving points in `[0, total)` that no candidate covers.
fn select_clamped(pool: &[Candidate], point: f64) -> Option<usize> {
    select_at(pool, point).or_else(|| pool.iter().rposition(|candidate| candidate.weight > 0))
}

/// Deterministic half of [`select`]: walk the cumulative weights and return
/// the first index whose running total is `>= point`.
///
/// A point exactly on a boundary belongs to the candidate that ends there.
/// Zero-weight candidates are skipped so they can never claim a boundary.
///
/// # Examples
///
/// ```
/// use stockgate_core::Candidate;
/// use stockgate_runtime::weighted::select_at;
///
/// let pool = [Candidate::new("a", 2), Candidate::new("b", 3)];
/// assert_eq!(select_at(&pool, 2.0), Some(0));
/// assert_eq!(select_at(&pool, 2.5), Some(1));
/// assert_eq!(select_at(&pool, 9.0), None);
/// ```
#[must_use]
pub fn select_at(pool: &[Candidate], point: f64) -> Option<usize> {
    let mut cumulative = 0.0_f64;

    for (index, candidate) in pool.iter().enumerate() {
        if candidate.weight == 0 {
            continue;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            cumulative += candidate.weight as f64;
        }
        if cumulative >= point {
            return Some(index);
        }
    }

    None
}

/// Theoretical selection share of every candidate, in pool order.
///
/// Shares sum to 1.0 unless every weight is zero, in which case all are 0.0.
#[must_use]
pub fn probabilities(pool: &[Candidate]) -> Vec<(ItemId, f64)> {
    let total = total_weight(pool);

    pool.iter()
        .map(|candidate| {
            #[allow(clippy::cast_precision_loss)]
            let share = if total == 0 {
                0.0
            } else {
                candidate.weight as f64 / total as f64
            };
            (candidate.item.clone(), share)
        })
        .collect()
}
