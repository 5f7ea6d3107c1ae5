//! Multi-winner weighted draws against live stock.
//!
//! A draw session fills `N` slots with distinct candidates. Each slot picks a
//! candidate by weight and tries to deduct one unit of its stock; if another
//! request took the last unit first, the candidate leaves the pool and the
//! slot is retried against whatever remains. If any slot cannot be filled,
//! every unit deducted by the session is given back before the error is
//! returned.
//!
//! # Cancellation
//!
//! Rollback runs inside the draw future. Dropping that future part-way
//! through a session leaves its deductions in place, so callers must drive
//! it to completion.

use crate::metrics::DrawMetrics;
use crate::stock_cache::StockCache;
use crate::weighted;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stockgate_core::environment::Clock;
use stockgate_core::store::{CounterStore, DurableStore};
use stockgate_core::{Candidate, DrawError, Floor, IncrOutcome, ItemId};
use std::sync::Arc;
use std::time::Instant;

/// Weighted multi-winner draw over a shared [`StockCache`].
///
/// Cheap to clone; clones share the cache.
pub struct DrawEngine<S, D, C> {
    cache: Arc<StockCache<S, D, C>>,
}

impl<S, D, C> Clone for DrawEngine<S, D, C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S, D, C> DrawEngine<S, D, C>
where
    S: CounterStore,
    D: DurableStore,
    C: Clock,
{
    /// Create an engine deducting from `cache`.
    #[must_use]
    pub const fn new(cache: Arc<StockCache<S, D, C>>) -> Self {
        Self { cache }
    }

    /// The cache this engine deducts from.
    #[must_use]
    pub fn cache(&self) -> &StockCache<S, D, C> {
        &self.cache
    }

    /// Draw `slots` distinct winners using an entropy-seeded RNG.
    ///
    /// Duplicate item ids in `candidates` are not merged; pass each item once.
    ///
    /// # Errors
    ///
    /// See [`draw_with_rng`](Self::draw_with_rng).
    pub async fn draw(
        &self,
        candidates: &[Candidate],
        slots: usize,
    ) -> Result<Vec<Candidate>, DrawError> {
        let mut rng = StdRng::from_entropy();
        self.draw_with_rng(candidates, slots, &mut rng).await
    }

    /// Draw `slots` distinct winners, choosing with `rng`.
    ///
    /// Winners are returned in slot order. Candidates with zero weight are
    /// ignored. `slots == 0` returns an empty list without touching stock.
    ///
    /// # Errors
    ///
    /// - [`DrawError::InsufficientCandidates`] when fewer in-stock candidates
    ///   remain than slots still to fill
    /// - [`DrawError::NoSelection`] when nothing can be selected
    /// - [`DrawError::RetriesExhausted`] when a slot loses more races than the
    ///   pool had candidates
    /// - [`DrawError::Stock`] on a counter store fault
    ///
    /// In every case the session's deductions have been rolled back.
    pub async fn draw_with_rng<R>(
        &self,
        candidates: &[Candidate],
        slots: usize,
        rng: &mut R,
    ) -> Result<Vec<Candidate>, DrawError>
    where
        R: Rng + Send + ?Sized,
    {
        if slots == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let mut session = Session::new(candidates, slots);

        match self.fill(&mut session, rng).await {
            Ok(()) => {
                DrawMetrics::record("won", started.elapsed());
                tracing::debug!(
                    slots,
                    winners = ?session.winners.iter().map(|c| c.item.as_str()).collect::<Vec<_>>(),
                    "Draw completed"
                );
                Ok(session.winners)
            }
            Err(error) => {
                let failures = self.rollback(&session.deducted).await;
                let outcome = if error.is_stock_unavailable() {
                    "out_of_stock"
                } else {
                    "error"
                };
                DrawMetrics::record(outcome, started.elapsed());

                tracing::warn!(
                    error = %error,
                    slots,
                    rolled_back = session.deducted.len(),
                    rollback_failures = failures,
                    "Draw failed"
                );
                Err(error)
            }
        }
    }

    async fn fill<R>(&self, session: &mut Session, rng: &mut R) -> Result<(), DrawError>
    where
        R: Rng + Send + ?Sized,
    {
        let retry_cap = session.pool.len();

        for slot in 1..=session.slots {
            let required = session.slots - slot + 1;
            let mut attempts = 0;

            loop {
                if session.pool.len() < required {
                    return Err(DrawError::InsufficientCandidates {
                        required,
                        available: session.pool.len(),
                    });
                }
                if attempts >= retry_cap {
                    return Err(DrawError::RetriesExhausted { slot });
                }
                attempts += 1;

                let index =
                    weighted::select(&session.pool, rng).ok_or(DrawError::NoSelection)?;
                let candidate = session.pool.remove(index);

                match self.cache.incr(&candidate.item, -1, Floor::ZERO).await? {
                    IncrOutcome::Applied { .. } => {
                        session.deducted.push(candidate.item.clone());
                        session.winners.push(candidate);
                        break;
                    }
                    IncrOutcome::Rejected => {
                        tracing::debug!(
                            item = %candidate.item,
                            slot,
                            attempts,
                            "Candidate sold out, retrying slot"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Give back one unit per deduction. Returns how many could not be restored.
    async fn rollback(&self, deducted: &[ItemId]) -> usize {
        let mut failures = 0;

        for item in deducted {
            if let Err(e) = self.cache.incr(item, 1, Floor::Unbounded).await {
                failures += 1;
                tracing::error!(error = %e, item = %item, "Failed to roll back draw deduction");
            }
        }

        if failures > 0 {
            DrawMetrics::record_rollback_failures(failures);
        }

        failures
    }
}

/// Mutable state of one draw.
struct Session {
    slots: usize,
    pool: Vec<Candidate>,
    deducted: Vec<ItemId>,
    winners: Vec<Candidate>,
}

impl Session {
    fn new(candidates: &[Candidate], slots: usize) -> Self {
        Self {
            slots,
            pool: candidates
                .iter()
                .filter(|candidate| candidate.weight > 0)
                .cloned()
                .collect(),
            deducted: Vec::with_capacity(slots),
            winners: Vec::with_capacity(slots),
        }
    }
}
