//! Cache-first stock counters with floor enforcement and deferred persistence.
//!
//! The counter store holds the live, sellable quantity of every item. All
//! hot-path changes go through [`StockCache::incr`] and
//! [`StockCache::batch_incr`]; the durable store only catches up when
//! [`StockCache::persist_sweep`] runs.
//!
//! # Floor enforcement
//!
//! A bounded change is **apply, check, compensate**:
//!
//! 1. `INCRBY key delta` (atomic, returns the new value)
//! 2. if the new value is below the floor, `INCRBY key -delta` and report
//!    [`IncrOutcome::Rejected`]
//!
//! Reading first and writing afterwards would race under concurrent callers;
//! with an atomic increment the counter can only dip below the floor for the
//! instant between the two commands, and nobody is ever told "applied" for
//! such a value.
//!
//! # Key layout
//!
//! ```text
//! {namespace}:stock:{id}    live quantity
//! {namespace}:updated       hash id -> last change (epoch ms)
//! {namespace}:persisted     hash id -> clock reading before last flush (epoch ms)
//! {namespace}:persisted-qty hash id -> value written by last flush
//! ```

use crate::metrics::names;
use stockgate_core::environment::Clock;
use stockgate_core::error::Result;
use stockgate_core::store::{CounterStore, DurableStore};
use stockgate_core::{
    BatchOutcome, DirtyMarker, Floor, IncrOutcome, ItemId, StockDelta, StockError,
};
use std::time::Instant;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Items with any dirty-marker entry
    pub examined: usize,
    /// Items written to the durable store
    pub flushed: usize,
    /// Stale items left stale: no live value, or the durable store refused
    pub skipped: usize,
    /// Stale items whose durable write failed
    pub failed: usize,
}

/// Live stock counters for one family of items.
///
/// Several caches (prizes, blind boxes, tickets) can share one counter store
/// as long as their namespaces differ.
///
/// # Example
///
/// ```no_run
/// use stockgate_core::Floor;
/// use stockgate_runtime::StockCache;
/// # use stockgate_core::{CounterStore, DurableStore, environment::Clock};
///
/// # async fn example(
/// #     counters: impl CounterStore,
/// #     durable: impl DurableStore,
/// #     clock: impl Clock,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let cache = StockCache::new("prize-stock", counters, durable, clock);
///
/// cache.seed(&42_u64.into(), 10).await?;
/// let outcome = cache.incr(&42_u64.into(), -1, Floor::ZERO).await?;
/// assert!(outcome.is_applied());
/// # Ok(())
/// # }
/// ```
pub struct StockCache<S, D, C> {
    namespace: String,
    counters: S,
    durable: D,
    clock: C,
}

impl<S, D, C> StockCache<S, D, C>
where
    S: CounterStore,
    D: DurableStore,
    C: Clock,
{
    /// Create a cache over the given stores.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Key prefix, e.g. `"prize-stock"`
    /// * `counters` - Atomic counter store holding live values
    /// * `durable` - Authoritative store the sweep writes to
    /// * `clock` - Time source for dirty markers
    #[must_use]
    pub fn new(namespace: impl Into<String>, counters: S, durable: D, clock: C) -> Self {
        Self {
            namespace: namespace.into(),
            counters,
            durable,
            clock,
        }
    }

    /// Key prefix of this cache.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Counter store key holding `item`'s live quantity.
    #[must_use]
    pub fn counter_key(&self, item: &ItemId) -> String {
        format!("{}:stock:{item}", self.namespace)
    }

    fn updated_hash(&self) -> String {
        format!("{}:updated", self.namespace)
    }

    fn persisted_hash(&self) -> String {
        format!("{}:persisted", self.namespace)
    }

    fn persisted_quantity_hash(&self) -> String {
        format!("{}:persisted-qty", self.namespace)
    }

    // ========================================================================
    // Seeding and reads
    // ========================================================================

    /// Unconditionally set the live counter for `item`.
    ///
    /// Overwrites any existing value, so it must not race with live
    /// deductions against the same item.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the counter store fails.
    pub async fn seed(&self, item: &ItemId, quantity: i64) -> Result<()> {
        self.counters.set(&self.counter_key(item), quantity).await?;

        tracing::info!(
            namespace = %self.namespace,
            item = %item,
            quantity,
            "Seeded stock counter"
        );

        Ok(())
    }

    /// Read the live counter. `None` if never seeded or removed.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the counter store fails.
    pub async fn get(&self, item: &ItemId) -> Result<Option<i64>> {
        Ok(self.counters.get(&self.counter_key(item)).await?)
    }

    /// Seed every item from the durable store without clobbering live values.
    ///
    /// Uses set-if-absent, so counters that already exist (and may hold
    /// deductions not yet persisted) are left alone. Returns how many
    /// counters were created.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Durable`] if loading fails, or
    /// [`StockError::Store`] if the counter store fails.
    pub async fn warm_up(&self) -> Result<usize> {
        let levels = self
            .durable
            .load_all()
            .await
            .map_err(|e| StockError::Durable(e.to_string()))?;

        let mut seeded = 0;
        for level in &levels {
            if self
                .counters
                .set_if_absent(&self.counter_key(&level.item), level.quantity)
                .await?
            {
                seeded += 1;
            }
        }

        tracing::info!(
            namespace = %self.namespace,
            loaded = levels.len(),
            seeded,
            "Stock cache warmed up"
        );

        Ok(seeded)
    }

    // ========================================================================
    // Counter changes
    // ========================================================================

    /// Atomically apply `delta` to `item`, enforcing `floor`.
    ///
    /// On success the item is marked dirty. A change that would leave the
    /// counter below `floor` is compensated and reported as
    /// [`IncrOutcome::Rejected`]. [`Floor::Unbounded`] always applies.
    ///
    /// Failing to record the dirty marker after a successful change is
    /// logged, not returned: the change itself has already happened and the
    /// caller must be told so.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the increment or its compensation
    /// fails, or [`StockError::InvalidDelta`] for a `delta` of `i64::MIN`.
    pub async fn incr(&self, item: &ItemId, delta: i64, floor: Floor) -> Result<IncrOutcome> {
        let outcome = self.apply(item, delta, floor).await?;

        if outcome.is_applied() {
            self.mark_updated(std::slice::from_ref(item)).await;
        }

        Ok(outcome)
    }

    /// Like [`incr`](Self::incr), but leaves the dirty marker untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the increment or its compensation
    /// fails, or [`StockError::InvalidDelta`] for a `delta` of `i64::MIN`.
    pub async fn incr_untracked(
        &self,
        item: &ItemId,
        delta: i64,
        floor: Floor,
    ) -> Result<IncrOutcome> {
        self.apply(item, delta, floor).await
    }

    /// Apply every entry, or none of them.
    ///
    /// Entries apply in order. At the first entry that hits its floor, every
    /// entry already applied in this batch is compensated and
    /// [`BatchOutcome::Rejected`] names the failing item. On success all
    /// items are marked dirty together.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the counter store fails, or
    /// [`StockError::InvalidDelta`] for an entry of `i64::MIN`. Entries
    /// applied before the failure are compensated on a best-effort basis.
    pub async fn batch_incr(&self, entries: &[StockDelta]) -> Result<BatchOutcome> {
        match self.apply_batch(entries).await? {
            Ok(results) => {
                let items: Vec<ItemId> = results.iter().map(|(item, _)| item.clone()).collect();
                self.mark_updated(&items).await;
                Ok(BatchOutcome::Applied(results))
            }
            Err(item) => Ok(BatchOutcome::Rejected { item }),
        }
    }

    /// Apply a batch now and decide later whether to keep it.
    ///
    /// Returns `None` (with nothing applied) if any entry hits its floor.
    /// The returned reservation must be finished with
    /// [`StockReservation::commit`] or [`StockReservation::rollback`].
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the counter store fails.
    pub async fn reserve(
        &self,
        entries: Vec<StockDelta>,
    ) -> Result<Option<StockReservation<'_, S, D, C>>> {
        match self.apply_batch(&entries).await? {
            Ok(results) => Ok(Some(StockReservation {
                cache: self,
                entries,
                results,
                finished: false,
            })),
            Err(_) => Ok(None),
        }
    }

    /// Delete the live counter and dirty markers of a removed item.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the counter store fails.
    pub async fn remove(&self, item: &ItemId) -> Result<()> {
        self.counters.del(&self.counter_key(item)).await?;
        self.counters
            .hdel(&self.updated_hash(), item.as_str())
            .await?;
        self.counters
            .hdel(&self.persisted_hash(), item.as_str())
            .await?;
        self.counters
            .hdel(&self.persisted_quantity_hash(), item.as_str())
            .await?;

        tracing::info!(namespace = %self.namespace, item = %item, "Removed stock counter");

        Ok(())
    }

    async fn apply(&self, item: &ItemId, delta: i64, floor: Floor) -> Result<IncrOutcome> {
        let Some(undo) = delta.checked_neg() else {
            tracing::warn!(item = %item, delta, "Rejected stock change with no compensation");
            return Err(StockError::InvalidDelta {
                item: item.to_string(),
                delta,
            });
        };

        let key = self.counter_key(item);
        let value = self.counters.incr_by(&key, delta).await?;

        if floor.is_violated_by(value) {
            if let Err(e) = self.counters.incr_by(&key, undo).await {
                tracing::error!(
                    error = %e,
                    item = %item,
                    delta,
                    value,
                    "Failed to compensate counter below its floor"
                );
                return Err(e.into());
            }

            metrics::counter!(names::STOCK_INCR_TOTAL, "outcome" => "rejected").increment(1);
            tracing::debug!(
                namespace = %self.namespace,
                item = %item,
                delta,
                floor = ?floor,
                "Stock change rejected at floor"
            );
            return Ok(IncrOutcome::Rejected);
        }

        metrics::counter!(names::STOCK_INCR_TOTAL, "outcome" => "applied").increment(1);
        tracing::debug!(
            namespace = %self.namespace,
            item = %item,
            delta,
            value,
            "Stock counter changed"
        );

        Ok(IncrOutcome::Applied { value })
    }

    /// Apply entries untracked; `Err(item)` means `item` hit its floor and
    /// everything before it was compensated.
    async fn apply_batch(
        &self,
        entries: &[StockDelta],
    ) -> Result<std::result::Result<Vec<(ItemId, i64)>, ItemId>> {
        let mut applied: Vec<&StockDelta> = Vec::with_capacity(entries.len());
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            match self.apply(&entry.item, entry.delta, entry.floor).await {
                Ok(IncrOutcome::Applied { value }) => {
                    applied.push(entry);
                    results.push((entry.item.clone(), value));
                }
                Ok(IncrOutcome::Rejected) => {
                    self.compensate(applied.into_iter()).await;
                    tracing::warn!(
                        namespace = %self.namespace,
                        item = %entry.item,
                        entries = entries.len(),
                        "Batch stock change rejected"
                    );
                    return Ok(Err(entry.item.clone()));
                }
                Err(e) => {
                    self.compensate(applied.into_iter()).await;
                    return Err(e);
                }
            }
        }

        Ok(Ok(results))
    }

    /// Undo applied entries. Returns how many compensations failed.
    async fn compensate<'e>(&self, applied: impl Iterator<Item = &'e StockDelta>) -> usize {
        let mut failures = 0;

        for entry in applied {
            // Applied entries passed the same check in `apply`
            let Some(undo) = entry.compensation() else {
                failures += 1;
                continue;
            };
            metrics::counter!(names::STOCK_COMPENSATIONS_TOTAL).increment(1);

            if let Err(e) = self.apply(&undo.item, undo.delta, undo.floor).await {
                failures += 1;
                tracing::error!(
                    error = %e,
                    item = %undo.item,
                    delta = undo.delta,
                    "Failed to compensate batch entry"
                );
            }
        }

        failures
    }

    // ========================================================================
    // Dirty tracking and persistence
    // ========================================================================

    async fn mark_updated(&self, items: &[ItemId]) {
        let now = self.clock.now_millis();
        let hash = self.updated_hash();

        for item in items {
            if let Err(e) = self.counters.hset(&hash, item.as_str(), now).await {
                tracing::error!(
                    error = %e,
                    item = %item,
                    "Failed to record stock update time"
                );
            }
        }
    }

    /// Read the update/persist bookkeeping of `item`.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the counter store fails.
    pub async fn dirty_marker(&self, item: &ItemId) -> Result<DirtyMarker> {
        Ok(DirtyMarker {
            updated_at: self
                .counters
                .hget(&self.updated_hash(), item.as_str())
                .await?,
            persisted_at: self
                .counters
                .hget(&self.persisted_hash(), item.as_str())
                .await?,
            persisted_quantity: self
                .counters
                .hget(&self.persisted_quantity_hash(), item.as_str())
                .await?,
        })
    }

    /// Flush every stale item to the durable store.
    ///
    /// Meant to run on a schedule, independent of request traffic. Durable
    /// store failures are counted and the sweep moves on; the item stays
    /// stale and is retried next time. A second sweep with no changes in
    /// between writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] if the counter store fails.
    pub async fn persist_sweep(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let updated = self.counters.hgetall(&self.updated_hash()).await?;
        let persisted = self.counters.hgetall(&self.persisted_hash()).await?;
        let quantities = self
            .counters
            .hgetall(&self.persisted_quantity_hash())
            .await?;

        let mut report = SweepReport::default();

        for (field, updated_at) in updated {
            report.examined += 1;

            let marker = DirtyMarker {
                updated_at: Some(updated_at),
                persisted_at: persisted.get(&field).copied(),
                persisted_quantity: quantities.get(&field).copied(),
            };

            match self.flush(&ItemId::new(field), marker).await {
                Ok(Flush::Clean) => {}
                Ok(Flush::Written) => report.flushed += 1,
                Ok(Flush::Skipped) => report.skipped += 1,
                Err(StockError::Durable(_)) => report.failed += 1,
                Err(e) => return Err(e),
            }
        }

        metrics::counter!(names::PERSIST_FLUSHED_TOTAL).increment(report.flushed as u64);
        metrics::histogram!(names::PERSIST_SWEEP_DURATION).record(started.elapsed().as_secs_f64());

        if report.flushed > 0 || report.failed > 0 {
            tracing::info!(
                namespace = %self.namespace,
                examined = report.examined,
                flushed = report.flushed,
                skipped = report.skipped,
                failed = report.failed,
                "Persist sweep finished"
            );
        }

        Ok(report)
    }

    /// Flush one item immediately if it is stale.
    ///
    /// Used after an out-of-band restock so the durable value catches up
    /// without waiting for the next sweep. Returns `true` if a write happened.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Store`] or [`StockError::Durable`] on failure.
    pub async fn persist_one(&self, item: &ItemId) -> Result<bool> {
        let marker = self.dirty_marker(item).await?;
        Ok(matches!(self.flush(item, marker).await?, Flush::Written))
    }

    async fn flush(&self, item: &ItemId, marker: DirtyMarker) -> Result<Flush> {
        // Read before the live value so later changes compare as newer
        let snapshot = self.clock.now_millis();

        let Some(quantity) = self.counters.get(&self.counter_key(item)).await? else {
            if marker.updated_at.is_some() {
                tracing::debug!(item = %item, "Changed item has no live counter, skipping");
                return Ok(Flush::Skipped);
            }
            return Ok(Flush::Clean);
        };

        if !marker.is_stale(quantity) {
            return Ok(Flush::Clean);
        }

        let written = self
            .durable
            .update_quantity(item, quantity)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, item = %item, quantity, "Durable stock update failed");
                StockError::Durable(e.to_string())
            })?;

        if !written {
            tracing::warn!(item = %item, quantity, "Durable store did not update stock row");
            return Ok(Flush::Skipped);
        }

        self.counters
            .hset(&self.persisted_quantity_hash(), item.as_str(), quantity)
            .await?;
        self.counters
            .hset(&self.persisted_hash(), item.as_str(), snapshot)
            .await?;

        Ok(Flush::Written)
    }
}

/// What a flush did with one item.
enum Flush {
    /// Durable value already matches
    Clean,
    /// Live value written
    Written,
    /// Left stale: no live value, or the durable store refused
    Skipped,
}

/// A batch change applied to the live counters but not yet committed.
///
/// Finish it with [`commit`](Self::commit) to keep the change (and mark the
/// items dirty) or [`rollback`](Self::rollback) to undo it. Compensation is
/// async and cannot run from `Drop`; dropping an unfinished reservation only
/// logs a warning and leaves the stock deducted.
#[must_use = "a reservation must be committed or rolled back"]
pub struct StockReservation<'a, S, D, C>
where
    S: CounterStore,
    D: DurableStore,
    C: Clock,
{
    cache: &'a StockCache<S, D, C>,
    entries: Vec<StockDelta>,
    results: Vec<(ItemId, i64)>,
    finished: bool,
}

impl<S, D, C> StockReservation<'_, S, D, C>
where
    S: CounterStore,
    D: DurableStore,
    C: Clock,
{
    /// New counter values, in entry order.
    #[must_use]
    pub fn results(&self) -> &[(ItemId, i64)] {
        &self.results
    }

    /// Keep the change and mark every item dirty.
    pub async fn commit(mut self) -> Vec<(ItemId, i64)> {
        self.finished = true;
        let items: Vec<ItemId> = self.entries.iter().map(|e| e.item.clone()).collect();
        self.cache.mark_updated(&items).await;
        std::mem::take(&mut self.results)
    }

    /// Undo the change.
    ///
    /// Returns the number of entries whose compensation failed (logged).
    pub async fn rollback(mut self) -> usize {
        self.finished = true;
        let entries = std::mem::take(&mut self.entries);
        self.cache.compensate(entries.iter()).await
    }
}

impl<S, D, C> Drop for StockReservation<'_, S, D, C>
where
    S: CounterStore,
    D: DurableStore,
    C: Clock,
{
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                namespace = %self.cache.namespace,
                entries = self.entries.len(),
                "Stock reservation dropped without commit or rollback"
            );
        }
    }
}
