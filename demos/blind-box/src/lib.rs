//! Blind-box shop built on the stockgate engine.
//!
//! Opening a box:
//!
//! 1. pass the admission gate
//! 2. reserve one unit of the box
//! 3. draw prizes from the ones still in stock
//! 4. commit the box reservation, or roll it back if the draw failed

use std::sync::Arc;
use stockgate_core::environment::Clock;
use stockgate_core::store::{CounterStore, DurableStore};
use stockgate_core::{Candidate, DrawError, ItemId, StockDelta, StockError};
use stockgate_runtime::{Admission, AdmissionGate, DrawEngine, StockCache};
use thiserror::Error;

/// Errors from the shop.
#[derive(Debug, Error)]
pub enum ShopError {
    /// Stock or admission store fault
    #[error(transparent)]
    Stock(#[from] StockError),

    /// Draw failed for a reason other than running out of prizes
    #[error(transparent)]
    Draw(#[from] DrawError),
}

/// What a customer got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purchase {
    /// Box opened; these prizes were won
    Opened(Vec<Candidate>),
    /// No boxes of this kind left
    BoxSoldOut,
    /// Not enough prizes left to fill the box; the box was not sold
    PrizesExhausted,
    /// Too many customers right now
    Busy,
}

/// Blind-box storefront.
pub struct BlindBoxShop<S, D, C> {
    boxes: Arc<StockCache<S, D, C>>,
    prizes: DrawEngine<S, D, C>,
    gate: AdmissionGate<S>,
    queue: String,
}

impl<S, D, C> BlindBoxShop<S, D, C>
where
    S: CounterStore,
    D: DurableStore,
    C: Clock,
{
    /// Assemble a shop from its parts.
    #[must_use]
    pub fn new(
        boxes: Arc<StockCache<S, D, C>>,
        prizes: DrawEngine<S, D, C>,
        gate: AdmissionGate<S>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            boxes,
            prizes,
            gate,
            queue: queue.into(),
        }
    }

    /// Sell one `box_id` and draw `slots` distinct prizes from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError`] on store faults. Running out of boxes or prizes
    /// and a busy gate are ordinary [`Purchase`] outcomes.
    pub async fn open(
        &self,
        box_id: &ItemId,
        pool: &[Candidate],
        slots: usize,
    ) -> Result<Purchase, ShopError> {
        let limits = self.gate.limits().await?;

        let admission = self
            .gate
            .admit(
                &self.queue,
                limits.queue_size,
                limits.max_wait,
                self.open_admitted(box_id, pool, slots),
            )
            .await?;

        match admission {
            Admission::Admitted(purchase) => purchase,
            Admission::Busy => {
                tracing::info!(box_id = %box_id, "Shop busy");
                Ok(Purchase::Busy)
            }
        }
    }

    async fn open_admitted(
        &self,
        box_id: &ItemId,
        pool: &[Candidate],
        slots: usize,
    ) -> Result<Purchase, ShopError> {
        let candidates = self.in_stock(pool).await?;

        let Some(reservation) = self
            .boxes
            .reserve(vec![StockDelta::deduct(box_id.clone(), 1)])
            .await?
        else {
            return Ok(Purchase::BoxSoldOut);
        };

        match self.prizes.draw(&candidates, slots).await {
            Ok(winners) => {
                reservation.commit().await;
                tracing::info!(
                    box_id = %box_id,
                    prizes = ?winners.iter().map(|c| c.item.as_str()).collect::<Vec<_>>(),
                    "Box opened"
                );
                Ok(Purchase::Opened(winners))
            }
            Err(error) => {
                reservation.rollback().await;
                if error.is_stock_unavailable() {
                    Ok(Purchase::PrizesExhausted)
                } else {
                    Err(error.into())
                }
            }
        }
    }

    /// Candidates whose live stock is positive.
    async fn in_stock(&self, pool: &[Candidate]) -> Result<Vec<Candidate>, StockError> {
        let mut candidates = Vec::with_capacity(pool.len());
        for candidate in pool {
            if self
                .prizes
                .cache()
                .get(&candidate.item)
                .await?
                .is_some_and(|left| left > 0)
            {
                candidates.push(candidate.clone());
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::time::Duration;
    use stockgate_runtime::AdmissionConfig;
    use stockgate_testing::{InMemoryCounterStore, InMemoryDurableStore, ManualClock};

    type TestShop = BlindBoxShop<InMemoryCounterStore, InMemoryDurableStore, ManualClock>;

    async fn shop(boxes: i64, prizes: &[(&str, i64)]) -> (TestShop, InMemoryCounterStore) {
        let counters = InMemoryCounterStore::new();
        let durable = InMemoryDurableStore::new();
        let clock = ManualClock::default();

        let box_cache = StockCache::new("blind-stock", counters.clone(), durable.clone(), clock.clone());
        box_cache.seed(&"box".into(), boxes).await.unwrap();

        let prize_cache = StockCache::new("prize-stock", counters.clone(), durable, clock);
        for (item, quantity) in prizes {
            prize_cache.seed(&(*item).into(), *quantity).await.unwrap();
        }

        let gate = AdmissionGate::new(
            counters.clone(),
            AdmissionConfig {
                key_prefix: "shop".into(),
                min_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        );

        let shop = BlindBoxShop::new(
            Arc::new(box_cache),
            DrawEngine::new(Arc::new(prize_cache)),
            gate,
            "open-box",
        );
        (shop, counters)
    }

    fn pool() -> Vec<Candidate> {
        vec![Candidate::new("gold", 1), Candidate::new("silver", 10)]
    }

    #[tokio::test]
    async fn test_open_deducts_box_and_prize() {
        let (shop, counters) = shop(2, &[("gold", 1), ("silver", 1)]).await;

        let purchase = shop.open(&"box".into(), &pool(), 1).await.unwrap();

        assert!(matches!(purchase, Purchase::Opened(ref prizes) if prizes.len() == 1));
        assert_eq!(counters.value("blind-stock:stock:box"), Some(1));
        let left = counters.value("prize-stock:stock:gold").unwrap()
            + counters.value("prize-stock:stock:silver").unwrap();
        assert_eq!(left, 1);
        assert_eq!(counters.value("shop:in-flight:open-box"), Some(0));
    }

    #[tokio::test]
    async fn test_sold_out_box() {
        let (shop, _) = shop(0, &[("gold", 1)]).await;
        let purchase = shop.open(&"box".into(), &pool(), 1).await.unwrap();
        assert_eq!(purchase, Purchase::BoxSoldOut);
    }

    #[tokio::test]
    async fn test_prize_shortage_returns_the_box() {
        let (shop, counters) = shop(1, &[("gold", 1), ("silver", 0)]).await;

        let purchase = shop.open(&"box".into(), &pool(), 2).await.unwrap();

        assert_eq!(purchase, Purchase::PrizesExhausted);
        assert_eq!(counters.value("blind-stock:stock:box"), Some(1));
        assert_eq!(counters.value("prize-stock:stock:gold"), Some(1));
    }
}
