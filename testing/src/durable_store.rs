//! In-memory durable store for testing.

use stockgate_core::store::{DurableStore, StoreResult};
use stockgate_core::{ItemId, StockLevel, StoreError};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<ItemId, i64>,
    refused: HashSet<ItemId>,
    writes: Vec<(ItemId, i64)>,
    offline: bool,
}

/// In-memory [`DurableStore`] that records every write.
///
/// `update_quantity` behaves like a conditional single-row update: it
/// returns `false` for unknown items and for items marked with
/// [`refuse_updates`](Self::refuse_updates).
#[derive(Debug, Clone, Default)]
pub struct InMemoryDurableStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryDurableStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rows.
    #[must_use]
    pub fn with_levels(levels: impl IntoIterator<Item = StockLevel>) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state
                .rows
                .extend(levels.into_iter().map(|level| (level.item, level.quantity)));
        }
        store
    }

    /// Insert or overwrite a row directly.
    pub fn insert(&self, item: impl Into<ItemId>, quantity: i64) {
        if let Ok(mut state) = self.state.lock() {
            state.rows.insert(item.into(), quantity);
        }
    }

    /// Make `update_quantity` report `false` for `item`.
    pub fn refuse_updates(&self, item: impl Into<ItemId>) {
        if let Ok(mut state) = self.state.lock() {
            state.refused.insert(item.into());
        }
    }

    /// Simulate the database being unreachable.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.offline = offline;
        }
    }

    /// Quantity on record for `item`.
    #[must_use]
    pub fn quantity(&self, item: &ItemId) -> Option<i64> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.rows.get(item).copied())
    }

    /// Every successful write, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(ItemId, i64)> {
        self.state
            .lock()
            .map(|state| state.writes.clone())
            .unwrap_or_default()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.lock().map(|state| state.writes.len()).unwrap_or(0)
    }
}

impl DurableStore for InMemoryDurableStore {
    async fn load_all(&self) -> StoreResult<Vec<StockLevel>> {
        let state = self
            .state
            .lock()
            .map_err(|_| StoreError::Command("Mutex lock failed".into()))?;

        if state.offline {
            return Err(StoreError::Connection("in-memory database offline".into()));
        }

        Ok(state
            .rows
            .iter()
            .map(|(item, quantity)| StockLevel::new(item.clone(), *quantity))
            .collect())
    }

    async fn update_quantity(&self, item: &ItemId, quantity: i64) -> StoreResult<bool> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Command("Mutex lock failed".into()))?;

        if state.offline {
            return Err(StoreError::Connection("in-memory database offline".into()));
        }

        if state.refused.contains(item) {
            return Ok(false);
        }

        match state.rows.get_mut(item) {
            Some(row) => {
                *row = quantity;
                state.writes.push((item.clone(), quantity));
                tracing::debug!(item = %item, quantity, "Mock durable store updated");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_only_touches_known_rows() {
        let store = InMemoryDurableStore::with_levels([StockLevel::new("a", 5)]);

        assert!(store.update_quantity(&"a".into(), 3).await.unwrap());
        assert!(!store.update_quantity(&"missing".into(), 3).await.unwrap());

        assert_eq!(store.quantity(&"a".into()), Some(3));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_updates_are_not_recorded() {
        let store = InMemoryDurableStore::with_levels([StockLevel::new("a", 5)]);
        store.refuse_updates("a");

        assert!(!store.update_quantity(&"a".into(), 1).await.unwrap());
        assert_eq!(store.quantity(&"a".into()), Some(5));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_load_all_fails_when_offline() {
        let store = InMemoryDurableStore::new();
        store.insert("a", 1);
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        store.set_offline(true);
        assert!(store.load_all().await.is_err());
    }

    #[test]
    fn test_clones_share_rows() {
        let store = InMemoryDurableStore::new();
        let handle = store.clone();
        store.insert("a", 2);

        let updated = tokio_test::block_on(handle.update_quantity(&"a".into(), 1)).unwrap();

        assert!(updated);
        assert_eq!(store.quantity(&"a".into()), Some(1));
    }
}
