//! In-memory counter store for testing.

use stockgate_core::StoreError;
use stockgate_core::store::{CounterStore, StoreResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, i64>,
    hashes: HashMap<String, HashMap<String, i64>>,
    deadlines: HashMap<String, Instant>,
}

impl State {
    /// Drop `key` if its TTL has elapsed.
    fn evict_expired(&mut self, key: &str) {
        if self
            .deadlines
            .get(key)
            .is_some_and(|deadline| Instant::now() >= *deadline)
        {
            self.deadlines.remove(key);
            self.values.remove(key);
            self.hashes.remove(key);
        }
    }
}

/// In-memory [`CounterStore`] for testing.
///
/// Every operation takes a single mutex, so each call is atomic exactly like
/// a single Redis command. Clones share the same data, which lets a test hand
/// one clone to the component under test and inspect state through another.
///
/// # Failure injection
///
/// - [`set_offline`](Self::set_offline) makes every call fail with
///   [`StoreError::Connection`]
/// - [`fail_after`](Self::fail_after) lets the next `n` calls succeed and
///   fails every call after that
/// - [`fail_key`](Self::fail_key) fails every call touching one key
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    state: Arc<Mutex<State>>,
    offline: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    fail_after: Arc<Mutex<Option<usize>>>,
    failing_keys: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Allow `n` more calls, then fail every subsequent call.
    pub fn fail_after(&self, n: usize) {
        if let Ok(mut guard) = self.fail_after.lock() {
            *guard = Some(self.calls.load(Ordering::SeqCst) + n);
        }
    }

    /// Fail every call whose key (or hash name) is `key`.
    pub fn fail_key(&self, key: &str) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.to_string());
        }
    }

    /// Stop failing calls for `key`.
    pub fn heal_key(&self, key: &str) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.remove(key);
        }
    }

    /// Total number of calls made against the store.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Read a plain key without going through the async trait.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<i64> {
        self.state
            .lock()
            .ok()
            .and_then(|mut state| {
                state.evict_expired(key);
                state.values.get(key).copied()
            })
    }

    /// Read a hash without going through the async trait.
    #[must_use]
    pub fn hash(&self, hash: &str) -> HashMap<String, i64> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.hashes.get(hash).cloned())
            .unwrap_or_default()
    }

    /// Record a call and lock the state, failing if the store is down.
    fn begin(&self, key: &str) -> StoreResult<MutexGuard<'_, State>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("in-memory store offline".into()));
        }

        let limit = *self
            .fail_after
            .lock()
            .map_err(|_| StoreError::Command("Mutex lock failed".into()))?;
        if limit.is_some_and(|limit| call >= limit) {
            return Err(StoreError::Connection("injected failure".into()));
        }

        let poisoned = self
            .failing_keys
            .lock()
            .map_err(|_| StoreError::Command("Mutex lock failed".into()))?
            .contains(key);
        if poisoned {
            return Err(StoreError::Connection(format!("injected failure at {key}")));
        }

        self.state
            .lock()
            .map_err(|_| StoreError::Command("Mutex lock failed".into()))
    }
}

impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut state = self.begin(key)?;
        state.evict_expired(key);
        Ok(state.values.get(key).copied())
    }

    async fn set(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut state = self.begin(key)?;
        state.deadlines.remove(key);
        state.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> StoreResult<bool> {
        let mut state = self.begin(key)?;
        state.evict_expired(key);
        if state.values.contains_key(key) {
            return Ok(false);
        }
        state.values.insert(key.to_string(), value);
        Ok(true)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut state = self.begin(key)?;
        state.evict_expired(key);
        let entry = state.values.entry(key.to_string()).or_insert(0);
        *entry = entry
            .checked_add(delta)
            .ok_or_else(|| StoreError::Command(format!("increment overflow at {key}")))?;
        Ok(*entry)
    }

    async fn hset(&self, hash: &str, field: &str, value: i64) -> StoreResult<()> {
        let mut state = self.begin(hash)?;
        state.evict_expired(hash);
        state
            .hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hget(&self, hash: &str, field: &str) -> StoreResult<Option<i64>> {
        let mut state = self.begin(hash)?;
        state.evict_expired(hash);
        Ok(state
            .hashes
            .get(hash)
            .and_then(|fields| fields.get(field))
            .copied())
    }

    async fn hgetall(&self, hash: &str) -> StoreResult<HashMap<String, i64>> {
        let mut state = self.begin(hash)?;
        state.evict_expired(hash);
        Ok(state.hashes.get(hash).cloned().unwrap_or_default())
    }

    async fn hdel(&self, hash: &str, field: &str) -> StoreResult<()> {
        let mut state = self.begin(hash)?;
        if let Some(fields) = state.hashes.get_mut(hash) {
            fields.remove(field);
            if fields.is_empty() {
                state.hashes.remove(hash);
            }
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut state = self.begin(key)?;
        state.evict_expired(key);
        if !state.values.contains_key(key) && !state.hashes.contains_key(key) {
            return Ok(false);
        }
        state.deadlines.insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut state = self.begin(key)?;
        state.values.remove(key);
        state.hashes.remove(key);
        state.deadlines.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_by_starts_missing_keys_at_zero() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.incr_by("k", -2).await.unwrap(), -2);
        assert_eq!(store.incr_by("k", 5).await.unwrap(), 3);
        assert_eq!(store.get("k").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_set_if_absent_keeps_existing_value() {
        let store = InMemoryCounterStore::new();
        assert!(store.set_if_absent("k", 1).await.unwrap());
        assert!(!store.set_if_absent("k", 9).await.unwrap());
        assert_eq!(store.value("k"), Some(1));
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = InMemoryCounterStore::new();
        store.hset("h", "a", 1).await.unwrap();
        store.hset("h", "b", 2).await.unwrap();
        assert_eq!(store.hget("h", "a").await.unwrap(), Some(1));
        store.hdel("h", "a").await.unwrap();
        assert_eq!(store.hget("h", "a").await.unwrap(), None);
        assert_eq!(store.hgetall("h").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expire_evicts_key() {
        let store = InMemoryCounterStore::new();
        assert!(!store.expire("k", Duration::from_millis(10)).await.unwrap());
        store.set("k", 1).await.unwrap();
        assert!(store.expire("k", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = InMemoryCounterStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.incr_by("k", 1).await,
            Err(StoreError::Connection(_))
        ));
        store.set_offline(false);
        assert_eq!(store.incr_by("k", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fail_after_allows_exact_number_of_calls() {
        let store = InMemoryCounterStore::new();
        store.fail_after(2);
        assert!(store.set("a", 1).await.is_ok());
        assert!(store.set("b", 1).await.is_ok());
        assert!(store.set("c", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_key_only_affects_that_key() {
        let store = InMemoryCounterStore::new();
        store.fail_key("bad");
        assert!(store.incr_by("bad", 1).await.is_err());
        assert!(store.incr_by("good", 1).await.is_ok());
        store.heal_key("bad");
        assert_eq!(store.incr_by("bad", 1).await.unwrap(), 1);
    }
}
