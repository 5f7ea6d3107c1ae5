//! Provider traits for the external stores.
//!
//! # Architecture
//!
//! Providers are **interfaces**, not implementations. The stock cache and the
//! admission gate depend on these traits and receive a concrete backend at
//! construction time:
//!
//! - **Production**: `RedisCounterStore`, `PostgresStockStore`
//! - **Testing**: `InMemoryCounterStore`, `InMemoryDurableStore`
//!
//! Every [`CounterStore`] operation is atomic on a single key or a single
//! hash. No multi-key transactions are assumed; the stock cache gets its
//! correctness from atomic increments alone.

use crate::error::StoreError;
use crate::types::{ItemId, StockLevel};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Atomic key-value service holding live counters.
///
/// Values are signed integers throughout: quantities, admission counters,
/// timestamps and tunables.
///
/// # Example
///
/// ```no_run
/// use stockgate_core::CounterStore;
///
/// # async fn example(store: impl CounterStore) -> Result<(), Box<dyn std::error::Error>> {
/// store.set("prize-stock:stock:1", 10).await?;
/// let left = store.incr_by("prize-stock:stock:1", -1).await?;
/// assert_eq!(left, 9);
/// # Ok(())
/// # }
/// ```
pub trait CounterStore: Send + Sync {
    /// `GET key`. `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the value is not an integer.
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<i64>>> + Send;

    /// `SET key value`, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn set(&self, key: &str, value: i64) -> impl Future<Output = StoreResult<()>> + Send;

    /// `SETNX key value`. Returns `true` if the key was created.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn set_if_absent(&self, key: &str, value: i64)
    -> impl Future<Output = StoreResult<bool>> + Send;

    /// `INCRBY key delta`, atomically. Missing keys start at zero.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the value is not an integer.
    fn incr_by(&self, key: &str, delta: i64) -> impl Future<Output = StoreResult<i64>> + Send;

    /// `HSET hash field value`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn hset(
        &self,
        hash: &str,
        field: &str,
        value: i64,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// `HGET hash field`. `None` if the hash or field does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the value is not an integer.
    fn hget(&self, hash: &str, field: &str)
    -> impl Future<Output = StoreResult<Option<i64>>> + Send;

    /// `HGETALL hash`. Empty map if the hash does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or a value is not an integer.
    fn hgetall(&self, hash: &str)
    -> impl Future<Output = StoreResult<HashMap<String, i64>>> + Send;

    /// `HDEL hash field`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn hdel(&self, hash: &str, field: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// `EXPIRE key seconds`. Returns `false` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = StoreResult<bool>> + Send;

    /// `DEL key`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn del(&self, key: &str) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Authoritative long-term record of quantities.
///
/// Eventually consistent with the counter store; never consulted to decide
/// whether one more unit can be sold.
pub trait DurableStore: Send + Sync {
    /// Load every item's quantity, used to warm the cache on cold start.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn load_all(&self) -> impl Future<Output = StoreResult<Vec<StockLevel>>> + Send;

    /// Conditionally write one item's quantity.
    ///
    /// Returns `true` if exactly one record was updated.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn update_quantity(
        &self,
        item: &ItemId,
        quantity: i64,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}

impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<i64>>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: i64) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).set(key, value)
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: i64,
    ) -> impl Future<Output = StoreResult<bool>> + Send {
        (**self).set_if_absent(key, value)
    }

    fn incr_by(&self, key: &str, delta: i64) -> impl Future<Output = StoreResult<i64>> + Send {
        (**self).incr_by(key, delta)
    }

    fn hset(
        &self,
        hash: &str,
        field: &str,
        value: i64,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).hset(hash, field, value)
    }

    fn hget(
        &self,
        hash: &str,
        field: &str,
    ) -> impl Future<Output = StoreResult<Option<i64>>> + Send {
        (**self).hget(hash, field)
    }

    fn hgetall(
        &self,
        hash: &str,
    ) -> impl Future<Output = StoreResult<HashMap<String, i64>>> + Send {
        (**self).hgetall(hash)
    }

    fn hdel(&self, hash: &str, field: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).hdel(hash, field)
    }

    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = StoreResult<bool>> + Send {
        (**self).expire(key, ttl)
    }

    fn del(&self, key: &str) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).del(key)
    }
}

impl<T: DurableStore + ?Sized> DurableStore for Arc<T> {
    fn load_all(&self) -> impl Future<Output = StoreResult<Vec<StockLevel>>> + Send {
        (**self).load_all()
    }

    fn update_quantity(
        &self,
        item: &ItemId,
        quantity: i64,
    ) -> impl Future<Output = StoreResult<bool>> + Send {
        (**self).update_quantity(item, quantity)
    }
}
