//! Redis-backed [`CounterStore`] implementation.
//!
//! Every trait method maps onto exactly one Redis command, so each call is
//! atomic on the server:
//!
//! | Method          | Command   |
//! |-----------------|-----------|
//! | `get`           | `GET`     |
//! | `set`           | `SET`     |
//! | `set_if_absent` | `SETNX`   |
//! | `incr_by`       | `INCRBY`  |
//! | `hset`          | `HSET`    |
//! | `hget`          | `HGET`    |
//! | `hgetall`       | `HGETALL` |
//! | `hdel`          | `HDEL`    |
//! | `expire`        | `PEXPIRE` |
//! | `del`           | `DEL`     |

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError};
use std::collections::HashMap;
use std::time::Duration;
use stockgate_core::StoreError;
use stockgate_core::store::{CounterStore, StoreResult};

/// `Redis` counter store over a multiplexed, auto-reconnecting connection.
///
/// Cloning is cheap; clones share the connection.
///
/// # Example
///
/// ```no_run
/// use stockgate_redis::RedisCounterStore;
/// use stockgate_core::CounterStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisCounterStore::new("redis://127.0.0.1:6379").await?;
/// store.set("prize-stock:stock:1", 10).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisCounterStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to `Redis`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the client cannot be created or
    /// the first connection fails.
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Connection(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Connected to Redis counter store");

        Ok(Self { conn_manager })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

/// Translate a `Redis` error for `command` on `key`.
fn store_error<'a>(command: &'static str, key: &'a str) -> impl FnOnce(RedisError) -> StoreError + 'a {
    move |e| {
        if e.kind() == ErrorKind::TypeError {
            return StoreError::InvalidValue {
                key: key.to_string(),
                value: e.to_string(),
            };
        }

        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            tracing::error!(error = %e, command, key, "Redis connection failure");
            return StoreError::Connection(format!("{command} {key}: {e}"));
        }

        tracing::warn!(error = %e, command, key, "Redis command failed");
        StoreError::Command(format!("{command} {key}: {e}"))
    }
}

impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn_manager.clone();
        conn.get(key).await.map_err(store_error("GET", key))
    }

    async fn set(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set(key, value)
            .await
            .map_err(store_error("SET", key))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();
        conn.set_nx(key, value)
            .await
            .map_err(store_error("SETNX", key))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.conn_manager.clone();
        let value: i64 = conn
            .incr(key, delta)
            .await
            .map_err(store_error("INCRBY", key))?;

        tracing::trace!(key, delta, value, "INCRBY");

        Ok(value)
    }

    async fn hset(&self, hash: &str, field: &str, value: i64) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .hset(hash, field, value)
            .await
            .map_err(store_error("HSET", hash))?;
        Ok(())
    }

    async fn hget(&self, hash: &str, field: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn_manager.clone();
        conn.hget(hash, field)
            .await
            .map_err(store_error("HGET", hash))
    }

    async fn hgetall(&self, hash: &str) -> StoreResult<HashMap<String, i64>> {
        let mut conn = self.conn_manager.clone();
        conn.hgetall(hash)
            .await
            .map_err(store_error("HGETALL", hash))
    }

    async fn hdel(&self, hash: &str, field: &str) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .hdel(hash, field)
            .await
            .map_err(store_error("HDEL", hash))?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        conn.pexpire(key, millis)
            .await
            .map_err(store_error("PEXPIRE", key))
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await.map_err(store_error("DEL", key))?;
        Ok(())
    }
}
