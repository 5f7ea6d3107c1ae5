//! Integration tests for the `Redis` counter store.
//!
//! These need a running server and are ignored by default:
//!
//! ```bash
//! docker run -d -p 6379:6379 redis:7-alpine
//! cargo test -p stockgate-redis -- --ignored
//! ```

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::sync::Arc;
use std::time::Duration;
use stockgate_core::environment::SystemClock;
use stockgate_core::{CounterStore, Floor, ItemId, StockLevel, StoreResult};
use stockgate_core::DurableStore;
use stockgate_redis::RedisCounterStore;
use stockgate_runtime::{AdmissionConfig, AdmissionGate, StockCache};

const REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Durable store that accepts nothing; these tests only exercise Redis.
struct NoDurable;

impl DurableStore for NoDurable {
    async fn load_all(&self) -> StoreResult<Vec<StockLevel>> {
        Ok(Vec::new())
    }

    async fn update_quantity(&self, _item: &ItemId, _quantity: i64) -> StoreResult<bool> {
        Ok(false)
    }
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_basic_commands() {
    let store = RedisCounterStore::new(REDIS_URL).await.unwrap();
    let key = unique("test-counter");

    assert_eq!(store.get(&key).await.unwrap(), None);
    assert!(store.set_if_absent(&key, 5).await.unwrap());
    assert!(!store.set_if_absent(&key, 9).await.unwrap());
    assert_eq!(store.incr_by(&key, -2).await.unwrap(), 3);

    let hash = unique("test-hash");
    store.hset(&hash, "a", 17).await.unwrap();
    assert_eq!(store.hget(&hash, "a").await.unwrap(), Some(17));
    assert_eq!(store.hgetall(&hash).await.unwrap().len(), 1);
    store.hdel(&hash, "a").await.unwrap();
    assert_eq!(store.hget(&hash, "a").await.unwrap(), None);

    assert!(store.expire(&key, Duration::from_millis(50)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_non_integer_value_is_reported() {
    let store = RedisCounterStore::new(REDIS_URL).await.unwrap();
    let key = unique("test-text");

    let client = redis::Client::open(REDIS_URL).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = redis::cmd("SET")
        .arg(&key)
        .arg("ten")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert!(store.get(&key).await.is_err());
    store.del(&key).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Redis"]
async fn test_stock_cache_under_contention() {
    let store = RedisCounterStore::new(REDIS_URL).await.unwrap();
    let cache = Arc::new(StockCache::new(unique("test-stock"), store, NoDurable, SystemClock));
    let item = ItemId::from("x");
    cache.seed(&item, 10).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let cache = Arc::clone(&cache);
        let item = item.clone();
        tasks.push(tokio::spawn(async move {
            cache.incr(&item, -1, Floor::ZERO).await.unwrap().is_applied()
        }));
    }

    let mut applied = 0;
    for task in tasks {
        if task.await.unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 10);
    assert_eq!(cache.get(&item).await.unwrap(), Some(0));
    cache.remove(&item).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_admission_gate_against_redis() {
    let store = RedisCounterStore::new(REDIS_URL).await.unwrap();
    let gate = AdmissionGate::new(
        store,
        AdmissionConfig {
            key_prefix: unique("test-limit"),
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(30),
        },
    );

    assert!(gate.acquire("draw", 1, Duration::from_millis(200)).await.unwrap());
    assert!(!gate.acquire("draw", 1, Duration::from_millis(200)).await.unwrap());
    gate.release("draw").await.unwrap();
    assert_eq!(gate.in_flight("draw").await.unwrap(), 0);
}
