//! Blind-box demo binary
//!
//! Sells a batch of blind boxes to a crowd of concurrent customers against
//! Redis and `PostgreSQL`, then persists the final stock.
//!
//! ```bash
//! docker run -d -p 6379:6379 redis:7-alpine
//! docker run -d -p 5432:5432 -e POSTGRES_PASSWORD=postgres -e POSTGRES_DB=stockgate postgres:16
//! cargo run -p blind-box
//! ```

use anyhow::Context;
use blind_box::{BlindBoxShop, Purchase};
use futures::future::join_all;
use std::sync::Arc;
use stockgate_core::environment::SystemClock;
use stockgate_core::{Candidate, ItemId};
use stockgate_postgres::PostgresStockStore;
use stockgate_redis::RedisCounterStore;
use stockgate_runtime::metrics::MetricsServer;
use stockgate_runtime::{AdmissionGate, DrawEngine, EngineConfig, PersistScheduler, StockCache};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BOX_NAMESPACE: &str = "blind-stock";
const CUSTOMERS: usize = 40;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blind_box=info,stockgate_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env();

    let mut metrics = MetricsServer::new(
        config
            .metrics_addr
            .parse()
            .context("METRICS_ADDR is not a socket address")?,
    );
    metrics.start()?;

    let counters = RedisCounterStore::new(&config.redis.url).await?;
    let prize_rows = PostgresStockStore::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        config.stock.namespace.clone(),
    )
    .await?;
    prize_rows.migrate().await?;
    let box_rows = PostgresStockStore::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        BOX_NAMESPACE,
    )
    .await?;

    // Demo catalogue
    let box_id = ItemId::from("mystery-box");
    box_rows.upsert_level(&box_id, 25).await?;
    let pool = vec![
        Candidate::new("figure-secret", 1),
        Candidate::new("figure-rare", 9),
        Candidate::new("figure-common", 90),
    ];
    for (candidate, quantity) in pool.iter().zip([2, 10, 30]) {
        prize_rows.upsert_level(&candidate.item, quantity).await?;
    }

    let boxes = Arc::new(StockCache::new(
        BOX_NAMESPACE,
        counters.clone(),
        box_rows,
        SystemClock,
    ));
    let prizes = Arc::new(StockCache::new(
        config.stock.namespace.clone(),
        counters.clone(),
        prize_rows,
        SystemClock,
    ));
    boxes.warm_up().await?;
    prizes.warm_up().await?;

    let box_scheduler = PersistScheduler::spawn(Arc::clone(&boxes), config.persist_interval());
    let prize_scheduler = PersistScheduler::spawn(Arc::clone(&prizes), config.persist_interval());

    let shop = Arc::new(BlindBoxShop::new(
        Arc::clone(&boxes),
        DrawEngine::new(Arc::clone(&prizes)),
        AdmissionGate::new(counters, config.admission_config()),
        config.admission.queue.clone(),
    ));

    println!("=== Blind Box Demo: {CUSTOMERS} customers ===\n");

    let customers = (0..CUSTOMERS).map(|customer| {
        let shop = Arc::clone(&shop);
        let box_id = box_id.clone();
        let pool = pool.clone();
        tokio::spawn(async move { (customer, shop.open(&box_id, &pool, 1).await) })
    });

    let mut opened = 0;
    for joined in join_all(customers).await {
        let (customer, purchase) = joined?;
        match purchase {
            Ok(Purchase::Opened(won)) => {
                opened += 1;
                let names: Vec<&str> = won.iter().map(|c| c.item.as_str()).collect();
                println!("customer {customer:>2}: won {}", names.join(", "));
            }
            Ok(other) => println!("customer {customer:>2}: {other:?}"),
            Err(e) => println!("customer {customer:>2}: error {e}"),
        }
    }

    println!("\nBoxes sold: {opened}");
    println!("Boxes left: {:?}", boxes.get(&box_id).await?);
    for candidate in &pool {
        println!(
            "{:<14} left: {:?}",
            candidate.item.as_str(),
            prizes.get(&candidate.item).await?
        );
    }

    box_scheduler.shutdown().await;
    prize_scheduler.shutdown().await;

    println!("\n=== Stock persisted ===");
    Ok(())
}
