//! `PostgreSQL` durable stock store for stockgate.
//!
//! Holds the authoritative stock level of every item. The live counters in
//! the counter store run ahead of this table; the persist sweep brings it up
//! to date.
//!
//! One [`PostgresStockStore`] serves one namespace, matching one
//! `StockCache`. Several namespaces share the `stock_levels` table.
//!
//! # Example
//!
//! ```ignore
//! use stockgate_postgres::PostgresStockStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStockStore::connect("postgres://localhost/stockgate", 10, "prize-stock").await?;
//!     store.migrate().await?;
//!     store.upsert_level(&"42".into(), 100).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod stock_store;

pub use stock_store::{MIGRATION, PostgresStockStore};
