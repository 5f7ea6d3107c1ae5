//! Stock level table access.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use stockgate_core::store::{DurableStore, StoreResult};
use stockgate_core::{ItemId, StockLevel, StoreError};

/// Schema for the `stock_levels` table.
pub const MIGRATION: &str = include_str!("../migrations/001_stock_levels.sql");

/// Translate a sqlx error into a [`StoreError`].
fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Tls(_) => StoreError::Connection(e.to_string()),
        other => StoreError::Command(other.to_string()),
    }
}

/// `PostgreSQL`-based [`DurableStore`] scoped to one namespace.
///
/// # Example
///
/// ```no_run
/// use stockgate_postgres::PostgresStockStore;
/// use stockgate_core::DurableStore;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresStockStore::new(pool, "prize-stock");
///
/// let levels = store.load_all().await?;
/// println!("Items on record: {}", levels.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
    namespace: String,
}

impl PostgresStockStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the database is unreachable.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        namespace: impl Into<String>,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self::new(pool, namespace))
    }

    /// Namespace this store reads and writes.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create the `stock_levels` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the statement fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// Insert an item or overwrite its quantity.
    ///
    /// Used when items are created or restocked by an operator. The sweep
    /// only ever updates existing rows.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the statement fails.
    pub async fn upsert_level(&self, item: &ItemId, quantity: i64) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO stock_levels (namespace, item_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (namespace, item_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = now()
            ",
        )
        .bind(&self.namespace)
        .bind(item.as_str())
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        tracing::info!(namespace = %self.namespace, item = %item, quantity, "Stock level upserted");

        Ok(())
    }

    /// Delete an item's row. Returns `true` if a row existed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the statement fails.
    pub async fn delete_level(&self, item: &ItemId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM stock_levels WHERE namespace = $1 AND item_id = $2")
            .bind(&self.namespace)
            .bind(item.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }
}

impl DurableStore for PostgresStockStore {
    async fn load_all(&self) -> StoreResult<Vec<StockLevel>> {
        let rows = sqlx::query(
            r"
            SELECT item_id, quantity
            FROM stock_levels
            WHERE namespace = $1
            ORDER BY item_id
            ",
        )
        .bind(&self.namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter()
            .map(|row| {
                let item: String = row.try_get("item_id").map_err(store_error)?;
                let quantity: i64 = row.try_get("quantity").map_err(store_error)?;
                Ok(StockLevel::new(item, quantity))
            })
            .collect()
    }

    async fn update_quantity(&self, item: &ItemId, quantity: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE stock_levels
            SET quantity = $3, updated_at = now()
            WHERE namespace = $1 AND item_id = $2
            ",
        )
        .bind(&self.namespace)
        .bind(item.as_str())
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        let updated = result.rows_affected() == 1;
        let outcome = if updated { "updated" } else { "missing" };
        metrics::counter!("stock_durable_writes_total", "outcome" => outcome).increment(1);

        if !updated {
            tracing::warn!(namespace = %self.namespace, item = %item, "No stock row to update");
        }

        Ok(updated)
    }
}
