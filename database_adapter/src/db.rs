use async_trait::async_trait;
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use tracing::{debug, warn};

use crate::store::{ProductId, Quantity, StockSession, StockStore, StoreError};

/// Postgres-backed product stock table
#[derive(Clone)]
pub struct PgStockStore {
    pool: Pool<Postgres>,
    table: String,
}

impl std::fmt::Debug for PgStockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStockStore")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl PgStockStore {
    /// Connect using `DATABASE_URL` from the environment or a `.env` file
    /// # Errors
    /// - Returns `StoreError::Unavailable` if `DATABASE_URL` is not set
    /// - Returns `StoreError::Database` if the connection or table creation fails
    pub async fn new(table: &str) -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();
        let db_url = std::env::var("DATABASE_URL").map_err(|_| {
            StoreError::Unavailable("DATABASE_URL must be set in .env file or environment".into())
        })?;
        Self::connect(&db_url, table).await
    }

    /// Connect to the given database and make sure the table exists
    /// # Errors
    /// - Returns `StoreError::Database` if the connection or table creation fails
    pub async fn connect(db_url: &str, table: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().connect(db_url).await?;

        let query = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id       BIGINT PRIMARY KEY,
                name     TEXT NOT NULL,
                quantity BIGINT NOT NULL
            )"
        );
        sqlx::query(&query).execute(&pool).await?;

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Insert a product row
    /// # Errors
    /// - Returns `StoreError::Database` if the insert fails
    pub async fn insert_product(
        &self,
        product_id: ProductId,
        name: &str,
        quantity: Quantity,
    ) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO {} (id, name, quantity) VALUES ($1, $2, $3)",
            self.table
        );
        sqlx::query(&query)
            .bind(product_id)
            .bind(name)
            .bind(quantity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Read the persisted quantity of a product
    /// # Errors
    /// - Returns `StoreError::Database` if the query fails
    pub async fn quantity(&self, product_id: ProductId) -> Result<Option<Quantity>, StoreError> {
        let query = format!("SELECT quantity FROM {} WHERE id = $1", self.table);
        let row: Option<Quantity> = sqlx::query_scalar(&query)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Drop the backing table
    /// # Errors
    /// - Returns `StoreError::Database` if the statement fails
    pub async fn drop_table(&self) -> Result<(), StoreError> {
        let query = format!("DROP TABLE IF EXISTS {}", self.table);
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    type Session = PgStockSession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        Ok(PgStockSession {
            pool: self.pool.clone(),
            table: self.table.clone(),
            pending: Vec::new(),
        })
    }
}

/// Changes staged in memory, written in a single transaction on commit
pub struct PgStockSession {
    pool: Pool<Postgres>,
    table: String,
    pending: Vec<(ProductId, Quantity)>,
}

#[async_trait]
impl StockSession for PgStockSession {
    async fn lazy_update(
        &mut self,
        product_id: ProductId,
        new_quantity: Quantity,
    ) -> Result<(), StoreError> {
        let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", self.table);
        let exists: bool = sqlx::query_scalar(&query)
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(StoreError::NotFound(product_id));
        }

        self.pending.push((product_id, new_quantity));
        Ok(())
    }

    async fn commit(&mut self) -> Result<usize, StoreError> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(0);
        }

        let query = format!("UPDATE {} SET quantity = $2 WHERE id = $1", self.table);
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for (product_id, quantity) in pending {
            let result = sqlx::query(&query)
                .bind(product_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
            written += usize::try_from(result.rows_affected()).unwrap_or(usize::MAX);
        }
        tx.commit().await?;

        debug!("Committed {written} stock changes to {}", self.table);
        Ok(written)
    }
}

impl Drop for PgStockSession {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Discarding {} uncommitted stock changes for {}",
                self.pending.len(),
                self.table
            );
        }
    }
}
