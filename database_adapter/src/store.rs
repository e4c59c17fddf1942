use async_trait::async_trait;
use thiserror::Error;

pub type ProductId = i64;
pub type Quantity = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product {0} not found")]
    NotFound(ProductId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Source of persistence sessions.
///
/// The broker calls [`StockStore::begin`] once per drain cycle and drops the
/// session when the cycle ends, whatever the outcome. Implementations release
/// their resources in `Drop`.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Session: StockSession;

    /// Acquire a fresh session.
    /// # Errors
    /// - Returns `StoreError` if the backend cannot hand out a session
    async fn begin(&self) -> Result<Self::Session, StoreError>;
}

/// Unit of work scoped to one drain cycle.
#[async_trait]
pub trait StockSession: Send {
    /// Stage a new quantity for a product without persisting it.
    /// # Errors
    /// - Returns `StoreError::NotFound` if the product does not exist
    async fn lazy_update(
        &mut self,
        product_id: ProductId,
        new_quantity: Quantity,
    ) -> Result<(), StoreError>;

    /// Persist every staged change and return how many were written.
    /// Staged changes are discarded even if the commit fails.
    /// # Errors
    /// - Returns `StoreError` if the backend rejects the write
    async fn commit(&mut self) -> Result<usize, StoreError>;
}
