use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use database_adapter::{ProductId, Quantity, StockSession, StockStore, StoreError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub quantity: Quantity,
}

/// Product table kept in process memory. Clones share the same storage.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStockStore {
    storage: Arc<Mutex<HashMap<ProductId, Product>>>,
}

impl InMemoryStockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ProductId, name: impl Into<String>, quantity: Quantity) {
        self.lock().insert(
            id,
            Product {
                name: name.into(),
                quantity,
            },
        );
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<Product> {
        self.lock().get(id).cloned()
    }

    #[must_use]
    pub fn quantity(&self, id: &ProductId) -> Option<Quantity> {
        self.lock().get(id).map(|product| product.quantity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProductId, Product>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Session = InMemoryStockSession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        Ok(InMemoryStockSession {
            store: self.clone(),
            pending: Vec::new(),
        })
    }
}

/// Stages quantity changes until [`StockSession::commit`] is called.
#[derive(Debug)]
pub struct InMemoryStockSession {
    store: InMemoryStockStore,
    pending: Vec<(ProductId, Quantity)>,
}

#[async_trait]
impl StockSession for InMemoryStockSession {
    async fn lazy_update(
        &mut self,
        product_id: ProductId,
        new_quantity: Quantity,
    ) -> Result<(), StoreError> {
        if self.store.get(&product_id).is_none() {
            return Err(StoreError::NotFound(product_id));
        }
        self.pending.push((product_id, new_quantity));
        Ok(())
    }

    async fn commit(&mut self) -> Result<usize, StoreError> {
        let pending = std::mem::take(&mut self.pending);
        let mut storage = self.store.lock();
        let mut written = 0;
        for (product_id, quantity) in pending {
            // A product removed after staging is skipped rather than recreated
            if let Some(product) = storage.get_mut(&product_id) {
                product.quantity = quantity;
                written += 1;
            }
        }
        debug!("Committed {written} in-memory stock changes");
        Ok(written)
    }
}
