pub mod db;
pub mod store;


pub use db::{PgStockSession, PgStockStore};
pub use store::{ProductId, Quantity, StockSession, StockStore, StoreError};
