mod config;
mod logging;
mod producer;

use clap::Parser;
use color_eyre::Result;
use database_adapter::PgStockStore;
use in_memory_adapter::InMemoryStockStore;

use crate::config::{Settings, StoreKind};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let settings = Settings::parse();

    // Initialize logging
    logging::init()?;
    tracing::info!("Starting stock broker with {:?} store", settings.store);
    tracing::debug!("Settings: {settings:#?}");

    let broker_config = settings.broker_config();
    match settings.store {
        StoreKind::Memory => {
            let store = InMemoryStockStore::new();
            for id in 1..=settings.seed_products {
                store.insert(id, format!("product-{id}"), 0);
            }
            producer::run(store.clone(), broker_config).await?;
            for id in 1..=settings.seed_products {
                if let Some(product) = store.get(&id) {
                    tracing::info!("{}: {}", product.name, product.quantity);
                }
            }
        }
        StoreKind::Postgres => {
            let store = match &settings.database_url {
                Some(url) => PgStockStore::connect(url, &settings.table).await?,
                None => PgStockStore::new(&settings.table).await?,
            };
            producer::run(store, broker_config).await?;
        }
    }

    Ok(())
}
