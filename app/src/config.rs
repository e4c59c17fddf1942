use std::path::PathBuf;
use std::time::Duration;

use broker::BrokerConfig;
use clap::{Parser, ValueEnum};

lazy_static::lazy_static! {
    pub static ref PROJECT_NAME: String = String::from("stock_broker").to_uppercase();
    pub static ref DATA_DIR_ENV: String = format!("{}_DATA", PROJECT_NAME.clone());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Products kept in process memory, seeded at startup
    Memory,
    /// Products table in Postgres
    Postgres,
}

/// Reads stock commands as JSON lines on stdin and applies them in the background
#[derive(Parser, Debug)]
#[command(name = "stock-broker", version)]
pub struct Settings {
    /// Where product quantities are persisted
    #[arg(long, env = "STOCK_STORE", value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// Postgres connection string, required for the postgres store
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Products table name for the postgres store
    #[arg(long, env = "STOCK_TABLE", default_value = "products")]
    pub table: String,

    /// Number of products (ids 1..=N) to seed the memory store with
    #[arg(long, default_value_t = 10)]
    pub seed_products: i64,

    /// Delay before the worker retries after a store failure, in milliseconds
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 100)]
    pub retry_backoff_ms: u64,
}

impl Settings {
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig::default()
            .with_name(PROJECT_NAME.to_lowercase())
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
    }
}

/// Get the data directory for the application
pub fn get_data_dir() -> PathBuf {
    let project_name = PROJECT_NAME.clone().to_lowercase();

    if let Ok(data_dir) = std::env::var(DATA_DIR_ENV.as_str()) {
        PathBuf::from(data_dir)
    } else if let Ok(data_dir) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(data_dir).join(&project_name)
    } else if let Ok(home_dir) = std::env::var("HOME") {
        PathBuf::from(home_dir)
            .join(".local")
            .join("share")
            .join(&project_name)
    } else {
        // Fallback to current directory if no home directory is found
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&project_name)
    }
}
