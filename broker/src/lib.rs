pub mod broker;
pub mod command;
pub mod config;
mod lifecycle;
mod queue;
mod signal;
pub mod stats;
mod worker;


pub use broker::{BrokerError, CommandBroker};
pub use command::{Command, CommandEnvelope, CommandError};
pub use config::BrokerConfig;
pub use database_adapter::{ProductId, Quantity, StockSession, StockStore, StoreError};
pub use lifecycle::LifecycleState;
pub use stats::StatsSnapshot;
