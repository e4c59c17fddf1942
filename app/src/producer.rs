use std::time::Duration;

use broker::{BrokerConfig, Command, CommandBroker, StatsSnapshot, StockStore};
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, PartialEq, Eq)]
pub enum Submission {
    Queued,
    Skipped,
    Invalid,
    Rejected,
}

/// Feed commands from stdin to a broker until input ends or Ctrl-C, then let
/// the worker finish what was accepted and stop it.
pub async fn run<S>(store: S, config: BrokerConfig) -> Result<StatsSnapshot>
where
    S: StockStore + 'static,
{
    let broker = CommandBroker::start(store, config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed, waiting for queued commands");
                    break;
                };
                submit(&broker, &line);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping without draining");
                return Ok(stop(&broker).await);
            }
        }
    }

    tokio::select! {
        () = drained(&broker) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted while draining"),
    }
    Ok(stop(&broker).await)
}

/// Parse one input line and queue it. Blank lines and `#` comments are skipped.
pub fn submit<S>(broker: &CommandBroker<S>, line: &str) -> Submission
where
    S: StockStore + 'static,
{
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Submission::Skipped;
    }

    match line.parse::<Command>() {
        Ok(command) => match broker.send(command) {
            Ok(()) => Submission::Queued,
            Err(e) => {
                warn!("Could not queue command: {e}");
                Submission::Rejected
            }
        },
        Err(e) => {
            warn!("Ignoring input line: {e}");
            Submission::Invalid
        }
    }
}

/// Resolves once the worker has taken every accepted command off the queue
async fn drained<S>(broker: &CommandBroker<S>)
where
    S: StockStore + 'static,
{
    loop {
        let stats = broker.stats();
        if stats.processed() >= stats.sent {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

async fn stop<S>(broker: &CommandBroker<S>) -> StatsSnapshot
where
    S: StockStore + 'static,
{
    broker.dispose();
    broker.stopped().await;
    let stats = broker.stats();
    match serde_json::to_string(&stats) {
        Ok(json) => info!("Command broker stopped: {json}"),
        Err(e) => warn!("Could not serialize broker stats: {e}"),
    }
    stats
}

#[cfg(test)]
mod tests {
    use in_memory_adapter::InMemoryStockStore;

    use super::*;

    #[tokio::test]
    async fn test_submit_lines() {
        let store = InMemoryStockStore::new();
        store.insert(1, "bolts", 0);
        let broker = CommandBroker::start(store.clone(), BrokerConfig::default()).unwrap();

        let line = r#"{"kind":"update_stock_quantity","payload":{"product_id":1,"new_quantity":5}}"#;
        assert_eq!(submit(&broker, line), Submission::Queued);
        assert_eq!(submit(&broker, "   "), Submission::Skipped);
        assert_eq!(submit(&broker, "# restock"), Submission::Skipped);
        assert_eq!(submit(&broker, "{not json"), Submission::Invalid);
        assert_eq!(
            submit(&broker, r#"{"kind":"archive_product","payload":{}}"#),
            Submission::Queued
        );

        drained(&broker).await;
        let stats = stop(&broker).await;
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(store.quantity(&1), Some(5));

        assert_eq!(submit(&broker, line), Submission::Rejected);
    }
}
