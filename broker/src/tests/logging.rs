//! Failures inside the worker only surface through logs, so these tests
//! capture them. Each test runs the worker on its own current-thread runtime,
//! which keeps the thread-local subscriber in effect for the worker task.

use serde_json::json;
use tracing::Level;

use super::support::{RecordingStore, capture_logs, settle, wait_until};
use crate::{BrokerConfig, Command, CommandBroker};

#[tokio::test]
async fn test_missing_product_is_logged_once() {
    let (logs, _guard) = capture_logs();
    let store = RecordingStore::new().with_missing(999);
    let broker = CommandBroker::start(store.clone(), BrokerConfig::default()).unwrap();

    broker.send(Command::update_stock_quantity(1, 10)).unwrap();
    broker.send(Command::update_stock_quantity(999, 10)).unwrap();
    broker.send(Command::update_stock_quantity(3, 30)).unwrap();

    wait_until(|| store.commits() == 1).await;
    settle().await;

    let errors = logs.at(Level::ERROR);
    assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
    assert!(errors[0].contains("999"));
    assert_eq!(store.successful_updates(), vec![(1, 10), (3, 30)]);
    assert_eq!(store.commits(), 1);
}

#[tokio::test]
async fn test_unrecognized_kind_is_a_warning() {
    let (logs, _guard) = capture_logs();
    let store = RecordingStore::new();
    let broker = CommandBroker::start(store.clone(), BrokerConfig::default()).unwrap();

    broker
        .send(Command::Unrecognized {
            kind: "discontinue_product".into(),
            payload: json!({ "product_id": 7 }),
        })
        .unwrap();

    wait_until(|| broker.stats().unrecognized == 1).await;
    settle().await;

    let warnings = logs.at(Level::WARN);
    assert_eq!(warnings.len(), 1, "unexpected warnings: {warnings:?}");
    assert!(warnings[0].contains("discontinue_product"));
    assert!(logs.at(Level::ERROR).is_empty());
    assert!(store.attempted_updates().is_empty());
}

#[tokio::test]
async fn test_commit_failure_is_logged() {
    let (logs, _guard) = capture_logs();
    let store = RecordingStore::new().with_failing_commits(1);
    let broker = CommandBroker::start(store.clone(), BrokerConfig::default()).unwrap();

    broker.send(Command::update_stock_quantity(1, 10)).unwrap();
    wait_until(|| store.commits() == 1).await;
    settle().await;

    let errors = logs.at(Level::ERROR);
    assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
    assert!(errors[0].contains("failed to commit"));
}

#[tokio::test]
async fn test_send_after_dispose_is_logged() {
    let (logs, _guard) = capture_logs();
    let broker = CommandBroker::start(RecordingStore::new(), BrokerConfig::default()).unwrap();
    broker.dispose();

    assert!(broker.send(Command::update_stock_quantity(2, 2)).is_err());
    let warnings = logs.at(Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("disposed"));
}
