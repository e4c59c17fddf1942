#![allow(dead_code)]

use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

use crate::{ProductId, Quantity, StockSession, StockStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin,
    LazyUpdate {
        product_id: ProductId,
        new_quantity: Quantity,
        ok: bool,
    },
    Commit {
        ok: bool,
    },
    Release,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Mutex<Vec<Call>>,
    missing: Mutex<HashSet<ProductId>>,
    panic_on: Mutex<HashSet<ProductId>>,
    gated: Mutex<Option<ProductId>>,
    gate_reached: Notify,
    gate_opened: Notify,
    failing_begins: AtomicUsize,
    failing_commits: AtomicUsize,
}

/// Store double recording every call the worker makes
#[derive(Debug, Default, Clone)]
pub struct RecordingStore {
    inner: Arc<Inner>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `lazy_update` fail with `NotFound` for this product
    pub fn with_missing(self, product_id: ProductId) -> Self {
        self.inner.missing.lock().unwrap().insert(product_id);
        self
    }

    /// Make `lazy_update` panic for this product
    pub fn with_panic_on(self, product_id: ProductId) -> Self {
        self.inner.panic_on.lock().unwrap().insert(product_id);
        self
    }

    /// Hold `lazy_update` for this product until [`RecordingStore::open_gate`]
    pub fn with_gate_on(self, product_id: ProductId) -> Self {
        *self.inner.gated.lock().unwrap() = Some(product_id);
        self
    }

    /// Wait until the worker is held at the gate
    pub async fn wait_at_gate(&self) {
        self.inner.gate_reached.notified().await;
    }

    pub fn open_gate(&self) {
        self.inner.gate_opened.notify_one();
    }

    /// Fail the next `count` calls to `begin`
    pub fn with_failing_begins(self, count: usize) -> Self {
        self.inner.failing_begins.store(count, Ordering::SeqCst);
        self
    }

    /// Fail the next `count` calls to `commit`
    pub fn with_failing_commits(self, count: usize) -> Self {
        self.inner.failing_commits.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Every `lazy_update` attempt, successful or not
    pub fn attempted_updates(&self) -> Vec<(ProductId, Quantity)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::LazyUpdate {
                    product_id,
                    new_quantity,
                    ..
                } => Some((product_id, new_quantity)),
                _ => None,
            })
            .collect()
    }

    pub fn successful_updates(&self) -> Vec<(ProductId, Quantity)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::LazyUpdate {
                    product_id,
                    new_quantity,
                    ok: true,
                } => Some((product_id, new_quantity)),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.count(|call| matches!(call, Call::Commit { .. }))
    }

    pub fn successful_commits(&self) -> usize {
        self.count(|call| matches!(call, Call::Commit { ok: true }))
    }

    pub fn begins(&self) -> usize {
        self.count(|call| matches!(call, Call::Begin))
    }

    pub fn releases(&self) -> usize {
        self.count(|call| matches!(call, Call::Release))
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    fn record(&self, call: Call) {
        self.inner.calls.lock().unwrap().push(call);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StockStore for RecordingStore {
    type Session = RecordingSession;

    async fn begin(&self) -> Result<Self::Session, StoreError> {
        if Self::take_failure(&self.inner.failing_begins) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.record(Call::Begin);
        Ok(RecordingSession {
            store: self.clone(),
            staged: 0,
        })
    }
}

pub struct RecordingSession {
    store: RecordingStore,
    staged: usize,
}

#[async_trait]
impl StockSession for RecordingSession {
    async fn lazy_update(
        &mut self,
        product_id: ProductId,
        new_quantity: Quantity,
    ) -> Result<(), StoreError> {
        if self.store.inner.panic_on.lock().unwrap().contains(&product_id) {
            panic!("store blew up on product {product_id}");
        }
        let gated = *self.store.inner.gated.lock().unwrap() == Some(product_id);
        if gated {
            self.store.inner.gate_reached.notify_one();
            self.store.inner.gate_opened.notified().await;
        }
        let ok = !self.store.inner.missing.lock().unwrap().contains(&product_id);
        self.store.record(Call::LazyUpdate {
            product_id,
            new_quantity,
            ok,
        });
        if !ok {
            return Err(StoreError::NotFound(product_id));
        }
        self.staged += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<usize, StoreError> {
        let staged = std::mem::take(&mut self.staged);
        if RecordingStore::take_failure(&self.store.inner.failing_commits) {
            self.store.record(Call::Commit { ok: false });
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.store.record(Call::Commit { ok: true });
        Ok(staged)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.store.record(Call::Release);
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within two seconds");
}

/// Give the worker a chance to run without waiting on anything in particular
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Log events captured from the current thread
#[derive(Debug, Default, Clone)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    pub fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event_level, _)| *event_level == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

struct CaptureLayer(CapturedLogs);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0
            .events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        } else {
            let _ = write!(self.0, " {}={value:?}", field.name());
        }
    }
}

/// Route this thread's log events into a [`CapturedLogs`] until the guard drops
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(logs.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
