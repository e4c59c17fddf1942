use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use database_adapter::{StockSession, StockStore};
use futures::FutureExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::config::BrokerConfig;
use crate::lifecycle::Lifecycle;
use crate::queue::CommandQueue;
use crate::signal::WakeSignal;
use crate::stats::BrokerStats;

/// State shared between the broker handle and its worker task
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) queue: CommandQueue,
    pub(crate) signal: WakeSignal,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) stats: BrokerStats,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            queue: CommandQueue::new(),
            signal: WakeSignal::new(),
            lifecycle: Lifecycle::new(),
            stats: BrokerStats::default(),
        }
    }
}

enum CycleOutcome {
    /// The queue was observed empty or the cycle was cut short by cancellation
    Finished,
    /// The store could not hand out a session; the commands are still queued
    Retry,
}

/// The single consumer of a broker's queue
pub(crate) struct Worker<S> {
    store: S,
    shared: Arc<Shared>,
    config: BrokerConfig,
    /// Command being applied, kept outside the drain so a panic cannot hide it
    in_flight: Mutex<Option<Command>>,
}

impl<S> Worker<S>
where
    S: StockStore,
{
    pub(crate) fn new(store: S, shared: Arc<Shared>, config: BrokerConfig) -> Self {
        Self {
            store,
            shared,
            config,
            in_flight: Mutex::new(None),
        }
    }

    pub(crate) async fn run(self) {
        debug!("Command worker {} started", self.config.name);
        let token = self.shared.lifecycle.token().clone();

        'idle: loop {
            if token.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = self.shared.signal.wait() => {}
            }

            loop {
                if token.is_cancelled() {
                    break 'idle;
                }

                let outcome = AssertUnwindSafe(self.drain_cycle()).catch_unwind().await;
                match outcome {
                    Ok(CycleOutcome::Finished) => break,
                    Ok(CycleOutcome::Retry) => {}
                    Err(panic) => self.recover(panic.as_ref()),
                }

                // Back off before re-entering the drain, unless asked to stop
                tokio::select! {
                    biased;
                    () = token.cancelled() => break 'idle,
                    () = sleep(self.config.retry_backoff) => {}
                }
            }
        }

        self.shared.lifecycle.mark_stopped();
        info!(
            "Command worker {} stopped ({} commands left in queue)",
            self.config.name,
            self.shared.queue.len()
        );
    }

    async fn drain_cycle(&self) -> CycleOutcome {
        // A wake can outlive the commands that caused it
        if self.shared.queue.is_empty() {
            return CycleOutcome::Finished;
        }

        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => {
                self.shared.stats.record_session_failure();
                error!(
                    "Command worker {} could not open a store session ({} commands waiting): {e}",
                    self.config.name,
                    self.shared.queue.len()
                );
                return CycleOutcome::Retry;
            }
        };
        self.shared.stats.record_drain_cycle();

        let mut drained = 0usize;
        while let Some(command) = self.next_command() {
            *self.in_flight() = Some(command.clone());
            self.apply(&mut session, &command).await;
            self.in_flight().take();
            drained += 1;
        }

        match session.commit().await {
            Ok(changes) => {
                self.shared.stats.record_commit(changes);
                debug!(
                    "Command worker {} committed {changes} changes from {drained} commands",
                    self.config.name
                );
            }
            Err(e) => {
                self.shared.stats.record_commit_failure();
                error!(
                    "Command worker {} failed to commit {drained} commands, changes are lost: {e}",
                    self.config.name
                );
            }
        }

        CycleOutcome::Finished
    }

    /// Next command to apply, or `None` once the queue is empty or the
    /// broker is being disposed
    fn next_command(&self) -> Option<Command> {
        if self.shared.lifecycle.is_cancelled() {
            return None;
        }
        self.shared.queue.try_dequeue()
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<Command>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Account for a drain cycle that unwound. The command it was applying,
    /// if any, counts as failed.
    fn recover(&self, panic: &(dyn Any + Send)) {
        self.shared.stats.record_recovered_panic();
        let message = panic_message(panic);
        let lost = self.in_flight().take();
        match lost {
            Some(command) => {
                self.shared.stats.record_failed();
                error!(
                    "Command worker {} failed to {command}: panicked with {message}",
                    self.config.name
                );
            }
            None => error!(
                "Command worker {} recovered from a panic while draining: {message}",
                self.config.name
            ),
        }
    }

    async fn apply(&self, session: &mut S::Session, command: &Command) {
        match command {
            Command::UpdateStockQuantity {
                product_id,
                new_quantity,
            } => match session.lazy_update(*product_id, *new_quantity).await {
                Ok(()) => {
                    self.shared.stats.record_applied();
                    debug!("Command worker {} applied {command}", self.config.name);
                }
                Err(e) => {
                    self.shared.stats.record_failed();
                    error!(
                        "Command worker {} failed to {command}: {e}",
                        self.config.name
                    );
                }
            },
            Command::Unrecognized { kind, .. } => {
                self.shared.stats.record_unrecognized();
                warn!(
                    "Command worker {} skipped command of unrecognized kind `{kind}`",
                    self.config.name
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return message;
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.as_str();
    }
    "non-string panic payload"
}
