use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use database_adapter::StockStore;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::command::Command;
use crate::config::BrokerConfig;
use crate::lifecycle::LifecycleState;
use crate::stats::StatsSnapshot;
use crate::worker::{Shared, Worker};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker has been disposed")]
    Disposed,
    #[error("no tokio runtime is available to run the command worker")]
    NoRuntime,
}

/// Fire-and-forget entry point for stock commands.
///
/// Commands handed to [`CommandBroker::send`] are queued and applied by a
/// single background task, which opens one store session per drain cycle and
/// commits it once the queue is empty. Producers never see the outcome;
/// failures are reported through `tracing` and [`CommandBroker::stats`].
pub struct CommandBroker<S>
where
    S: StockStore + 'static,
{
    shared: Arc<Shared>,
    config: BrokerConfig,
    /// Handed to the worker when it starts
    store: Mutex<Option<S>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S> std::fmt::Debug for CommandBroker<S>
where
    S: StockStore + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBroker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("queue_size", &self.queue_len())
            .finish_non_exhaustive()
    }
}

impl<S> CommandBroker<S>
where
    S: StockStore + 'static,
{
    /// Create a broker without spawning its worker. The worker is started by
    /// [`CommandBroker::start_worker`] or by the first [`CommandBroker::send`].
    #[must_use]
    pub fn new(store: S, config: BrokerConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            config,
            store: Mutex::new(Some(store)),
            worker_handle: Mutex::new(None),
        }
    }

    /// Create a broker and spawn its worker on the current tokio runtime
    /// # Errors
    /// - Returns `BrokerError::NoRuntime` if called outside a tokio runtime
    pub fn start(store: S, config: BrokerConfig) -> Result<Self, BrokerError> {
        let broker = Self::new(store, config);
        broker.start_worker()?;
        Ok(broker)
    }

    /// Spawn the worker if it is not running yet. Concurrent callers spawn
    /// at most one worker.
    /// # Errors
    /// - Returns `BrokerError::NoRuntime` if called outside a tokio runtime
    /// - Returns `BrokerError::Disposed` if the broker was disposed before starting
    pub fn start_worker(&self) -> Result<(), BrokerError> {
        match self.state() {
            LifecycleState::Running => return Ok(()),
            LifecycleState::CancellationRequested | LifecycleState::Stopped => {
                return Err(BrokerError::Disposed);
            }
            LifecycleState::NotStarted => {}
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_e| BrokerError::NoRuntime)?;

        if !self.shared.lifecycle.try_start() {
            // Lost the race: either another caller started it or it was disposed
            return match self.state() {
                LifecycleState::Running => Ok(()),
                _ => Err(BrokerError::Disposed),
            };
        }

        // try_start succeeds once, so the store is only ever taken here
        let Some(store) = lock(&self.store).take() else {
            error!("Command broker {} has no store left to start", self.config.name);
            return Ok(());
        };
        let worker = Worker::new(store, Arc::clone(&self.shared), self.config.clone());
        let span = info_span!("command_worker", broker = %self.config.name);
        let handle = runtime.spawn(worker.run().instrument(span));
        *lock(&self.worker_handle) = Some(handle);

        info!("Command broker {} started", self.config.name);
        Ok(())
    }

    /// Queue a command for the worker and return immediately.
    /// # Errors
    /// - Returns `BrokerError::Disposed` once [`CommandBroker::dispose`] has been called;
    ///   the command is dropped
    /// - Returns `BrokerError::NoRuntime` if the worker still has to be started
    ///   and there is no tokio runtime
    pub fn send(&self, command: Command) -> Result<(), BrokerError> {
        if self.shared.lifecycle.is_cancelled() {
            self.shared.stats.record_rejected();
            warn!(
                "Command broker {} is disposed, dropping {command}",
                self.config.name
            );
            return Err(BrokerError::Disposed);
        }
        if self.state() == LifecycleState::NotStarted {
            self.start_worker()?;
        }

        let kind = command.kind().to_string();
        let queue_size = self.shared.queue.enqueue(command);
        self.shared.signal.set();
        self.shared.stats.record_sent();

        debug!(
            "Queued {kind} command on {} (queue size: {queue_size})",
            self.config.name
        );
        Ok(())
    }

    /// Ask the worker to stop and wake it so it notices. Safe to call any
    /// number of times. Does not wait for the worker; commands still queued
    /// are dropped with the broker.
    pub fn dispose(&self) {
        if self.shared.lifecycle.request_cancellation() {
            self.shared.signal.set();
            info!(
                "Command broker {} stop signal sent ({} commands still queued)",
                self.config.name,
                self.shared.queue.len()
            );
        }
    }

    /// Wait for the worker task to finish. Only returns after
    /// [`CommandBroker::dispose`] has been called, or immediately if the
    /// worker was never started or has already been awaited.
    pub async fn stopped(&self) {
        let handle = lock(&self.worker_handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Command worker {} ended abnormally: {e}", self.config.name);
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

impl<S> Drop for CommandBroker<S>
where
    S: StockStore + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
