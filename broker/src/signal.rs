use tokio::sync::Notify;

/// Single-slot, auto-resetting wake-up for the worker.
///
/// Setting the signal while nobody waits stores one permit; further sets
/// coalesce into that same permit. `wait` consumes it.
#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    notify: Notify,
}

impl WakeSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }
}
