use std::time::Duration;

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for a [`crate::CommandBroker`]
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Name attached to the worker's log span
    pub name: String,
    /// Pause before re-entering a drain after the store could not hand out a
    /// session or a drain cycle panicked
    pub retry_backoff: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: String::from("stock-broker"),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
}
