use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters, updated by producers and the worker without locking
#[derive(Debug, Default)]
pub(crate) struct BrokerStats {
    sent: AtomicU64,
    rejected: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    unrecognized: AtomicU64,
    drain_cycles: AtomicU64,
    commits: AtomicU64,
    commit_failures: AtomicU64,
    changes_persisted: AtomicU64,
    session_failures: AtomicU64,
    recovered_panics: AtomicU64,
}

/// Point-in-time copy of the broker counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Commands accepted by `send`
    pub sent: u64,
    /// Commands refused because the broker was disposed
    pub rejected: u64,
    pub applied: u64,
    pub failed: u64,
    pub unrecognized: u64,
    pub drain_cycles: u64,
    pub commits: u64,
    pub commit_failures: u64,
    pub changes_persisted: u64,
    pub session_failures: u64,
    pub recovered_panics: u64,
}

impl StatsSnapshot {
    /// Commands the worker has taken off the queue so far
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.applied + self.failed + self.unrecognized
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl BrokerStats {
    pub(crate) fn record_sent(&self) {
        bump(&self.sent);
    }

    pub(crate) fn record_rejected(&self) {
        bump(&self.rejected);
    }

    pub(crate) fn record_applied(&self) {
        bump(&self.applied);
    }

    pub(crate) fn record_failed(&self) {
        bump(&self.failed);
    }

    pub(crate) fn record_unrecognized(&self) {
        bump(&self.unrecognized);
    }

    pub(crate) fn record_drain_cycle(&self) {
        bump(&self.drain_cycles);
    }

    pub(crate) fn record_commit(&self, changes: usize) {
        bump(&self.commits);
        self.changes_persisted.fetch_add(
            u64::try_from(changes).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub(crate) fn record_commit_failure(&self) {
        bump(&self.commit_failures);
    }

    pub(crate) fn record_session_failure(&self) {
        bump(&self.session_failures);
    }

    pub(crate) fn record_recovered_panic(&self) {
        bump(&self.recovered_panics);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            drain_cycles: self.drain_cycles.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            changes_persisted: self.changes_persisted.load(Ordering::Relaxed),
            session_failures: self.session_failures.load(Ordering::Relaxed),
            recovered_panics: self.recovered_panics.load(Ordering::Relaxed),
        }
    }
}
