use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    NotStarted,
    Running,
    CancellationRequested,
    Stopped,
}

impl LifecycleState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::CancellationRequested => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::CancellationRequested,
            _ => Self::Stopped,
        }
    }
}

/// Worker lifecycle shared between the broker handle and its worker task
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    token: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::NotStarted.as_u8()),
            token: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `NotStarted -> Running`. Only one caller ever gets `true`.
    pub(crate) fn try_start(&self) -> bool {
        self.transition(LifecycleState::NotStarted, LifecycleState::Running)
    }

    /// Cancel the token and move out of the running states.
    /// Returns `true` for the call that performed the transition.
    pub(crate) fn request_cancellation(&self) -> bool {
        let requested = self.transition(
            LifecycleState::Running,
            LifecycleState::CancellationRequested,
        ) || self.transition(LifecycleState::NotStarted, LifecycleState::Stopped);
        self.token.cancel();
        requested
    }

    pub(crate) fn mark_stopped(&self) {
        self.state
            .store(LifecycleState::Stopped.as_u8(), Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
