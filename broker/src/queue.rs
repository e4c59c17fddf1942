use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::command::Command;

/// Unbounded FIFO of pending commands. Any number of producers, one consumer.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    commands: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and return the queue size after the push
    pub(crate) fn enqueue(&self, command: Command) -> usize {
        let mut commands = self.lock();
        commands.push_back(command);
        commands.len()
    }

    pub(crate) fn try_dequeue(&self) -> Option<Command> {
        self.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Held only for a single push or pop, so a poisoned lock still guards a
    // consistent deque.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
