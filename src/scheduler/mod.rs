//! Task queueing and worker bookkeeping.
//!
//! [`TaskQueue`] holds tasks that arrived while every worker was busy, in
//! strict arrival order. There is no priority and no bound: excess demand
//! waits, it is never rejected.

pub mod worker;

use crate::task::Task;
use std::collections::VecDeque;
use tracing::debug;

/// FIFO of tasks waiting for an idle worker.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a task at the tail.
    pub(crate) fn push_back(&mut self, task: Task) {
        debug!("Queueing task {} ({} already waiting)", task.id, self.tasks.len());
        self.tasks.push_back(task);
    }

    /// Removes the oldest waiting task.
    pub(crate) fn pop_front(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Removes every waiting task, oldest first.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Task> + '_ {
        self.tasks.drain(..)
    }
}
