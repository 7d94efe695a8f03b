//! Worker handles and their lifecycle.
//!
//! ```text
//!   Idle --assign--> Busy --release--> Idle
//!                     |
//!                     +----fail----> Dead   (never reused)
//! ```

use crate::error::{PoolError, Result};
use crate::executor::{ExecutorFactory, WorkUnitExecutor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for a worker.
///
/// A replacement worker always gets a fresh ID, so an ID never refers to
/// two different executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Creates a new random worker ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    /// Waiting for a task.
    Idle,
    /// Running a task.
    Busy,
    /// Its executor failed; the worker has been retired.
    Dead,
}

/// Long-lived handle to one executor instance.
pub(crate) struct Worker {
    id: WorkerId,
    state: WorkerState,
    executor: Arc<dyn WorkUnitExecutor>,
    completed: u64,
}

impl Worker {
    /// Creates an idle worker with a fresh executor from `factory`.
    pub(crate) fn spawn(factory: &dyn ExecutorFactory) -> Self {
        let id = WorkerId::new();
        let executor = factory.create(id);
        debug!("Worker {id} started with {} executor", executor.name());
        Self {
            id,
            state: WorkerState::Idle,
            executor,
            completed: 0,
        }
    }

    pub(crate) const fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) const fn state(&self) -> WorkerState {
        self.state
    }

    /// Number of tasks this worker finished successfully.
    pub(crate) const fn completed(&self) -> u64 {
        self.completed
    }

    pub(crate) fn executor(&self) -> Arc<dyn WorkUnitExecutor> {
        Arc::clone(&self.executor)
    }

    /// Idle -> Busy.
    pub(crate) fn assign(&mut self) -> Result<()> {
        self.transition(WorkerState::Idle, WorkerState::Busy)
    }

    /// Busy -> Idle, after a successful task.
    pub(crate) fn release(&mut self) -> Result<()> {
        self.transition(WorkerState::Busy, WorkerState::Idle)?;
        self.completed += 1;
        Ok(())
    }

    /// Busy -> Dead, after a failed task.
    pub(crate) fn fail(&mut self) -> Result<()> {
        self.transition(WorkerState::Busy, WorkerState::Dead)
    }

    fn transition(&mut self, from: WorkerState, to: WorkerState) -> Result<()> {
        if self.state != from {
            return Err(PoolError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("executor", &self.executor.name())
            .field("completed", &self.completed)
            .finish()
    }
}
