//! Error types for memopool.
//!
//! Every failure a caller can observe is a variant of [`PoolError`]; nothing
//! in the engine panics on a failed task.

use crate::scheduler::worker::WorkerState;
use thiserror::Error;

/// Result type alias for memopool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Error type for all memopool operations.
///
/// Errors are `Clone` so the same failure can be logged by the pool and
/// delivered to the task's caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The callable ran and reported an error.
    #[error("Task execution failed: {message}")]
    ExecutionFailed {
        /// Human-readable error message.
        message: String,
    },

    /// The executor panicked or died while running the task.
    #[error("Worker crashed: {message}")]
    WorkerCrashed {
        /// Panic payload or crash description.
        message: String,
    },

    /// Task exceeded the configured execution bound.
    #[error("Task timeout exceeded: {millis}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        millis: u64,
    },

    /// The executor has no callable registered under this name.
    #[error("Unknown callable: {name}")]
    UnknownCallable {
        /// Name that was looked up.
        name: String,
    },

    /// Invalid pool configuration.
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig {
        /// Reason why the configuration is invalid.
        reason: String,
    },

    /// A worker was asked to make a transition its state machine forbids.
    #[error("Invalid worker transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// State the worker was in.
        from: WorkerState,
        /// State that was requested.
        to: WorkerState,
    },

    /// The pool no longer accepts submissions.
    #[error("Pool is shut down")]
    ShutDown,

    /// The task was dropped without being settled (its runtime went away).
    #[error("Task abandoned before completion")]
    Abandoned,
}

impl PoolError {
    /// Builds an [`PoolError::ExecutionFailed`] from any displayable message.
    ///
    /// Convenience for callables registered with
    /// [`Registry`](crate::executor::local::Registry).
    #[must_use]
    pub fn execution<S: Into<String>>(message: S) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }
}
