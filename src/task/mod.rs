//! Tasks and the handles callers await.
//!
//! A task is a [`CallableRef`] plus its argument list. Callables are
//! addressed by name: the executor resolves the name to something it knows
//! how to run, so no code ever travels with a task.

use crate::error::{PoolError, Result};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Unique identifier for a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a unit of work an executor can run.
///
/// Two references denote the same callable iff their names are equal; the
/// name is part of the result cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallableRef(String);

impl CallableRef {
    /// Creates a reference to the callable registered as `name`.
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    /// Returns the callable's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallableRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for CallableRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work owned by the pool from submission until it is settled.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) callable: CallableRef,
    pub(crate) args: Vec<Value>,
    /// Cache key, present iff caching was enabled when the task was submitted.
    pub(crate) key: Option<Fingerprint>,
    pub(crate) reply: Reply,
}

impl Task {
    /// Creates a task together with the handle its caller will await.
    pub(crate) fn new(
        callable: CallableRef,
        args: Vec<Value>,
        key: Option<Fingerprint>,
    ) -> (Self, TaskHandle) {
        let id = TaskId::new();
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id,
            callable,
            args,
            key,
            reply: Reply(tx),
        };
        (task, TaskHandle { id, rx })
    }
}

/// Sending half of a task's result.
///
/// Consumed by [`Reply::send`], so a task settles at most once; dropping it
/// unsent resolves the handle to [`PoolError::Abandoned`].
#[derive(Debug)]
pub(crate) struct Reply(oneshot::Sender<Result<Value>>);

impl Reply {
    /// Settles the task. Returns `false` if the caller dropped its handle.
    pub(crate) fn send(self, outcome: Result<Value>) -> bool {
        self.0.send(outcome).is_ok()
    }
}

/// Future resolving to a submitted task's result.
///
/// Dropping a handle does not cancel the task.
///
/// # Example
///
/// ```no_run
/// use memopool::{executor::local::Registry, Pool};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> memopool::error::Result<()> {
///     let mut registry = Registry::new();
///     registry.register("double", |args| Ok(json!(args[0].as_i64().unwrap_or(0) * 2)));
///
///     let pool = Pool::builder().workers(2).registry(registry).build()?;
///     let handle = pool.submit("double", vec![json!(21)]);
///     println!("task {} submitted", handle.id());
///     assert_eq!(handle.await?, json!(42));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl TaskHandle {
    /// Creates a handle that is already settled with `outcome`.
    pub(crate) fn ready(outcome: Result<Value>) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(outcome);
        Self {
            id: TaskId::new(),
            rx,
        }
    }

    /// Returns the task's ID.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }
}

impl Future for TaskHandle {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PoolError::Abandoned)))
    }
}
