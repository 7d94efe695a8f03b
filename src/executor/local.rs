//! In-process execution backend.
//!
//! Runs named callables from a [`Registry`] on Tokio's blocking thread pool,
//! so CPU-bound work executes in parallel without stalling the async
//! runtime. A panicking callable is reported as a crash, never propagated.

use crate::error::{PoolError, Result};
use crate::executor::{panic_message, BoxFuture, WorkUnitExecutor};
use crate::task::CallableRef;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// A registered unit of work.
pub type Callable = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Table of callables addressable by name.
///
/// # Example
///
/// ```
/// use memopool::executor::local::Registry;
/// use memopool::error::PoolError;
/// use serde_json::{json, Value};
///
/// let mut registry = Registry::new();
/// registry
///     .register("sum", |args: &[Value]| {
///         Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
///     })
///     .register("fail", |_: &[Value]| Err(PoolError::execution("always fails")));
///
/// assert!(registry.contains("sum"));
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    callables: HashMap<String, Callable>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` under `name`, replacing any previous entry.
    pub fn register<S, F>(&mut self, name: S, f: F) -> &mut Self
    where
        S: Into<String>,
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.callables.insert(name.into(), Arc::new(f));
        self
    }

    /// Looks up a callable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Callable> {
        self.callables.get(name).cloned()
    }

    /// Returns whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.callables.contains_key(name)
    }

    /// Number of registered callables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callables.len()
    }

    /// Returns whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callables.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("callables", &self.names())
            .finish()
    }
}

/// Executor that runs [`Registry`] callables on the blocking thread pool.
///
/// # Example
///
/// ```
/// use memopool::executor::local::{LocalExecutor, Registry};
/// use memopool::executor::WorkUnitExecutor;
/// use std::sync::Arc;
///
/// let executor = LocalExecutor::new(Arc::new(Registry::new()));
/// assert_eq!(executor.name(), "local");
/// ```
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    registry: Arc<Registry>,
}

impl LocalExecutor {
    /// Creates an executor over a shared registry.
    #[must_use]
    pub const fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl WorkUnitExecutor for LocalExecutor {
    fn dispatch(&self, callable: CallableRef, args: Vec<Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let f = self
                .registry
                .get(callable.name())
                .ok_or_else(|| PoolError::UnknownCallable {
                    name: callable.name().to_string(),
                })?;

            debug!("Running {callable} with {} args", args.len());

            match tokio::task::spawn_blocking(move || f(&args)).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    error!("Callable {callable} panicked: {message}");
                    Err(PoolError::WorkerCrashed { message })
                }
                Err(e) => Err(PoolError::WorkerCrashed {
                    message: e.to_string(),
                }),
            }
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .register("add", |args: &[Value]| {
                let a = args.first().and_then(Value::as_i64).unwrap_or(0);
                let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(a + b))
            })
            .register("fail", |_: &[Value]| Err(PoolError::execution("bad input")))
            .register("panic", |_: &[Value]| panic!("callable exploded"));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_local_executor_runs_callable() {
        let executor = LocalExecutor::new(registry());
        let out = executor
            .dispatch("add".into(), vec![json!(2), json!(40)])
            .await
            .unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn test_local_executor_unknown_callable() {
        let executor = LocalExecutor::new(registry());
        let err = executor.dispatch("missing".into(), vec![]).await.unwrap_err();
        assert_eq!(
            err,
            PoolError::UnknownCallable {
                name: "missing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_local_executor_callable_error() {
        let executor = LocalExecutor::new(registry());
        let err = executor.dispatch("fail".into(), vec![]).await.unwrap_err();
        assert_eq!(err, PoolError::execution("bad input"));
    }

    #[tokio::test]
    async fn test_local_executor_panic_is_crash() {
        let executor = LocalExecutor::new(registry());
        let err = executor.dispatch("panic".into(), vec![]).await.unwrap_err();
        assert_eq!(
            err,
            PoolError::WorkerCrashed {
                message: "callable exploded".to_string()
            }
        );
    }

    #[test]
    fn test_registry_names_sorted() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["add", "fail", "panic"]);
        assert!(!registry.is_empty());
        assert!(registry.get("add").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = Registry::new();
        registry.register("f", |_: &[Value]| Ok(json!(1)));
        registry.register("f", |_: &[Value]| Ok(json!(2)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("f").unwrap()(&[]).unwrap(), json!(2));
    }
}
