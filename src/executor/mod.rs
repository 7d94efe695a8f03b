//! Execution backends for memopool.
//!
//! The pool never runs work itself. Each worker owns one
//! [`WorkUnitExecutor`], obtained from an [`ExecutorFactory`] when the worker
//! is created and again whenever a crashed worker is replaced.

pub mod local;

use crate::error::Result;
use crate::scheduler::worker::WorkerId;
use crate::task::CallableRef;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for boxed async futures.
///
/// Used to enable dynamic dispatch for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs one callable with its arguments.
///
/// The pool treats an executor as opaque: it may be slow, it may return an
/// error, and it may panic. Any `Err` or panic counts as a crash of the
/// worker that owns the executor, which is then discarded and replaced.
pub trait WorkUnitExecutor: Send + Sync {
    /// Executes `callable` with `args` and returns its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the callable is unknown or fails.
    fn dispatch(&self, callable: CallableRef, args: Vec<Value>) -> BoxFuture<'_, Result<Value>>;

    /// Returns a human-readable name for this executor.
    fn name(&self) -> &'static str;
}

impl<T: WorkUnitExecutor + ?Sized> WorkUnitExecutor for Arc<T> {
    fn dispatch(&self, callable: CallableRef, args: Vec<Value>) -> BoxFuture<'_, Result<Value>> {
        (**self).dispatch(callable, args)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Creates the executor for a new worker.
///
/// Implemented for every `Fn(WorkerId) -> E` closure where `E` is an
/// executor, so most callers pass a closure to
/// [`PoolBuilder::executor_factory`](crate::PoolBuilder::executor_factory).
pub trait ExecutorFactory: Send + Sync {
    /// Returns a fresh executor for the worker `worker_id`.
    fn create(&self, worker_id: WorkerId) -> Arc<dyn WorkUnitExecutor>;
}

impl<F, E> ExecutorFactory for F
where
    F: Fn(WorkerId) -> E + Send + Sync,
    E: WorkUnitExecutor + 'static,
{
    fn create(&self, worker_id: WorkerId) -> Arc<dyn WorkUnitExecutor> {
        Arc::new(self(worker_id))
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl WorkUnitExecutor for Echo {
        fn dispatch(&self, _callable: CallableRef, args: Vec<Value>) -> BoxFuture<'_, Result<Value>> {
            Box::pin(async move { Ok(Value::Array(args)) })
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    // Test that WorkUnitExecutor trait is object-safe (can be used with dyn)
    #[allow(dead_code)]
    fn _assert_object_safe(_executor: &dyn WorkUnitExecutor) {}

    #[tokio::test]
    async fn test_closure_factory() {
        let factory = |_id: WorkerId| Echo;
        let executor = factory.create(WorkerId::new());
        assert_eq!(executor.name(), "echo");

        let out = executor
            .dispatch(CallableRef::new("any"), vec![json!(1), json!("two")])
            .await
            .unwrap();
        assert_eq!(out, json!([1, "two"]));
    }

    #[tokio::test]
    async fn test_shared_executor_through_arc() {
        let shared = Arc::new(Echo);
        let factory = move |_id: WorkerId| Arc::clone(&shared);
        let a = factory.create(WorkerId::new());
        let b = factory.create(WorkerId::new());
        assert_eq!(a.name(), b.name());
        assert_eq!(a.dispatch("f".into(), vec![]).await.unwrap(), json!([]));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(17_u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
