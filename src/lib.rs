//! # memopool: memoizing worker pool
//!
//! memopool runs named units of work on a fixed set of workers, queues work
//! while every worker is busy, memoizes results by call fingerprint, and
//! replaces workers whose executor fails.
//!
//! ## Features
//!
//! - **Fixed pool**: `pool_size` workers are created up front and the count
//!   never shrinks, even when executors crash
//! - **FIFO admission**: excess submissions wait in arrival order; nothing is
//!   rejected for lack of capacity
//! - **LRU memoization**: repeated calls with structurally equal arguments
//!   are answered from a bounded cache
//! - **Failure isolation**: a failing task rejects only its own handle
//!
//! ## Quick Start
//!
//! ```no_run
//! use memopool::{executor::local::Registry, Pool};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> memopool::error::Result<()> {
//!     let mut registry = Registry::new();
//!     registry.register("square", |args: &[Value]| {
//!         let n = args.first().and_then(Value::as_i64).unwrap_or(0);
//!         Ok(json!(n * n))
//!     });
//!
//!     let pool = Pool::builder()
//!         .workers(4)
//!         .cache_capacity(256)
//!         .registry(registry)
//!         .build()?;
//!
//!     let first = pool.submit("square", vec![json!(12)]).await?;
//!     let again = pool.submit("square", vec![json!(12)]).await?; // served from cache
//!     assert_eq!(first, again);
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Task**: a [`CallableRef`](task::CallableRef) name plus JSON arguments
//! - **Executor**: runs one task for one worker ([`executor::WorkUnitExecutor`])
//! - **Scheduler**: FIFO queue and the Idle/Busy/Dead worker state machine
//! - **Cache**: LRU map from [`Fingerprint`](fingerprint::Fingerprint) to result
//! - **Pool**: the coordinator tying them together
//!
//! ## Memoization caveats
//!
//! Results are inserted into the cache when a task completes, not when it is
//! submitted. Two identical submissions issued before the first one finishes
//! both execute. Memoizing a non-deterministic callable returns stale values.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod scheduler;
pub mod task;

use cache::ResultCache;
use config::PoolConfig;
use error::{PoolError, Result};
use executor::local::{LocalExecutor, Registry};
use executor::{panic_message, ExecutorFactory, WorkUnitExecutor};
use fingerprint::Fingerprint;
use scheduler::worker::{Worker, WorkerId, WorkerState};
use scheduler::TaskQueue;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use task::{CallableRef, Task, TaskHandle};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Memoizing pool of workers.
///
/// All bookkeeping (worker states, queue, cache) sits behind one coordinator
/// lock; executors run outside it, in parallel.
///
/// # Example
///
/// ```no_run
/// use memopool::{executor::local::Registry, Pool};
///
/// #[tokio::main]
/// async fn main() -> memopool::error::Result<()> {
///     let pool = Pool::builder()
///         .workers(4)
///         .registry(Registry::new())
///         .build()?;
///
///     println!("Pool ready with {} workers", pool.capacity());
///     Ok(())
/// }
/// ```
pub struct Pool {
    shared: Arc<Shared>,
}

/// Point-in-time view of a pool's bookkeeping.
///
/// Diagnostic only: the values can change as soon as the snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Workers currently in the pool.
    pub live_workers: usize,
    /// Workers waiting for a task.
    pub idle_workers: usize,
    /// Workers running a task.
    pub busy_workers: usize,
    /// Tasks waiting for a worker.
    pub queued_tasks: usize,
    /// Entries in the result cache.
    pub cached_results: usize,
    /// Submissions answered from the cache.
    pub cache_hits: u64,
    /// Submissions that looked up the cache and missed.
    pub cache_misses: u64,
    /// Tasks that finished successfully.
    pub completed: u64,
    /// Tasks that failed.
    pub failed: u64,
    /// Workers replaced after a failure.
    pub replacements: u64,
}

const REPLACE_BACKOFF_MIN: Duration = Duration::from_millis(10);
const REPLACE_BACKOFF_MAX: Duration = Duration::from_secs(1);

struct Shared {
    state: Mutex<State>,
    factory: Arc<dyn ExecutorFactory>,
    runtime: Handle,
    caching: AtomicBool,
    pool_size: usize,
    timeout: Option<Duration>,
    /// Signalled whenever the pool becomes quiescent.
    drained: Notify,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: u64,
    cache_misses: u64,
    completed: u64,
    failed: u64,
    replacements: u64,
}

struct State {
    workers: HashMap<WorkerId, Worker>,
    /// Idle workers, longest-idle first.
    idle: VecDeque<WorkerId>,
    queue: TaskQueue,
    cache: ResultCache<Fingerprint, Value>,
    counters: Counters,
    /// Retired workers whose replacement is not yet installed.
    replacing: usize,
    closed: bool,
}

/// Follow-up dispatch, if any, and whether the pool is now quiescent.
type Step = (Option<Dispatch>, bool);

/// A task bound to the worker that will run it.
struct Dispatch {
    worker_id: WorkerId,
    executor: Arc<dyn WorkUnitExecutor>,
    task: Task,
}

impl Pool {
    /// Creates a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Submits `callable` with `args` and returns a handle to its result.
    ///
    /// Never blocks on worker availability. With caching enabled, a call
    /// whose fingerprint is cached resolves immediately without touching a
    /// worker. Otherwise the task goes to an idle worker, or waits in the
    /// queue until one frees up.
    ///
    /// The handle resolves to [`PoolError::ShutDown`] once
    /// [`shutdown`](Self::shutdown) has been called.
    pub fn submit<C: Into<CallableRef>>(&self, callable: C, args: Vec<Value>) -> TaskHandle {
        let callable = callable.into();
        let key = self
            .shared
            .caching
            .load(Ordering::Acquire)
            .then(|| Fingerprint::of(&callable, &args));

        let (dispatch, handle) = {
            let mut state = self.shared.lock();
            if state.closed {
                return TaskHandle::ready(Err(PoolError::ShutDown));
            }

            if let Some(key) = &key {
                if let Some(value) = state.cache.get(key).cloned() {
                    state.counters.cache_hits += 1;
                    debug!("Cache hit for {callable} ({key})");
                    return TaskHandle::ready(Ok(value));
                }
                state.counters.cache_misses += 1;
            }

            let (task, handle) = Task::new(callable, args, key);
            debug!("Task {} submitted", task.id);
            (state.admit(task), handle)
        };

        if let Some(dispatch) = dispatch {
            self.shared.spawn(dispatch);
        }
        handle
    }

    /// Returns the configured number of workers.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.pool_size
    }

    /// Returns the number of tasks waiting for a worker.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Returns whether new submissions consult the cache.
    #[must_use]
    pub fn caching_enabled(&self) -> bool {
        self.shared.caching.load(Ordering::Acquire)
    }

    /// Turns memoization on or off for subsequent submissions.
    ///
    /// Tasks already submitted keep the setting they were submitted under.
    pub fn set_caching(&self, enabled: bool) {
        info!("Result caching {}", if enabled { "enabled" } else { "disabled" });
        self.shared.caching.store(enabled, Ordering::Release);
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        self.shared.lock().cache.clear();
        debug!("Result cache cleared");
    }

    /// Returns a snapshot of the pool's bookkeeping.
    ///
    /// # Example
    ///
    /// ```
    /// use memopool::{executor::local::Registry, Pool};
    /// use serde_json::{json, Value};
    ///
    /// # tokio_test::block_on(async {
    /// let mut registry = Registry::new();
    /// registry.register("id", |args: &[Value]| Ok(args[0].clone()));
    /// let pool = Pool::builder().workers(2).registry(registry).build().unwrap();
    ///
    /// pool.submit("id", vec![json!(7)]).await.unwrap();
    /// pool.submit("id", vec![json!(7)]).await.unwrap();
    ///
    /// let stats = pool.stats();
    /// assert_eq!(stats.live_workers, 2);
    /// assert_eq!(stats.cache_hits, 1);
    /// assert_eq!(stats.completed, 1);
    /// # });
    /// ```
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        let busy_workers = state
            .workers
            .values()
            .filter(|w| w.state() == WorkerState::Busy)
            .count();

        PoolStats {
            live_workers: state.workers.len(),
            idle_workers: state.idle.len(),
            busy_workers,
            queued_tasks: state.queue.len(),
            cached_results: state.cache.len(),
            cache_hits: state.counters.cache_hits,
            cache_misses: state.counters.cache_misses,
            completed: state.counters.completed,
            failed: state.counters.failed,
            replacements: state.counters.replacements,
        }
    }

    /// Shuts down the pool gracefully.
    ///
    /// Stops admission, rejects queued tasks with [`PoolError::ShutDown`],
    /// and waits for in-flight tasks to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down pool");
        let rejected: Vec<Task> = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.queue.drain().collect()
        };

        if !rejected.is_empty() {
            info!("Rejecting {} queued tasks", rejected.len());
        }
        for task in rejected {
            task.reply.send(Err(PoolError::ShutDown));
        }

        loop {
            let drained = self.shared.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if self.shared.lock().is_quiescent() {
                break;
            }
            drained.await;
        }
        info!("Pool shut down");
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("pool_size", &self.shared.pool_size)
            .field("caching", &self.caching_enabled())
            .field("timeout", &self.shared.timeout)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn(self: &Arc<Self>, dispatch: Dispatch) {
        self.runtime.spawn(Arc::clone(self).run(dispatch));
    }

    /// Runs one task on its worker, then settles it and frees the worker.
    async fn run(self: Arc<Self>, dispatch: Dispatch) {
        let Dispatch {
            worker_id,
            executor,
            task,
        } = dispatch;
        let Task {
            id,
            callable,
            args,
            key,
            reply,
        } = task;
        debug!("Dispatching task {id} ({callable}) to worker {worker_id}");

        // Spawned separately so a panicking executor surfaces as a JoinError.
        let call = self
            .runtime
            .spawn(async move { executor.dispatch(callable, args).await });
        let abort = call.abort_handle();

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                abort.abort();
                Ok(Err(PoolError::Timeout {
                    millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }))
            }),
            None => call.await,
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(PoolError::WorkerCrashed {
                message: panic_message(e.into_panic().as_ref()),
            }),
            Err(e) => Err(PoolError::WorkerCrashed {
                message: e.to_string(),
            }),
        };

        let step = self
            .finish(worker_id, id, key, &outcome)
            .or_else(|| self.try_replace(worker_id));

        if !reply.send(outcome) {
            debug!("Handle for task {id} was dropped before completion");
        }
        match step {
            Some((next, quiescent)) => self.advance(next, quiescent),
            None => self.replenish(worker_id).await,
        }
    }

    fn advance(self: &Arc<Self>, next: Option<Dispatch>, quiescent: bool) {
        if let Some(next) = next {
            self.spawn(next);
        }
        if quiescent {
            self.drained.notify_waiters();
        }
    }

    /// Keeps retrying a failed replacement for `dead` with backoff until a
    /// worker is installed.
    async fn replenish(self: &Arc<Self>, dead: WorkerId) {
        let mut backoff = REPLACE_BACKOFF_MIN;
        loop {
            tokio::time::sleep(backoff).await;
            if let Some((next, quiescent)) = self.try_replace(dead) {
                self.advance(next, quiescent);
                return;
            }
            backoff = (backoff * 2).min(REPLACE_BACKOFF_MAX);
        }
    }

    /// Creates a replacement for the retired worker `dead` and hands it the
    /// head of the queue.
    ///
    /// The factory runs outside the coordinator lock. Returns `None` if it
    /// panicked.
    fn try_replace(&self, dead: WorkerId) -> Option<Step> {
        match panic::catch_unwind(AssertUnwindSafe(|| Worker::spawn(self.factory.as_ref()))) {
            Ok(fresh) => {
                let mut state = self.lock();
                let id = state.install(fresh);
                warn!("Replaced crashed worker {dead} with {id}");
                let next = state.hand_off(id);
                Some((next, state.is_quiescent()))
            }
            Err(payload) => {
                error!(
                    "Failed to create replacement for worker {dead}: {}",
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    /// Records a task's outcome and hands the freed worker its next task.
    ///
    /// Returns `None` when the outcome was a failure: the worker is retired
    /// and a replacement is owed.
    fn finish(
        &self,
        worker_id: WorkerId,
        task_id: task::TaskId,
        key: Option<Fingerprint>,
        outcome: &Result<Value>,
    ) -> Option<Step> {
        let mut state = self.lock();

        match outcome {
            Ok(value) => {
                if let Some(key) = key {
                    if let Some((evicted, _)) = state.cache.put(key, value.clone()) {
                        debug!("Evicted cached result {evicted}");
                    }
                }
                state.counters.completed += 1;
                if let Some(worker) = state.workers.get_mut(&worker_id) {
                    if let Err(e) = worker.release() {
                        warn!("Worker {worker_id}: {e}");
                    }
                }
                debug!("Task {task_id} completed on worker {worker_id}");
                let next = state.hand_off(worker_id);
                Some((next, state.is_quiescent()))
            }
            Err(e) => {
                state.counters.failed += 1;
                warn!("Task {task_id} failed on worker {worker_id}: {e}");
                state.retire(worker_id);
                None
            }
        }
    }
}

impl State {
    /// Binds `task` to an idle worker, or queues it if none is free.
    fn admit(&mut self, task: Task) -> Option<Dispatch> {
        while let Some(worker_id) = self.idle.pop_front() {
            if let Some(worker) = self.workers.get_mut(&worker_id) {
                if worker.assign().is_ok() {
                    return Some(Dispatch {
                        worker_id,
                        executor: worker.executor(),
                        task,
                    });
                }
            }
        }
        self.queue.push_back(task);
        None
    }

    /// Gives the just-freed worker the head of the queue, or parks it idle.
    fn hand_off(&mut self, worker_id: WorkerId) -> Option<Dispatch> {
        if self.queue.is_empty() {
            self.idle.push_back(worker_id);
            return None;
        }

        let worker = self.workers.get_mut(&worker_id)?;
        worker.assign().ok()?;
        let executor = worker.executor();
        let task = self.queue.pop_front()?;
        debug!("Worker {worker_id} picked up queued task {}", task.id);
        Some(Dispatch {
            worker_id,
            executor,
            task,
        })
    }

    /// Removes a failed worker; its replacement is owed until [`install`](Self::install).
    fn retire(&mut self, dead: WorkerId) {
        if let Some(mut worker) = self.workers.remove(&dead) {
            if let Err(e) = worker.fail() {
                warn!("Worker {dead}: {e}");
            }
            debug!("Worker {dead} retired after {} tasks", worker.completed());
        }
        self.replacing += 1;
    }

    fn install(&mut self, fresh: Worker) -> WorkerId {
        let id = fresh.id();
        self.workers.insert(id, fresh);
        self.replacing = self.replacing.saturating_sub(1);
        self.counters.replacements += 1;
        id
    }

    /// No task queued, no replacement owed and every worker idle.
    fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.replacing == 0 && self.idle.len() == self.workers.len()
    }
}

/// Builder for `Pool`.
#[derive(Default)]
pub struct PoolBuilder {
    config: PoolConfig,
    factory: Option<Arc<dyn ExecutorFactory>>,
}

impl PoolBuilder {
    /// Sets the number of workers.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.config.pool_size = count;
        self
    }

    /// Enables or disables memoization.
    #[must_use]
    pub fn caching(mut self, enabled: bool) -> Self {
        self.config.caching_enabled = enabled;
        self
    }

    /// Sets the maximum number of cached results.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Fails any task that runs longer than `timeout`.
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config.task_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Replaces all settings with `config`.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs tasks in-process from `registry`, one [`LocalExecutor`] per worker.
    #[must_use]
    pub fn registry(self, registry: Registry) -> Self {
        let registry = Arc::new(registry);
        self.executor_factory(move |_id: WorkerId| LocalExecutor::new(Arc::clone(&registry)))
    }

    /// Uses `factory` to create each worker's executor.
    #[must_use]
    pub fn executor_factory<F: ExecutorFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Builds the pool and creates all workers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if a size is zero, if no executor
    /// source was given, or if called outside a Tokio runtime.
    pub fn build(self) -> Result<Pool> {
        self.config.validate()?;

        let factory = self.factory.ok_or_else(|| PoolError::InvalidConfig {
            reason: "no executor configured: call registry() or executor_factory()".to_string(),
        })?;

        let runtime = Handle::try_current().map_err(|_| PoolError::InvalidConfig {
            reason: "Pool must be built inside a Tokio runtime".to_string(),
        })?;

        let PoolConfig {
            pool_size,
            caching_enabled,
            cache_capacity,
            ..
        } = self.config;

        info!(
            "Initializing pool with {pool_size} workers (caching: {caching_enabled}, cache capacity: {cache_capacity})"
        );

        let mut workers = HashMap::with_capacity(pool_size);
        let mut idle = VecDeque::with_capacity(pool_size);
        for _ in 0..pool_size {
            let worker = Worker::spawn(factory.as_ref());
            idle.push_back(worker.id());
            workers.insert(worker.id(), worker);
        }

        let state = State {
            workers,
            idle,
            queue: TaskQueue::new(),
            cache: ResultCache::new(cache_capacity),
            counters: Counters::default(),
            replacing: 0,
            closed: false,
        };

        Ok(Pool {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                factory,
                runtime,
                caching: AtomicBool::new(caching_enabled),
                pool_size,
                timeout: self.config.task_timeout(),
                drained: Notify::new(),
            }),
        })
    }
}
