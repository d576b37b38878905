use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::atomic::AtomicCell;
use log::{debug, error, info, warn};

use super::panic::{noop_hook, PanicHook, TaskPanic};
use super::queue::TaskQueue;
use crate::{PoolConfig, PoolError, Result, ShutdownPolicy, Task};

/// Lifecycle of a [`WorkerPool`].
///
/// States only ever move forward:
/// `Uninitialized -> Running -> ShuttingDown -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Constructed, no worker spawned yet.
    Uninitialized,
    /// Workers are running and tasks are accepted.
    Running,
    /// Shutdown began; no task is accepted any more.
    ShuttingDown,
    /// Every worker has exited.
    Stopped,
}

/// State the workers share with the pool handle.
struct Shared {
    queue: TaskQueue<Task>,
    completed: AtomicUsize,
    panicked: AtomicUsize,
}

struct Worker {
    id: usize,
    handle: JoinHandle<()>,
}

/// A fixed-size pool of worker threads fed from one FIFO task queue.
///
/// The pool is an ordinary value: build it with [`WorkerPool::new`], start
/// it with [`WorkerPool::init`], and stop it with [`WorkerPool::shutdown`]
/// (or by dropping it). All methods take `&self`, so the pool can be put
/// behind an `Arc` and fed from several producer threads.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use workpool::{PoolConfig, WorkerPool};
///
/// let pool = WorkerPool::new(PoolConfig::default().with_threads(4))?;
/// pool.init()?;
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..3 {
///     let counter = Arc::clone(&counter);
///     pool.spawn(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })?;
/// }
///
/// pool.shutdown()?;
/// assert_eq!(counter.load(Ordering::SeqCst), 3);
/// # Ok::<(), workpool::PoolError>(())
/// ```
pub struct WorkerPool {
    config: PoolConfig,
    state: AtomicCell<PoolState>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<Worker>>,
    worker_threads: Mutex<Vec<ThreadId>>,
    spawned: AtomicUsize,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
    panic_hook: PanicHook,
}

impl WorkerPool {
    /// Creates a pool for `config`. No thread is spawned until
    /// [`init`](WorkerPool::init).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            queue: TaskQueue::new(config.capacity),
            completed: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
        };
        Ok(WorkerPool {
            config,
            state: AtomicCell::new(PoolState::Uninitialized),
            shared: Arc::new(shared),
            workers: Mutex::new(Vec::new()),
            worker_threads: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
            stopped: Mutex::new(false),
            stopped_cv: Condvar::new(),
            panic_hook: noop_hook(),
        })
    }

    /// Installs a callback that receives every task that panics.
    ///
    /// Only takes effect for workers spawned afterwards, so call it before
    /// [`init`](WorkerPool::init). The hook runs on the worker thread; a
    /// panic inside it is logged and the worker carries on.
    pub fn with_panic_hook<H>(mut self, hook: H) -> Self
    where
        H: Fn(&Task, &TaskPanic) + Send + Sync + 'static,
    {
        self.panic_hook = Arc::new(hook);
        self
    }

    /// The parallelism hint of the host, which is also the default worker
    /// count. Available without any pool.
    pub fn max_worker_count() -> usize {
        num_cpus::get()
    }

    /// Spawns the workers and starts accepting tasks.
    ///
    /// A worker thread that fails to spawn is skipped with a warning, so the
    /// pool may run with fewer workers than configured; see
    /// [`worker_count`](WorkerPool::worker_count).
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyStarted`] if the pool left the uninitialized state
    /// already, [`PoolError::NoWorkers`] if not a single worker could be
    /// spawned. The pool is stopped in the latter case.
    pub fn init(&self) -> Result<()> {
        let mut workers = lock(&self.workers);
        self.state
            .compare_exchange(PoolState::Uninitialized, PoolState::Running)
            .map_err(|_| PoolError::AlreadyStarted)?;

        for id in 0..self.config.threads {
            match self.spawn_worker(id) {
                Ok(handle) => workers.push(Worker { id, handle }),
                Err(e) => warn!("Failed to spawn worker {id}: {e}"),
            }
        }
        self.spawned.store(workers.len(), Ordering::Release);
        *lock(&self.worker_threads) = workers
            .iter()
            .map(|worker| worker.handle.thread().id())
            .collect();

        if workers.is_empty() {
            self.shared.queue.close();
            self.mark_stopped();
            return Err(PoolError::NoWorkers);
        }

        info!(
            "Worker pool started with {} of {} workers",
            workers.len(),
            self.config.threads
        );
        Ok(())
    }

    fn spawn_worker(&self, id: usize) -> std::io::Result<JoinHandle<()>> {
        let mut builder =
            thread::Builder::new().name(format!("{}-{id}", self.config.thread_name_prefix));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }
        let shared = Arc::clone(&self.shared);
        let hook = Arc::clone(&self.panic_hook);
        builder.spawn(move || run_worker(id, &shared, &hook))
    }

    /// Queues `task` for execution by one of the workers.
    ///
    /// Blocks while a bounded queue is full.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotStarted`] before [`init`](WorkerPool::init),
    /// [`PoolError::ShutDown`] once shutdown has begun, including while the
    /// call was blocked on a full queue.
    pub fn submit(&self, task: Task) -> Result<()> {
        match self.state.load() {
            PoolState::Running => {}
            PoolState::Uninitialized => return Err(PoolError::NotStarted),
            PoolState::ShuttingDown | PoolState::Stopped => return Err(PoolError::ShutDown),
        }
        self.shared
            .queue
            .push(task)
            .map_err(|_| PoolError::ShutDown)
    }

    /// Wraps `f` in a [`Task`] and submits it.
    pub fn spawn<F>(&self, f: F) -> Result<()>
    where
        F: FnMut() + Clone + Send + 'static,
    {
        self.submit(Task::new(f))
    }

    /// Stops the pool and waits for every worker to exit.
    ///
    /// Under [`ShutdownPolicy::Drain`] every task queued so far still runs;
    /// under [`ShutdownPolicy::CancelPending`] queued tasks are dropped and
    /// only the tasks already running finish. Calling this again, or on a pool
    /// that was never started, is a no-op; a concurrent caller blocks until
    /// the first one has stopped the pool.
    ///
    /// Called from inside a task, e.g. by dropping the last `Arc` of the
    /// pool, the calling worker is not joined. It exits by itself once the
    /// queue is closed and empty.
    ///
    /// # Errors
    ///
    /// [`PoolError::WorkerPanicked`] if a worker thread died outside the
    /// task boundary. All other workers are still joined.
    pub fn shutdown(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(PoolState::Uninitialized, PoolState::Stopped)
            .is_ok()
        {
            self.shared.queue.close();
            self.mark_stopped();
            return Ok(());
        }
        if self
            .state
            .compare_exchange(PoolState::Running, PoolState::ShuttingDown)
            .is_err()
        {
            self.wait_stopped();
            return Ok(());
        }

        match self.config.shutdown_policy {
            ShutdownPolicy::Drain => {
                info!("Shutting down, draining {} queued tasks", self.pending());
                self.shared.queue.close();
            }
            ShutdownPolicy::CancelPending => {
                let dropped = self.shared.queue.cancel();
                info!("Shutting down, dropped {dropped} queued tasks");
            }
        }

        let current = thread::current().id();
        let mut result = Ok(());
        let mut workers = lock(&self.workers);
        for worker in workers.drain(..) {
            if worker.handle.thread().id() == current {
                debug!("Worker {} shuts the pool down, detaching it", worker.id);
                continue;
            }
            if worker.handle.join().is_err() {
                error!("Worker {} terminated abnormally", worker.id);
                result = Err(PoolError::WorkerPanicked(worker.id));
            }
        }
        drop(workers);
        self.mark_stopped();
        info!(
            "Worker pool stopped: {} tasks completed, {} panicked",
            self.completed(),
            self.panicked()
        );
        result
    }

    fn mark_stopped(&self) {
        self.state.store(PoolState::Stopped);
        *lock(&self.stopped) = true;
        self.stopped_cv.notify_all();
    }

    /// Blocks until another caller's shutdown completed. A worker thread
    /// returns at once, since that shutdown may be joining it.
    fn wait_stopped(&self) {
        let current = thread::current().id();
        if lock(&self.worker_threads).contains(&current) {
            return;
        }
        let stopped = lock(&self.stopped);
        drop(
            self.stopped_cv
                .wait_while(stopped, |stopped| !*stopped)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.state.load()
    }

    /// Number of workers actually spawned by [`init`](WorkerPool::init).
    pub fn worker_count(&self) -> usize {
        self.spawned.load(Ordering::Acquire)
    }

    /// Number of tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of tasks that ran to completion.
    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Number of tasks that panicked.
    pub fn panicked(&self) -> usize {
        self.shared.panicked.load(Ordering::Relaxed)
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Error while dropping worker pool: {e}");
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("state", &self.state())
            .field("workers", &self.worker_count())
            .field("queue", &self.shared.queue)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The consume loop of one worker thread.
///
/// Exits when the queue reports closed and empty. The task runs outside the
/// queue lock, and a panic inside it is caught here so the worker survives.
fn run_worker(id: usize, shared: &Shared, hook: &PanicHook) {
    debug!("Worker {id} started");
    while let Some(mut task) = shared.queue.pop() {
        debug!("Worker {id} executing task");
        match catch_unwind(AssertUnwindSafe(|| task.invoke())) {
            Ok(()) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                shared.panicked.fetch_add(1, Ordering::Relaxed);
                let panic = TaskPanic::from_payload(id, payload);
                error!("Worker {id}: {panic}, continuing");
                if catch_unwind(AssertUnwindSafe(|| hook(&task, &panic))).is_err() {
                    error!("Worker {id}: panic hook panicked, continuing");
                }
            }
        }
    }
    debug!("Worker {id}: queue closed, shutting down");
}
