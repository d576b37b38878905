use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PoolError, Result};

const DEFAULT_THREAD_NAME_PREFIX: &str = "workpool-worker";

/// What happens to queued tasks when the pool shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownPolicy {
    /// Workers keep dequeuing until the queue is empty, then exit.
    #[default]
    Drain,
    /// Queued tasks are dropped; workers exit once their running task ends.
    CancelPending,
}

/// Configuration of a [`WorkerPool`](crate::WorkerPool).
///
/// Every field has a default, so a JSON document only needs to name the
/// fields it overrides:
///
/// ```json
/// { "threads": 4, "capacity": 16, "shutdown_policy": "cancel-pending" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Maximum queue length. `None` means the queue never blocks producers.
    pub capacity: Option<usize>,
    /// Treatment of queued tasks on shutdown.
    pub shutdown_policy: ShutdownPolicy,
    /// Worker threads are named `"{prefix}-{id}"`.
    pub thread_name_prefix: String,
    /// Stack size of worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            threads: num_cpus::get(),
            capacity: None,
            shutdown_policy: ShutdownPolicy::default(),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Reads a configuration from a JSON file.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: PoolConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the number of worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Bounds the queue to `capacity` tasks.
    pub fn bounded(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Removes any queue bound.
    pub fn unbounded(mut self) -> Self {
        self.capacity = None;
        self
    }

    /// Sets the shutdown policy.
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Sets the worker thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the worker thread stack size.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Checks the configuration for values no pool can run with.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(PoolError::InvalidConfig(
                "thread count must be at least 1".to_owned(),
            ));
        }
        if self.capacity == Some(0) {
            return Err(PoolError::InvalidConfig(
                "queue capacity must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
