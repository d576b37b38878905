use std::io;
use thiserror::Error;

/// Error type for worker pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// IO error, e.g. while reading a config file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed configuration document.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// The configuration failed validation.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A task was submitted before the pool was started.
    #[error("Pool has not been started")]
    NotStarted,

    /// A task was submitted after shutdown began.
    #[error("Pool is shut down")]
    ShutDown,

    /// `init` was called on a pool that already left the uninitialized state.
    #[error("Pool has already been started")]
    AlreadyStarted,

    /// Not a single worker thread could be spawned.
    #[error("No worker thread could be spawned")]
    NoWorkers,

    /// A worker thread terminated abnormally and could not be joined cleanly.
    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Result type alias for worker pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
