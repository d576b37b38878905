#![deny(missing_docs)]

//! A fixed-size worker thread pool.
//!
//! Work is submitted as [`Task`]s, type-erased clonable callables, and run
//! on a fixed set of worker threads fed from one FIFO [`TaskQueue`]. The
//! queue can be bounded, in which case submitting blocks while it is full.
//! Shutdown either drains or cancels what is still queued, as chosen by
//! [`ShutdownPolicy`].

mod config;
mod error;
mod task;
pub mod thread_pool;

pub use config::{PoolConfig, ShutdownPolicy};
pub use error::{PoolError, Result};
pub use task::Task;
pub use thread_pool::{
    PanicHook, PoolState, PushError, TaskPanic, TaskQueue, TryPushError, WorkerPool,
};
