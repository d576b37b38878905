//! The worker pool and the queue feeding it.
//!
//! Producers hand [`Task`](crate::Task)s to [`WorkerPool::submit`]; they land
//! in a [`TaskQueue`] and each idle worker takes the head, runs it outside
//! the queue lock, and comes back for more.

mod panic;
mod pool;
mod queue;

pub use self::panic::{PanicHook, TaskPanic};
pub use self::pool::{PoolState, WorkerPool};
pub use self::queue::{PushError, TaskQueue, TryPushError};
