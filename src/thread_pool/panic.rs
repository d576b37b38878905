use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Task;

/// Callback run on the worker thread after a task panicked.
///
/// Receives the task that failed and a description of the panic.
pub type PanicHook = Arc<dyn Fn(&Task, &TaskPanic) + Send + Sync + 'static>;

pub(crate) fn noop_hook() -> PanicHook {
    Arc::new(|_: &Task, _: &TaskPanic| {})
}

/// A panic caught at the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPanic {
    worker: usize,
    message: String,
}

impl TaskPanic {
    pub(crate) fn from_payload(worker: usize, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_owned()
        };
        TaskPanic { worker, message }
    }

    /// Id of the worker that ran the task.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// The panic message, if it was a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked on worker {}: {}", self.worker, self.message)
    }
}
