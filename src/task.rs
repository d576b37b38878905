use std::fmt;

/// The object-safe interface every wrapped callable is stored behind.
trait Callable: Send {
    fn invoke(&mut self);

    fn clone_box(&self) -> Box<dyn Callable>;
}

impl<F> Callable for F
where
    F: FnMut() + Clone + Send + 'static,
{
    fn invoke(&mut self) {
        self()
    }

    fn clone_box(&self) -> Box<dyn Callable> {
        Box::new(self.clone())
    }
}

/// A type-erased, zero-argument unit of work.
///
/// A `Task` owns exactly one callable (a closure, a function pointer, or a
/// method bound inside a closure) or nothing at all. Tasks of unrelated
/// concrete types share this one type, so they can sit in the same queue.
///
/// Cloning a `Task` deep-clones the captured state of the wrapped callable.
/// The clone and the original are fully independent afterwards; only state
/// the callable itself shares (an `Arc`, for example) is visible to both.
///
/// ```
/// use workpool::Task;
///
/// let mut calls = 0;
/// let mut task = Task::new(move || {
///     calls += 1;
///     println!("called {} times", calls);
/// });
/// let mut copy = task.clone();
///
/// task.invoke();
/// task.invoke();
/// copy.invoke(); // prints "called 1 times"
/// ```
#[derive(Default)]
pub struct Task {
    inner: Option<Box<dyn Callable>>,
}

impl Task {
    /// Wraps `f`, erasing its concrete type.
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut() + Clone + Send + 'static,
    {
        Task {
            inner: Some(Box::new(f)),
        }
    }

    /// Creates a task that wraps nothing.
    pub fn empty() -> Self {
        Task { inner: None }
    }

    /// Returns `true` if no callable is currently wrapped.
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Calls the wrapped callable.
    ///
    /// # Panics
    ///
    /// Panics if the task is empty. Check [`Task::is_empty`] first, or use
    /// [`Task::try_invoke`], whenever emptiness is possible.
    pub fn invoke(&mut self) {
        match self.inner.as_mut() {
            Some(f) => f.invoke(),
            None => panic!("invoked an empty task"),
        }
    }

    /// Calls the wrapped callable if there is one.
    ///
    /// Returns whether anything was called.
    pub fn try_invoke(&mut self) -> bool {
        match self.inner.as_mut() {
            Some(f) => {
                f.invoke();
                true
            }
            None => false,
        }
    }

    /// Replaces the wrapped callable with `f`, dropping the previous one.
    pub fn assign<F>(&mut self, f: F)
    where
        F: FnMut() + Clone + Send + 'static,
    {
        self.inner = Some(Box::new(f));
    }

    /// Moves the wrapped callable out, leaving this task empty.
    pub fn take(&mut self) -> Task {
        Task {
            inner: self.inner.take(),
        }
    }

    /// Exchanges the wrapped callables of two tasks.
    pub fn swap(&mut self, other: &mut Task) {
        std::mem::swap(&mut self.inner, &mut other.inner);
    }
}

impl Clone for Task {
    fn clone(&self) -> Self {
        Task {
            inner: self.inner.as_ref().map(|f| f.clone_box()),
        }
    }
}

impl<F> From<F> for Task
where
    F: FnMut() + Clone + Send + 'static,
{
    fn from(f: F) -> Self {
        Task::new(f)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("empty", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn bump() {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    static HITS: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn wraps_function_pointer() {
        let mut task = Task::new(bump as fn());
        let before = HITS.load(Ordering::SeqCst);
        task.invoke();
        assert!(HITS.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn clone_does_not_share_captured_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let mut count = 0;
        let mut original = Task::new(move || {
            count += 1;
            sink.lock().unwrap().push(count);
        });
        let mut copy = original.clone();

        original.invoke();
        original.invoke();
        copy.invoke();
        original.invoke();
        copy.invoke();

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 1, 3, 2]);
    }

    #[test]
    #[should_panic(expected = "invoked an empty task")]
    fn invoking_empty_task_panics() {
        let mut task = Task::default();
        task.invoke();
    }

    #[test]
    fn try_invoke_on_empty_task() {
        let mut task = Task::empty();
        assert!(task.is_empty());
        assert!(!task.try_invoke());
    }

    #[test]
    fn assign_replaces_and_releases_previous() {
        let first = Arc::new(());
        let held = Arc::clone(&first);
        let mut task = Task::new(move || {
            assert!(Arc::strong_count(&held) >= 1);
        });
        assert_eq!(Arc::strong_count(&first), 2);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        task.assign(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(Arc::strong_count(&first), 1);

        task.invoke();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_captures_once() {
        let shared = Arc::new(());
        let held = Arc::clone(&shared);
        let task = Task::new(move || {
            assert!(Arc::strong_count(&held) >= 1);
        });
        let copy = task.clone();
        assert_eq!(Arc::strong_count(&shared), 3);
        drop(task);
        drop(copy);
        assert_eq!(Arc::strong_count(&shared), 1);
    }

    #[test]
    fn take_and_swap() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut a = Task::from(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut b = Task::empty();

        a.swap(&mut b);
        assert!(a.is_empty());
        assert!(!b.is_empty());

        let mut moved = b.take();
        assert!(b.is_empty());
        moved.invoke();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
