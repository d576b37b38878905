use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Returned by [`TaskQueue::push`] when the queue is closed.
///
/// Carries the rejected item back to the caller.
pub struct PushError<T>(pub T);

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pushing onto a closed queue")
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Returned by [`TaskQueue::try_push`].
pub enum TryPushError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The queue is closed.
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Gives back the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("Full(..)"),
            TryPushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("pushing onto a full queue"),
            TryPushError::Closed(_) => f.write_str("pushing onto a closed queue"),
        }
    }
}

impl<T> std::error::Error for TryPushError<T> {}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A FIFO queue shared between producers and consumers.
///
/// All state lives behind one mutex. Consumers park on `not_empty`, and
/// producers of a bounded queue park on `not_full`. Closing the queue wakes
/// everybody: producers fail from then on, while consumers keep draining
/// whatever is left and get `None` once the queue is empty.
pub struct TaskQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> TaskQueue<T> {
    /// Creates a queue holding at most `capacity` items, or any number of
    /// items if `capacity` is `None`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is `Some(0)`.
    pub fn new(capacity: Option<usize>) -> Self {
        assert_ne!(capacity, Some(0), "queue capacity must be at least 1");
        TaskQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Creates a queue that never blocks producers.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Creates a queue holding at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    // Items are only moved in and out under the lock, so a panic elsewhere
    // cannot leave the state half-updated.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, state: &State<T>) -> bool {
        self.capacity
            .is_some_and(|capacity| state.items.len() >= capacity)
    }

    /// Appends `item` to the tail.
    ///
    /// On a bounded queue this blocks while the queue is full. Fails only if
    /// the queue is closed, either before the call or while waiting.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let state = self.lock();
        let mut state = self
            .not_full
            .wait_while(state, |state| !state.closed && self.is_full(state))
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(PushError(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `item` to the tail without blocking.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(TryPushError::Closed(item));
        }
        if self.is_full(&state) {
            return Err(TryPushError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes and returns the head, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub fn pop(&self) -> Option<T> {
        let state = self.lock();
        let state = self
            .not_empty
            .wait_while(state, |state| !state.closed && state.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        self.take_head(state)
    }

    /// Like [`pop`](TaskQueue::pop), but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let state = self.lock();
        let (state, _) = self
            .not_empty
            .wait_timeout_while(state, timeout, |state| {
                !state.closed && state.items.is_empty()
            })
            .unwrap_or_else(PoisonError::into_inner);
        self.take_head(state)
    }

    fn take_head(&self, mut state: MutexGuard<'_, State<T>>) -> Option<T> {
        let item = state.items.pop_front();
        drop(state);
        if item.is_some() && self.capacity.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Closes the queue. Pending items stay poppable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Closes the queue and drops every pending item.
    ///
    /// Returns how many items were dropped.
    pub fn cancel(&self) -> usize {
        let pending = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.items)
        };
        self.not_empty.notify_all();
        self.not_full.notify_all();
        // dropped outside the lock
        pending.len()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Returns `true` once [`close`](TaskQueue::close) or
    /// [`cancel`](TaskQueue::cancel) was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// The bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<T> fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TaskQueue")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pops_in_insertion_order() {
        let queue = TaskQueue::unbounded();
        for i in 0..10 {
            queue.push(i).unwrap();
        }
        let popped: Vec<_> = (0..10).map(|_| queue.pop().unwrap()).collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn try_push_reports_full_and_closed() {
        let queue = TaskQueue::bounded(2);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert!(matches!(queue.try_push(3), Err(TryPushError::Full(3))));
        assert_eq!(queue.len(), 2);

        queue.close();
        assert_eq!(queue.try_push(4).unwrap_err().into_inner(), 4);
    }

    #[test]
    fn close_keeps_pending_items_poppable() {
        let queue = TaskQueue::unbounded();
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.close();

        assert!(queue.push("c").is_err());
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn cancel_drops_pending_items() {
        let queue = TaskQueue::bounded(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.cancel(), 2);
        assert!(queue.is_closed());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue = Arc::new(TaskQueue::<u32>::unbounded());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn close_wakes_blocked_producer() {
        let queue = Arc::new(TaskQueue::bounded(1));
        queue.push(1).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2).map_err(|PushError(item)| item))
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert_eq!(producer.join().unwrap(), Err(2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_timeout_on_empty_queue() {
        let queue = TaskQueue::<u32>::unbounded();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), None);
        queue.push(7).unwrap();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), Some(7));
    }

    #[test]
    #[should_panic(expected = "queue capacity must be at least 1")]
    fn zero_capacity_is_rejected() {
        let _ = TaskQueue::<u32>::bounded(0);
    }
}
