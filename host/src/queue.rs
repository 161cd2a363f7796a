//! Shared event queue feeding a dispatch binding.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nwp_shared::{Queue, QueueError};

/// Default capacity of an [`EventQueue`]
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Cloneable handle to a mutex-guarded [`Queue`]
///
/// Producers push into one clone while the dispatch worker drains another.
/// Items are moved in and out; the lock is never held while a handler runs.
pub struct EventQueue<T, const N: usize = DEFAULT_EVENT_CAPACITY> {
    inner: Arc<Mutex<Queue<T, N>>>,
}

impl<T, const N: usize> EventQueue<T, N> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Queue::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue<T, N>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append at the tail; hands the item back when full
    pub fn push(&self, item: T) -> Result<(), T> {
        self.lock().enqueue(item)
    }

    /// Re-insert at the head, ahead of everything queued
    pub fn push_front(&self, item: T) -> Result<(), T> {
        self.lock().enqueue_head(item)
    }

    pub fn pop(&self) -> Result<T, QueueError> {
        self.lock().dequeue()
    }

    pub fn remove_matching<F>(&self, pred: F) -> Result<T, QueueError>
    where
        F: FnMut(&T) -> bool,
    {
        self.lock().remove_matching(pred)
    }

    /// Hand every queued item to `release`, returning how many there were
    pub fn flush<R>(&self, release: R) -> usize
    where
        R: FnMut(T),
    {
        self.lock().flush_all(release)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Clone for EventQueue<T, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, const N: usize> Default for EventQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for EventQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.len())
            .field("capacity", &N)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let producer: EventQueue<u32, 4> = EventQueue::new();
        let consumer = producer.clone();
        producer.push(1).unwrap();
        producer.push(2).unwrap();
        consumer.push_front(0).unwrap();
        assert_eq!(consumer.len(), 3);
        assert_eq!(consumer.pop(), Ok(0));
        assert_eq!(consumer.pop(), Ok(1));
    }

    #[test]
    fn test_full_queue_returns_item() {
        let queue: EventQueue<&str, 1> = EventQueue::new();
        queue.push("a").unwrap();
        assert_eq!(queue.push("b"), Err("b"));
    }

    #[test]
    fn test_flush_and_remove() {
        let queue: EventQueue<u8> = EventQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.remove_matching(|v| *v == 3), Ok(3));
        assert_eq!(queue.remove_matching(|v| *v == 9), Err(QueueError::NotFound));

        let mut seen = Vec::new();
        assert_eq!(queue.flush(|v| seen.push(v)), 4);
        assert_eq!(seen, [0, 1, 2, 4]);
        assert_eq!(queue.pop(), Err(QueueError::Empty));
    }
}
