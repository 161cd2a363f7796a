//! # Queue Primitive
//!
//! A fixed-capacity singly-linked FIFO whose links live in an index arena
//! instead of inside the queued values. Ownership moves in and out by value:
//! [`Queue::enqueue`] takes the node, [`Queue::dequeue`] hands it back, and the
//! queue never clones or inspects a node beyond the predicates it is given.
//!
//! ## Memory Layout
//!
//! ```text
//!            head                         tail
//!             │                            │
//!             ▼                            ▼
//! slots: ┌────────┬────────┬────────┬────────┬────────┐
//!        │ Used 0 │ Free   │ Used 2 │ Used 3 │ Free   │   (pool grows lazily
//!        │ next=3 │ next=4 │ next=0 │ next=- │ next=- │    up to N slots)
//!        └────────┴────────┴────────┴────────┴────────┘
//!                    ▲
//!                  free
//! ```
//!
//! Dequeued slots go on a free list and are reused before the pool grows.
//! [`Queue::deinit`] releases every remaining node and then drops the pool.
//!
//! ## Synchronisation
//!
//! None. Callers that share a queue across contexts wrap it in their own
//! mutex or critical section.
//!
//! ## Atomicity
//!
//! Each method either completes or returns without touching the links: a
//! full queue hands the node back through `Err`, an empty or unmatched queue
//! is reported before anything is unlinked.

use core::fmt;
use core::mem;

use heapless::Vec;

use crate::status::LinkError;

const NIL: usize = usize::MAX;

/// Errors reported by queue operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// The queue holds no nodes
    Empty,
    /// No node satisfied the predicate
    NotFound,
}

impl From<QueueError> for LinkError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Empty => LinkError::Empty,
            QueueError::NotFound => LinkError::NotFound,
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        LinkError::from(*self).fmt(f)
    }
}

enum Slot<T> {
    Used { item: T, next: usize },
    Free { next: usize },
}

/// Arena-backed FIFO queue holding at most `N` nodes
pub struct Queue<T, const N: usize> {
    slots: Vec<Slot<T>, N>,
    head: usize,
    tail: usize,
    free: usize,
    len: usize,
}

impl<T, const N: usize> Queue<T, N> {
    /// Create an empty queue; no slots are reserved until the first enqueue
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: NIL,
            tail: NIL,
            free: NIL,
            len: 0,
        }
    }

    /// Maximum number of nodes the queue can hold
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of queued nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Append a node at the tail
    ///
    /// Returns the node back if the queue is full.
    pub fn enqueue(&mut self, item: T) -> Result<(), T> {
        let idx = self.alloc(item, NIL)?;
        if self.tail == NIL {
            self.head = idx;
        } else {
            self.set_next(self.tail, idx);
        }
        self.tail = idx;
        self.len += 1;
        Ok(())
    }

    /// Insert a node at the head, ahead of everything already queued
    ///
    /// Used to put back work that was dequeued but not consumed.
    pub fn enqueue_head(&mut self, item: T) -> Result<(), T> {
        let idx = self.alloc(item, self.head)?;
        if self.tail == NIL {
            self.tail = idx;
        }
        self.head = idx;
        self.len += 1;
        Ok(())
    }

    /// Remove and return the node at the head
    pub fn dequeue(&mut self) -> Result<T, QueueError> {
        if self.head == NIL {
            return Err(QueueError::Empty);
        }
        let idx = self.head;
        let next = self.next_of(idx);
        self.unlink(NIL, idx, next);
        Ok(self.release(idx))
    }

    /// Borrow the node at the head without removing it
    pub fn peek(&self) -> Option<&T> {
        self.item(self.head)
    }

    /// Remove and return the first node (from the head) matching `pred`
    pub fn remove_matching<F>(&mut self, mut pred: F) -> Result<T, QueueError>
    where
        F: FnMut(&T) -> bool,
    {
        if self.head == NIL {
            return Err(QueueError::Empty);
        }

        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            let next = self.next_of(cur);
            if self.item(cur).is_some_and(&mut pred) {
                self.unlink(prev, cur, next);
                return Ok(self.release(cur));
            }
            prev = cur;
            cur = next;
        }
        Err(QueueError::NotFound)
    }

    /// Remove every node matching `pred`, handing each one to `release`
    ///
    /// Returns the number of nodes released. Relative order of the nodes that
    /// stay queued is preserved.
    pub fn flush_matching<F, R>(&mut self, mut pred: F, mut release: R) -> usize
    where
        F: FnMut(&T) -> bool,
        R: FnMut(T),
    {
        let mut released = 0;
        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            let next = self.next_of(cur);
            if self.item(cur).is_some_and(&mut pred) {
                self.unlink(prev, cur, next);
                release(self.release(cur));
                released += 1;
            } else {
                prev = cur;
            }
            cur = next;
        }
        released
    }

    /// Remove every node, handing each one to `release` in FIFO order
    pub fn flush_all<R>(&mut self, release: R) -> usize
    where
        R: FnMut(T),
    {
        self.flush_matching(|_| true, release)
    }

    /// Flush every node and drop the slot pool
    ///
    /// The queue is empty and reusable afterwards; the pool is rebuilt on
    /// demand by the next enqueue.
    pub fn deinit<R>(&mut self, release: R) -> usize
    where
        R: FnMut(T),
    {
        let released = self.flush_all(release);
        self.slots.clear();
        self.free = NIL;
        released
    }

    /// Iterate over queued nodes from head to tail
    pub fn iter(&self) -> Iter<'_, T, N> {
        Iter {
            queue: self,
            cur: self.head,
        }
    }

    /// Visit every queued node mutably, from head to tail
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut T),
    {
        let mut cur = self.head;
        while cur != NIL {
            let next = match &mut self.slots[cur] {
                Slot::Used { item, next } => {
                    f(item);
                    *next
                }
                Slot::Free { .. } => NIL,
            };
            cur = next;
        }
    }

    fn alloc(&mut self, item: T, next: usize) -> Result<usize, T> {
        if self.free != NIL {
            let idx = self.free;
            self.free = self.next_of(idx);
            self.slots[idx] = Slot::Used { item, next };
            return Ok(idx);
        }

        match self.slots.push(Slot::Used { item, next }) {
            Ok(()) => Ok(self.slots.len() - 1),
            Err(Slot::Used { item, .. }) => Err(item),
            // Only Used slots are pushed above.
            Err(Slot::Free { .. }) => unreachable!(),
        }
    }

    fn release(&mut self, idx: usize) -> T {
        let free = Slot::Free { next: self.free };
        match mem::replace(&mut self.slots[idx], free) {
            Slot::Used { item, .. } => {
                self.free = idx;
                item
            }
            // Linked indices always point at Used slots.
            Slot::Free { .. } => unreachable!(),
        }
    }

    /// Detach `cur` from the chain; `prev` is NIL when `cur` is the head
    fn unlink(&mut self, prev: usize, cur: usize, next: usize) {
        if prev == NIL {
            self.head = next;
        } else {
            self.set_next(prev, next);
        }
        if self.tail == cur {
            self.tail = prev;
        }
        self.len -= 1;
    }

    fn item(&self, idx: usize) -> Option<&T> {
        match self.slots.get(idx) {
            Some(Slot::Used { item, .. }) => Some(item),
            _ => None,
        }
    }

    fn next_of(&self, idx: usize) -> usize {
        match self.slots.get(idx) {
            Some(Slot::Used { next, .. }) | Some(Slot::Free { next }) => *next,
            None => NIL,
        }
    }

    fn set_next(&mut self, idx: usize, to: usize) {
        if let Some(Slot::Used { next, .. }) = self.slots.get_mut(idx) {
            *next = to;
        }
    }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for Queue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Head-to-tail iterator returned by [`Queue::iter`]
pub struct Iter<'a, T, const N: usize> {
    queue: &'a Queue<T, N>,
    cur: usize,
}

impl<'a, T, const N: usize> Iterator for Iter<'a, T, N> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        match self.queue.slots.get(self.cur) {
            Some(Slot::Used { item, next }) => {
                self.cur = *next;
                Some(item)
            }
            _ => None,
        }
    }
}
