//! Coarse-grained locked queue.
//!
//! A `VecDeque` behind one spin lock; every operation takes the lock for
//! the shortest possible critical section. The lock discipline is a type
//! parameter, so the same queue runs with the unfair test-and-set lock or
//! the FIFO CLH lock.

use std::cell::UnsafeCell;
use std::collections::VecDeque;

use crate::lock::SpinLock;
use crate::queue::{ConcurrentQueue, Handle};

pub struct LockQueue<T, L: SpinLock> {
    lock: L,
    items: UnsafeCell<VecDeque<T>>,
}

// The lock serialises all access to `items`.
unsafe impl<T: Send, L: SpinLock + Sync> Sync for LockQueue<T, L> {}
unsafe impl<T: Send, L: SpinLock + Send> Send for LockQueue<T, L> {}

impl<T, L: SpinLock> LockQueue<T, L> {
    pub fn new(lock: L) -> Self {
        LockQueue {
            lock,
            items: UnsafeCell::new(VecDeque::new()),
        }
    }

    /// Concrete counterpart of [`ConcurrentQueue::register`], for callers
    /// that want the `len` helper too.
    pub fn handle(&self) -> LockHandle<'_, T, L> {
        LockHandle {
            queue: self,
            token: self.lock.token(),
        }
    }
}

impl<T, L: SpinLock> ConcurrentQueue<T> for LockQueue<T, L> {
    fn register(&self) -> impl Handle<T> {
        self.handle()
    }
}

/// Per-thread view of a [`LockQueue`]; carries the thread's lock slot.
pub struct LockHandle<'a, T, L: SpinLock> {
    queue: &'a LockQueue<T, L>,
    token: L::Token,
}

impl<T, L: SpinLock> LockHandle<'_, T, L> {
    /// Number of queued items. Informational: the answer can be stale by
    /// the time the caller looks at it.
    pub fn len(&mut self) -> usize {
        self.queue.lock.acquire(&mut self.token);
        let len = unsafe { &*self.queue.items.get() }.len();
        self.queue.lock.release(&mut self.token);
        len
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

impl<T, L: SpinLock> Handle<T> for LockHandle<'_, T, L> {
    fn enqueue(&mut self, item: T) {
        self.queue.lock.acquire(&mut self.token);
        unsafe { &mut *self.queue.items.get() }.push_back(item);
        self.queue.lock.release(&mut self.token);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.queue.lock.acquire(&mut self.token);
        let item = unsafe { &mut *self.queue.items.get() }.pop_front();
        self.queue.lock.release(&mut self.token);
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{ClhLock, TasLock};

    #[test]
    fn fifo_with_tas() {
        let q = LockQueue::new(TasLock::new());
        let mut h = q.register();
        for i in 0..10 {
            h.enqueue(i);
        }
        for i in 0..10 {
            assert_eq!(h.dequeue(), Some(i));
        }
        assert_eq!(h.dequeue(), None);
    }

    #[test]
    fn fifo_with_clh() {
        let q = LockQueue::new(ClhLock::new());
        let mut h = q.register();
        for i in 0..10 {
            h.enqueue(i);
        }
        for i in 0..10 {
            assert_eq!(h.dequeue(), Some(i));
        }
        assert_eq!(h.dequeue(), None);
    }

    #[test]
    fn len_tracks_contents() {
        let q = LockQueue::new(TasLock::new());
        let mut h = q.handle();
        assert!(h.is_empty());
        h.enqueue('x');
        h.enqueue('y');
        assert_eq!(h.len(), 2);
        h.dequeue();
        assert_eq!(h.len(), 1);
    }
}
