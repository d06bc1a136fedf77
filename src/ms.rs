//! Michael-Scott lock-free FIFO queue.
//!
//! Singly-linked list with a permanent sentinel; `head` and `tail` are
//! independent atomics and may disagree by one node. Enqueuers link at
//! `tail.next` and swing `tail` best-effort; anyone who finds `tail` lagging
//! helps it forward, so a stalled thread never blocks global progress.
//! Retired sentinels are reclaimed through `crossbeam_epoch`, which is what
//! lets a dequeuer follow a `next` pointer without racing the free.

use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Shared};
use crossbeam_utils::CachePadded;

use crate::backoff::{Immediate, Relax};
use crate::queue::{ConcurrentQueue, Handle};

pub(crate) struct Node<T> {
    pub(crate) elem: MaybeUninit<T>,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn new(elem: T) -> Self {
        Node {
            elem: MaybeUninit::new(elem),
            next: Atomic::null(),
        }
    }

    pub(crate) fn sentinel() -> Self {
        Node {
            elem: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }
}

/// The Michael-Scott queue. Multi-producer, multi-consumer; `push` is
/// lock-free, `pop` is lock-free and returns `None` on observed empty.
pub struct MsQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MsQueue<T> {
    pub fn new() -> Self {
        let sentinel = Atomic::new(Node::sentinel());
        let tail = sentinel.clone();
        MsQueue {
            head: CachePadded::new(sentinel),
            tail: CachePadded::new(tail),
        }
    }

    pub fn push(&self, elem: T) {
        let guard = &epoch::pin();
        let new = epoch::Owned::new(Node::new(elem)).into_shared(guard);
        self.push_chain(new, new, &mut Immediate, guard);
    }

    /// Links the chain `[first..last]` at the tail and swings the tail to
    /// `last`. With `first == last` this is the plain single-node enqueue;
    /// the batching variants reuse it to splice whole staged chains.
    ///
    /// `relax` runs after each lost append CAS (direct contention only;
    /// helping a lagging tail is not contention).
    pub(crate) fn push_chain<'g>(
        &self,
        first: Shared<'g, Node<T>>,
        last: Shared<'g, Node<T>>,
        relax: &mut impl Relax,
        guard: &'g Guard,
    ) {
        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, guard);
            if tail != self.tail.load(Ordering::Acquire, guard) {
                continue;
            }
            if next.is_null() {
                // The release CAS publishes every link in the chain.
                if tail_ref
                    .next
                    .compare_exchange(
                        Shared::null(),
                        first,
                        Ordering::Release,
                        Ordering::Relaxed,
                        guard,
                    )
                    .is_ok()
                {
                    // Best effort: a helper may already have moved it.
                    let _ = self.tail.compare_exchange(
                        tail,
                        last,
                        Ordering::Release,
                        Ordering::Relaxed,
                        guard,
                    );
                    return;
                }
                relax.on_contention();
            } else {
                // Tail is lagging; help it forward and retry.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);
            if head != self.head.load(Ordering::Acquire, guard) {
                continue;
            }
            if head == tail {
                if next.is_null() {
                    return None;
                }
                // Help the lagging tail past the node we are about to take.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
            } else if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, guard)
                .is_ok()
            {
                // Winning the CAS makes this thread the only one that will
                // ever read the slot: `next` is the new sentinel and later
                // dequeuers read their value one node further on.
                let elem = unsafe {
                    guard.defer_destroy(head);
                    next.deref().elem.assume_init_read()
                };
                return Some(elem);
            }
        }
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let guard = &epoch::pin();
        let sentinel = self.head.load(Ordering::Relaxed, guard);
        unsafe { guard.defer_destroy(sentinel) };
    }
}

/// Stateless handle; the MS queue keeps nothing per thread.
pub struct MsHandle<'a, T>(&'a MsQueue<T>);

impl<T> ConcurrentQueue<T> for MsQueue<T> {
    fn register(&self) -> impl Handle<T> {
        MsHandle(self)
    }
}

impl<T> Handle<T> for MsHandle<'_, T> {
    fn enqueue(&mut self, item: T) {
        self.0.push(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        self.0.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_single_thread() {
        let q = MsQueue::new();
        for i in 0..6 {
            q.push(i);
        }
        for i in 0..6 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn empty_then_refill() {
        let q = MsQueue::new();
        assert_eq!(q.pop(), None);
        q.push("a");
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.pop(), None);
        q.push("b");
        q.push("c");
        assert_eq!(q.pop(), Some("b"));
        assert_eq!(q.pop(), Some("c"));
    }

    #[test]
    fn drops_unpopped_items() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;
        impl Drop for Counted {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        {
            let q = MsQueue::new();
            for _ in 0..5 {
                q.push(Counted);
            }
            drop(q.pop());
        }
        assert_eq!(DROPS.load(Ordering::Relaxed), 5);
    }
}
