//! Batch-splicing queue.
//!
//! Shares the Michael-Scott list layout but amortises tail contention: each
//! handle stages enqueued items in a private singly-linked fragment and
//! publishes the whole fragment with one CAS once it reaches the batch
//! threshold. Items inside a batch become visible atomically and keep their
//! staged order; batches never interleave.
//!
//! The relax policy `R` decides what a splice does after losing the tail
//! CAS to another publisher. [`BatchQueue`] retries immediately;
//! [`BackoffBatchQueue`] spreads retries out exponentially.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Shared};

use crate::backoff::{ExpBackoff, Immediate, Relax};
use crate::ms::{MsQueue, Node};
use crate::queue::{ConcurrentQueue, Handle};

/// Staging fragments smaller than this make batching pointless.
const MIN_THRESHOLD: usize = 2;
/// Default splice size.
const DEFAULT_THRESHOLD: usize = 16;

/// Lock-free FIFO queue with per-handle batch staging.
pub struct BatchQueue<T, R: Relax = Immediate> {
    shared: MsQueue<T>,
    batch_threshold: usize,
    _relax: PhantomData<R>,
}

/// [`BatchQueue`] that backs off exponentially when splices collide at the
/// shared tail.
pub type BackoffBatchQueue<T> = BatchQueue<T, ExpBackoff>;

impl<T, R: Relax> Default for BatchQueue<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R: Relax> BatchQueue<T, R> {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// `batch_threshold` is clamped to at least 2.
    pub fn with_threshold(batch_threshold: usize) -> Self {
        BatchQueue {
            shared: MsQueue::new(),
            batch_threshold: batch_threshold.max(MIN_THRESHOLD),
            _relax: PhantomData,
        }
    }

    pub fn batch_threshold(&self) -> usize {
        self.batch_threshold
    }
}

impl<T, R: Relax> ConcurrentQueue<T> for BatchQueue<T, R> {
    fn register(&self) -> impl Handle<T> {
        BatchHandle {
            queue: self,
            buf: LocalBuf::new(),
        }
    }
}

/// Private chain of staged nodes. Only the owning handle touches it, so the
/// links are plain stores until the splice CAS publishes them.
struct LocalBuf<T> {
    first: *mut Node<T>,
    last: *mut Node<T>,
    len: usize,
}

impl<T> LocalBuf<T> {
    fn new() -> Self {
        LocalBuf {
            first: ptr::null_mut(),
            last: ptr::null_mut(),
            len: 0,
        }
    }

    fn push(&mut self, item: T) {
        let node = Box::into_raw(Box::new(Node::new(item)));
        if self.first.is_null() {
            self.first = node;
        } else {
            unsafe {
                (*self.last)
                    .next
                    .store(Shared::from(node as *const Node<T>), Ordering::Relaxed);
            }
        }
        self.last = node;
        self.len += 1;
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Per-thread view of a [`BatchQueue`]; owns the staging buffer.
pub struct BatchHandle<'a, T, R: Relax> {
    queue: &'a BatchQueue<T, R>,
    buf: LocalBuf<T>,
}

impl<T, R: Relax> BatchHandle<'_, T, R> {
    /// Publishes the staged chain with a single append CAS and clears the
    /// buffer. The chain's internal links ride on the release ordering of
    /// that CAS.
    fn splice(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let guard = &epoch::pin();
        let first = Shared::from(self.buf.first as *const Node<T>);
        let last = Shared::from(self.buf.last as *const Node<T>);
        self.queue
            .shared
            .push_chain(first, last, &mut R::default(), guard);
        self.buf = LocalBuf::new();
    }
}

impl<T, R: Relax> Handle<T> for BatchHandle<'_, T, R> {
    fn enqueue(&mut self, item: T) {
        if self.buf.len >= self.queue.batch_threshold {
            self.splice();
        }
        self.buf.push(item);
    }

    fn dequeue(&mut self) -> Option<T> {
        loop {
            if let Some(item) = self.queue.shared.pop() {
                return Some(item);
            }
            if self.buf.is_empty() {
                return None;
            }
            // The shared list is empty but we are sitting on staged items;
            // publish them so a producer-that-consumes cannot starve on its
            // own pending batch.
            self.splice();
        }
    }

    fn flush(&mut self) {
        self.splice();
    }
}

impl<T, R: Relax> Drop for BatchHandle<'_, T, R> {
    fn drop(&mut self) {
        self.splice();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_clamped() {
        let q: BatchQueue<u32> = BatchQueue::with_threshold(0);
        assert_eq!(q.batch_threshold(), 2);
        let q: BatchQueue<u32> = BatchQueue::new();
        assert_eq!(q.batch_threshold(), 16);
    }

    #[test]
    fn staged_items_invisible_until_threshold() {
        let q: BatchQueue<u32> = BatchQueue::with_threshold(16);
        let mut producer = q.register();
        let mut consumer = q.register();

        for i in 0..16 {
            producer.enqueue(i);
            assert_eq!(consumer.dequeue(), None);
        }
        // The 17th enqueue publishes the full staged batch.
        producer.enqueue(16);
        for i in 0..16 {
            assert_eq!(consumer.dequeue(), Some(i));
        }
        assert_eq!(consumer.dequeue(), None);

        producer.flush();
        assert_eq!(consumer.dequeue(), Some(16));
        assert_eq!(consumer.dequeue(), None);
    }

    #[test]
    fn dequeue_drains_own_staged_batch() {
        let q: BatchQueue<&str> = BatchQueue::with_threshold(16);
        let mut h = q.register();
        h.enqueue("a");
        h.enqueue("b");
        assert_eq!(h.dequeue(), Some("a"));
        assert_eq!(h.dequeue(), Some("b"));
        assert_eq!(h.dequeue(), None);
    }

    #[test]
    fn dropping_handle_flushes() {
        let q: BatchQueue<u32> = BatchQueue::with_threshold(16);
        {
            let mut producer = q.register();
            for i in 0..5 {
                producer.enqueue(i);
            }
        }
        let mut consumer = q.register();
        for i in 0..5 {
            assert_eq!(consumer.dequeue(), Some(i));
        }
        assert_eq!(consumer.dequeue(), None);
    }

    #[test]
    fn batches_are_contiguous() {
        let q: BatchQueue<u32> = BatchQueue::with_threshold(2);
        let mut a = q.register();
        let mut b = q.register();
        a.enqueue(1);
        a.enqueue(2);
        b.enqueue(10);
        b.enqueue(20);
        a.flush();
        b.flush();
        let mut c = q.register();
        let drained: Vec<u32> = std::iter::from_fn(|| c.dequeue()).collect();
        // Each flushed pair stays adjacent whatever the splice order.
        let pos = |v: u32| drained.iter().position(|&x| x == v).unwrap();
        assert_eq!(pos(2), pos(1) + 1);
        assert_eq!(pos(20), pos(10) + 1);
        assert_eq!(drained.len(), 4);
    }
}
