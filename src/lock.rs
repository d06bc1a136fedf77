//! Spin locks backing the lock-based queue.
//!
//! Two disciplines are provided: a test-and-set lock (single shared flag,
//! global spin, no fairness) and a CLH queue lock (FIFO, each waiter spins
//! on a flag only it caches). Both expose the same capability: `acquire`
//! blocks until the caller holds the lock, `release` hands it over, and a
//! release happens-before the next acquire.
//!
//! Per-thread lock state lives in a token handed out by [`SpinLock::token`],
//! which the caller threads through `acquire`/`release`. The test-and-set
//! lock has no such state and uses a unit token.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crossbeam_utils::CachePadded;

/// Mutual-exclusion capability over a caller-held token.
///
/// An `acquire` must be paired with a `release` on the same token before the
/// token is dropped; dropping a token that still holds the lock leaves the
/// lock unusable.
pub trait SpinLock {
    /// Per-thread slot state. Created once per thread, reused across rounds.
    type Token;

    /// Creates a fresh token for the calling thread.
    fn token(&self) -> Self::Token;

    /// Blocks (spinning) until the calling token holds the lock.
    fn acquire(&self, token: &mut Self::Token);

    /// Releases the lock held by `token`.
    fn release(&self, token: &mut Self::Token);
}

/// Test-and-set lock: one shared atomic flag, everyone spins on it.
///
/// The baseline discipline. Unfair, and under contention every waiter
/// hammers the same cache line.
#[derive(Debug, Default)]
pub struct TasLock {
    state: AtomicBool,
}

impl TasLock {
    pub fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }
}

impl SpinLock for TasLock {
    type Token = ();

    fn token(&self) -> Self::Token {}

    fn acquire(&self, _token: &mut Self::Token) {
        while self.state.swap(true, Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }

    fn release(&self, _token: &mut Self::Token) {
        self.state.store(false, Ordering::Release);
    }
}

/// One waiter slot. Padded so each spinning thread owns its cache line.
type ClhNode = CachePadded<AtomicBool>;

fn alloc_node(locked: bool) -> *mut ClhNode {
    Box::into_raw(Box::new(CachePadded::new(AtomicBool::new(locked))))
}

/// CLH queue lock: fair, FIFO, local-spin.
///
/// The lock is a virtual linked list of waiter slots threaded through an
/// atomic `tail`. To acquire, a thread marks its own slot locked, swaps it
/// into `tail`, and spins on the *previous* tail's flag; to release it
/// clears its slot and recycles the predecessor slot for its next round, so
/// steady-state acquisition allocates nothing. Acquisition order is exactly
/// the order of tail swaps.
#[derive(Debug)]
pub struct ClhLock {
    tail: AtomicPtr<ClhNode>,
}

/// A thread's slot pair for [`ClhLock`]: the node it currently owns and the
/// predecessor observed at the last acquire.
#[derive(Debug)]
pub struct ClhToken {
    my: *mut ClhNode,
    pred: *mut ClhNode,
}

// Tokens only ever dereference nodes reachable through the owning lock, and
// the protocol hands each node to exactly one owner at a time.
unsafe impl Send for ClhToken {}

impl ClhLock {
    pub fn new() -> Self {
        Self {
            tail: AtomicPtr::new(alloc_node(false)),
        }
    }
}

impl Default for ClhLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinLock for ClhLock {
    type Token = ClhToken;

    fn token(&self) -> ClhToken {
        ClhToken {
            my: alloc_node(false),
            pred: ptr::null_mut(),
        }
    }

    fn acquire(&self, token: &mut ClhToken) {
        // The AcqRel swap below publishes the flag store.
        unsafe { (*token.my).store(true, Ordering::Relaxed) };
        let pred = self.tail.swap(token.my, Ordering::AcqRel);
        token.pred = pred;
        while unsafe { (*pred).load(Ordering::Acquire) } {
            std::hint::spin_loop();
        }
    }

    fn release(&self, token: &mut ClhToken) {
        unsafe { (*token.my).store(false, Ordering::Release) };
        // Recycle the predecessor slot: nobody else references it once its
        // successor (us) has entered the critical section.
        token.my = token.pred;
        token.pred = ptr::null_mut();
    }
}

impl Drop for ClhToken {
    fn drop(&mut self) {
        // At rest the token owns exactly one slot; the one it abandoned at
        // the last release lives on in the tail chain.
        if !self.my.is_null() {
            drop(unsafe { Box::from_raw(self.my) });
        }
    }
}

impl Drop for ClhLock {
    fn drop(&mut self) {
        // The node tail points at belongs to no token: every releaser
        // abandons its slot there and adopts its predecessor's instead.
        let tail = *self.tail.get_mut();
        drop(unsafe { Box::from_raw(tail) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn hammer<L: SpinLock + Sync>(lock: &L, threads: usize, rounds: usize) -> usize {
        // Split load/store so lost updates show up if exclusion is broken.
        let counter = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| {
                    let mut token = lock.token();
                    for _ in 0..rounds {
                        lock.acquire(&mut token);
                        let seen = counter.load(Ordering::Relaxed);
                        std::hint::spin_loop();
                        counter.store(seen + 1, Ordering::Relaxed);
                        lock.release(&mut token);
                    }
                });
            }
        });
        counter.load(Ordering::Relaxed)
    }

    #[test]
    fn tas_mutual_exclusion() {
        let lock = TasLock::new();
        assert_eq!(hammer(&lock, 8, 1_000), 8_000);
    }

    #[test]
    fn clh_mutual_exclusion() {
        let lock = ClhLock::new();
        assert_eq!(hammer(&lock, 8, 1_000), 8_000);
    }

    #[test]
    fn clh_token_reuse_across_rounds() {
        let lock = ClhLock::new();
        let mut token = lock.token();
        for _ in 0..100 {
            lock.acquire(&mut token);
            lock.release(&mut token);
        }
    }

    #[test]
    fn clh_uncontended_handoff() {
        let lock = ClhLock::new();
        let mut a = lock.token();
        let mut b = lock.token();
        lock.acquire(&mut a);
        lock.release(&mut a);
        lock.acquire(&mut b);
        lock.release(&mut b);
    }
}
