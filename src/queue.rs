//! The queue contract shared by every variant in this crate.
//!
//! Queues are registered against rather than called directly: a thread asks
//! the shared queue for a [`Handle`] and performs all of its operations
//! through it. The handle owns whatever per-thread state the variant needs
//! (a CLH lock slot, a staging buffer), so nothing hides in thread-local
//! storage and everything is torn down when the handle goes out of scope.

/// A FIFO queue shared between threads.
pub trait ConcurrentQueue<T> {
    /// Returns a per-thread handle used for enqueues and dequeues.
    fn register(&self) -> impl Handle<T>;
}

/// A per-thread view of a [`ConcurrentQueue`].
pub trait Handle<T> {
    /// Appends `item` to the logical tail. Never fails.
    fn enqueue(&mut self, item: T);

    /// Removes and returns the oldest remaining item, or `None` when the
    /// queue is observed empty. Lock-free variants may report emptiness
    /// spuriously while a concurrent enqueue is still in flight; callers
    /// that need an item simply retry.
    fn dequeue(&mut self) -> Option<T>;

    /// Publishes any privately staged items. A no-op for unbatched variants.
    fn flush(&mut self) {}
}
