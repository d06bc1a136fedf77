//! spliceq - a family of concurrent FIFO queues under one contract, plus the
//! benchmark harness that compares them on a synthetic server workload.
//!
//! Variants:
//! - [`LockQueue`]: coarse-grained locking, generic over the spin-lock
//!   discipline ([`TasLock`] or the FIFO local-spin [`ClhLock`]).
//! - [`MsQueue`]: the Michael-Scott lock-free queue, reclaimed through
//!   `crossbeam_epoch`.
//! - [`BatchQueue`]: MS layout with per-handle staging; whole batches are
//!   spliced onto the shared tail with one CAS.
//! - [`BackoffBatchQueue`]: the batch queue with exponential backoff on
//!   splice contention.
//!
//! All variants are used through [`ConcurrentQueue::register`], which hands
//! each thread a [`Handle`] owning its per-thread state:
//!
//! ```
//! use spliceq::{ConcurrentQueue, Handle, MsQueue};
//!
//! let queue = MsQueue::new();
//! let mut handle = queue.register();
//! handle.enqueue(42);
//! assert_eq!(handle.dequeue(), Some(42));
//! assert_eq!(handle.dequeue(), None);
//! ```

#![warn(rust_2018_idioms)]

pub mod backoff;
pub mod batch;
pub mod harness;
pub mod lock;
pub mod lock_queue;
pub mod message;
pub mod metrics;
pub mod ms;
pub mod queue;
pub mod sim;

pub use backoff::{ExpBackoff, Immediate, Relax};
pub use batch::{BackoffBatchQueue, BatchQueue};
pub use lock::{ClhLock, SpinLock, TasLock};
pub use lock_queue::LockQueue;
pub use message::Message;
pub use metrics::{MetricsRecorder, Summary};
pub use ms::MsQueue;
pub use queue::{ConcurrentQueue, Handle};
