//! Producer/consumer benchmark harness.
//!
//! Producers hammer `enqueue` with id-stamped messages; consumers poll
//! `dequeue` until they observe a poison message. Termination is the usual
//! handshake: once every producer has finished (and flushed), the harness
//! enqueues exactly one poison per consumer. Every operation is timed into
//! a shared [`MetricsRecorder`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::message::Message;
use crate::metrics::{MetricsRecorder, Summary};
use crate::queue::{ConcurrentQueue, Handle};

/// Shape of one benchmark run.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub producers: usize,
    pub consumers: usize,
    pub messages_per_producer: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            producers: 4,
            consumers: 4,
            messages_per_producer: 100_000,
        }
    }
}

impl WorkloadConfig {
    pub fn total_messages(&self) -> usize {
        self.producers * self.messages_per_producer
    }
}

/// Runs the workload against `queue`, recording into `metrics`. Returns the
/// wall-clock runtime from first spawn to last consumer exit.
pub fn run_workload<Q>(queue: &Q, config: &WorkloadConfig, metrics: &MetricsRecorder) -> Duration
where
    Q: ConcurrentQueue<Message> + Sync,
{
    let start = Instant::now();
    thread::scope(|s| {
        for _ in 0..config.consumers {
            s.spawn(|| consumer_loop(queue.register(), metrics));
        }

        let producers: Vec<_> = (0..config.producers)
            .map(|p| {
                let start_id = (p * config.messages_per_producer) as u64;
                let count = config.messages_per_producer;
                s.spawn(move || producer_loop(queue.register(), start_id, count, metrics))
            })
            .collect();
        for handle in producers {
            handle.join().expect("producer thread panicked");
        }

        // One poison per consumer, timed as control traffic. The flush
        // matters for the batching variants, which would otherwise stage
        // the poisons past the consumers' patience.
        let mut control = queue.register();
        for _ in 0..config.consumers {
            let t0 = Instant::now();
            control.enqueue(Message::poison());
            metrics.record_control_enqueue(t0.elapsed());
        }
        control.flush();
        // Scope exit joins the consumers.
    });
    start.elapsed()
}

/// Convenience wrapper: fresh recorder, one run, summarised.
pub fn run_benchmark<Q>(queue: &Q, config: &WorkloadConfig) -> Summary
where
    Q: ConcurrentQueue<Message> + Sync,
{
    let metrics = MetricsRecorder::new();
    let runtime = run_workload(queue, config, &metrics);
    metrics.summary(runtime)
}

fn producer_loop(
    mut handle: impl Handle<Message>,
    start_id: u64,
    count: usize,
    metrics: &MetricsRecorder,
) {
    for i in 0..count {
        let id = start_id + i as u64;
        let mut msg = Message::new(id, format!("msg-{id}"));
        msg.mark_enqueued();
        let t0 = Instant::now();
        handle.enqueue(msg);
        metrics.record_enqueue(t0.elapsed());
    }
    // Handle drop flushes any staged tail batch.
}

fn consumer_loop(mut handle: impl Handle<Message>, metrics: &MetricsRecorder) {
    loop {
        let t0 = Instant::now();
        match handle.dequeue() {
            None => {
                // Empty may be transient while producers are still running.
                std::hint::spin_loop();
            }
            Some(msg) if msg.is_poison() => {
                metrics.record_control_dequeue(t0.elapsed());
                return;
            }
            Some(mut msg) => {
                metrics.record_dequeue(t0.elapsed());
                msg.mark_dequeued();
                metrics.record_request_latency(msg.latency());
            }
        }
    }
}

/// Logs a warning if a run outlives its deadline. Armed per benchmark
/// variant so a livelocked queue is visible instead of silently hanging the
/// whole sweep.
pub struct Watchdog {
    cancel: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm(label: &str, timeout: Duration) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let label = label.to_owned();
        let thread = thread::spawn(move || {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if flag.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(Duration::from_millis(50));
            }
            log::warn!("{label} still running after {timeout:?}; it may be stuck");
        });
        Watchdog {
            cancel,
            thread: Some(thread),
        }
    }

    pub fn disarm(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ms::MsQueue;

    #[test]
    fn workload_conserves_messages() {
        let queue: MsQueue<Message> = MsQueue::new();
        let config = WorkloadConfig {
            producers: 2,
            consumers: 2,
            messages_per_producer: 500,
        };
        let summary = run_benchmark(&queue, &config);
        assert_eq!(summary.enq_ops, 1_000);
        assert_eq!(summary.deq_ops, 1_000);
        assert_eq!(summary.processed, 1_000);
        assert_eq!(summary.control_enq_ops, 2);
        assert_eq!(summary.control_deq_ops, 2);
    }

    #[test]
    fn watchdog_disarms_quietly() {
        let wd = Watchdog::arm("test-run", Duration::from_secs(60));
        wd.disarm();
    }
}
