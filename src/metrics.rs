//! Per-operation timing accumulation and run summaries.
//!
//! One [`MetricsRecorder`] is shared by every thread in a run; all counters
//! are atomics, so recording never takes a lock. Control operations (the
//! poison handshake) are tallied separately from data operations. Summary
//! output goes to stdout and, optionally, to a timestamped file; the file
//! write is diagnostic only, so its errors are logged and swallowed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    total_enq_ns: AtomicU64,
    total_deq_ns: AtomicU64,
    total_latency_ns: AtomicU64,

    enq_ops: AtomicU64,
    deq_ops: AtomicU64,
    processed: AtomicU64,

    control_enq_ops: AtomicU64,
    control_deq_ops: AtomicU64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueue(&self, elapsed: Duration) {
        self.total_enq_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.enq_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dequeue(&self, elapsed: Duration) {
        self.total_deq_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.deq_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_control_enqueue(&self, elapsed: Duration) {
        self.total_enq_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.control_enq_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_control_dequeue(&self, elapsed: Duration) {
        self.total_deq_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.control_deq_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_latency(&self, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_enqueue_ns(&self) -> f64 {
        safe_divide(
            self.total_enq_ns.load(Ordering::Relaxed),
            self.enq_ops.load(Ordering::Relaxed) + self.control_enq_ops.load(Ordering::Relaxed),
        )
    }

    pub fn avg_dequeue_ns(&self) -> f64 {
        safe_divide(
            self.total_deq_ns.load(Ordering::Relaxed),
            self.deq_ops.load(Ordering::Relaxed) + self.control_deq_ops.load(Ordering::Relaxed),
        )
    }

    pub fn avg_request_latency_ns(&self) -> f64 {
        safe_divide(
            self.total_latency_ns.load(Ordering::Relaxed),
            self.processed.load(Ordering::Relaxed),
        )
    }

    pub fn enqueue_ops(&self) -> u64 {
        self.enq_ops.load(Ordering::Relaxed)
    }

    pub fn dequeue_ops(&self) -> u64 {
        self.deq_ops.load(Ordering::Relaxed)
    }

    pub fn control_enqueue_ops(&self) -> u64 {
        self.control_enq_ops.load(Ordering::Relaxed)
    }

    pub fn control_dequeue_ops(&self) -> u64 {
        self.control_deq_ops.load(Ordering::Relaxed)
    }

    pub fn processed_requests(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Snapshot of the run for reporting.
    pub fn summary(&self, runtime: Duration) -> Summary {
        Summary {
            runtime,
            avg_enqueue_ns: self.avg_enqueue_ns(),
            avg_dequeue_ns: self.avg_dequeue_ns(),
            avg_latency_ns: self.avg_request_latency_ns(),
            enq_ops: self.enqueue_ops(),
            deq_ops: self.dequeue_ops(),
            control_enq_ops: self.control_enqueue_ops(),
            control_deq_ops: self.control_dequeue_ops(),
            processed: self.processed_requests(),
        }
    }

    /// Prints the summary to stdout.
    pub fn print_summary(&self, runtime: Duration) {
        println!("{}", self.summary(runtime));
    }

    /// Prints the summary and also writes it to
    /// `{prefix}_results_{timestamp}.txt`, creating parent directories as
    /// needed. Write failures are logged, never propagated.
    pub fn write_summary(&self, prefix: &Path, runtime: Duration) {
        let summary = self.summary(runtime);
        println!("{summary}");

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let mut filename = prefix.as_os_str().to_owned();
        filename.push(format!("_results_{timestamp}.txt"));
        let path = PathBuf::from(filename);

        if let Err(err) = write_file(&path, &summary) {
            log::error!("failed to write results to {}: {err}", path.display());
        } else {
            log::info!("results written to {}", path.display());
        }
    }
}

fn write_file(path: &Path, summary: &Summary) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{summary}\n"))
}

fn safe_divide(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// Formats a nanosecond quantity at a human scale.
fn fmt_ns(ns: f64) -> String {
    if ns >= 1_000_000.0 {
        format!("{:.2} ms", ns / 1_000_000.0)
    } else if ns >= 1_000.0 {
        format!("{:.2} µs", ns / 1_000.0)
    } else {
        format!("{ns:.2} ns")
    }
}

/// Aggregate view of one benchmark run.
#[derive(Debug, Clone)]
pub struct Summary {
    pub runtime: Duration,
    pub avg_enqueue_ns: f64,
    pub avg_dequeue_ns: f64,
    pub avg_latency_ns: f64,
    pub enq_ops: u64,
    pub deq_ops: u64,
    pub control_enq_ops: u64,
    pub control_deq_ops: u64,
    pub processed: u64,
}

impl Summary {
    /// Processed requests per second; zero for a zero-length run.
    pub fn throughput(&self) -> f64 {
        let secs = self.runtime.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.processed as f64 / secs
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== Run Summary ====")?;
        writeln!(f, "Total runtime: {:.2} ms", self.runtime.as_secs_f64() * 1e3)?;
        writeln!(f, "Avg enqueue time: {}", fmt_ns(self.avg_enqueue_ns))?;
        writeln!(f, "Avg dequeue time: {}", fmt_ns(self.avg_dequeue_ns))?;
        writeln!(
            f,
            "Avg end-to-end request latency: {}",
            fmt_ns(self.avg_latency_ns)
        )?;
        writeln!(f, "Throughput: {:.2} reqs/sec", self.throughput())?;
        write!(
            f,
            "Ops count  -> Enq: {} (+{} control)  Deq: {} (+{} control)  Processed: {}",
            self.enq_ops, self.control_enq_ops, self.deq_ops, self.control_deq_ops, self.processed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_are_zero_when_idle() {
        let m = MetricsRecorder::new();
        assert_eq!(m.avg_enqueue_ns(), 0.0);
        assert_eq!(m.avg_dequeue_ns(), 0.0);
        assert_eq!(m.avg_request_latency_ns(), 0.0);
        assert_eq!(m.summary(Duration::ZERO).throughput(), 0.0);
    }

    #[test]
    fn data_and_control_ops_counted_apart() {
        let m = MetricsRecorder::new();
        m.record_enqueue(Duration::from_nanos(100));
        m.record_enqueue(Duration::from_nanos(300));
        m.record_control_enqueue(Duration::from_nanos(200));
        m.record_dequeue(Duration::from_nanos(50));
        m.record_control_dequeue(Duration::from_nanos(150));

        assert_eq!(m.enqueue_ops(), 2);
        assert_eq!(m.control_enqueue_ops(), 1);
        assert_eq!(m.dequeue_ops(), 1);
        assert_eq!(m.control_dequeue_ops(), 1);
        // Control time folds into the same totals.
        assert_eq!(m.avg_enqueue_ns(), 200.0);
        assert_eq!(m.avg_dequeue_ns(), 100.0);
    }

    #[test]
    fn latency_average() {
        let m = MetricsRecorder::new();
        m.record_request_latency(Duration::from_nanos(1_000));
        m.record_request_latency(Duration::from_nanos(3_000));
        assert_eq!(m.avg_request_latency_ns(), 2_000.0);
        assert_eq!(m.processed_requests(), 2);
    }

    #[test]
    fn summary_formats_scales() {
        assert_eq!(fmt_ns(12.0), "12.00 ns");
        assert_eq!(fmt_ns(1_500.0), "1.50 µs");
        assert_eq!(fmt_ns(2_500_000.0), "2.50 ms");
    }
}
