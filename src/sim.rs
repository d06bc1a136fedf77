//! Synthetic server simulation.
//!
//! A closer model of the workload the queues are meant for than the raw
//! benchmark loop: client threads generate requests with randomised
//! inter-arrival gaps, worker threads pull them off the shared ingress
//! queue and burn a randomised CPU quantum per request. Shutdown uses the
//! same poison handshake as the harness.

use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::message::Message;
use crate::metrics::MetricsRecorder;
use crate::queue::{ConcurrentQueue, Handle};

/// Shape of one simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub clients: usize,
    pub workers: usize,
    pub requests_per_client: usize,
    /// Upper bound on the random pause between a client's requests.
    pub max_arrival_delay_us: u64,
    /// Mean synthetic service time per request; actual work is drawn
    /// uniformly from `[mean/2, 3*mean/2)`.
    pub mean_work_us: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            clients: 4,
            workers: 4,
            requests_per_client: 50_000,
            max_arrival_delay_us: 50,
            mean_work_us: 1_000,
        }
    }
}

/// Runs the full simulation and returns its wall-clock runtime.
pub fn run_simulation<Q>(queue: &Q, config: &SimConfig, metrics: &MetricsRecorder) -> Duration
where
    Q: ConcurrentQueue<Message> + Sync,
{
    let start = Instant::now();
    thread::scope(|s| {
        for _ in 0..config.workers {
            s.spawn(|| worker_loop(queue.register(), metrics, config.mean_work_us));
        }

        let clients: Vec<_> = (0..config.clients)
            .map(|c| {
                let start_id = (c * config.requests_per_client) as u64;
                s.spawn(move || {
                    generate_requests(
                        queue.register(),
                        start_id,
                        config.requests_per_client,
                        config.max_arrival_delay_us,
                        metrics,
                    )
                })
            })
            .collect();
        for client in clients {
            client.join().expect("client thread panicked");
        }

        let mut control = queue.register();
        for _ in 0..config.workers {
            let t0 = Instant::now();
            control.enqueue(Message::poison());
            metrics.record_control_enqueue(t0.elapsed());
        }
        control.flush();
    });
    start.elapsed()
}

/// Client loop: paced request submission.
pub fn generate_requests(
    mut handle: impl Handle<Message>,
    start_id: u64,
    count: usize,
    max_delay_us: u64,
    metrics: &MetricsRecorder,
) {
    let mut rng = rand::thread_rng();
    for i in 0..count {
        let id = start_id + i as u64;
        let mut req = Message::new(id, format!("req-{id}"));
        req.mark_enqueued();
        let t0 = Instant::now();
        handle.enqueue(req);
        metrics.record_enqueue(t0.elapsed());

        if max_delay_us > 0 {
            thread::sleep(Duration::from_nanos(rng.gen_range(0..max_delay_us * 1_000)));
        }
    }
}

/// Worker loop: drain, do synthetic work, exit on poison.
pub fn worker_loop(mut handle: impl Handle<Message>, metrics: &MetricsRecorder, mean_work_us: u64) {
    let mut rng = rand::thread_rng();
    loop {
        let t0 = Instant::now();
        match handle.dequeue() {
            None => thread::yield_now(),
            Some(msg) if msg.is_poison() => {
                metrics.record_control_dequeue(t0.elapsed());
                return;
            }
            Some(mut req) => {
                metrics.record_dequeue(t0.elapsed());
                req.mark_dequeued();
                // Floor at 1ns so instantaneous hops still count.
                let latency = req.latency().max(Duration::from_nanos(1));
                metrics.record_request_latency(latency);

                let work = rng.gen_range(mean_work_us / 2..=mean_work_us * 3 / 2);
                busy_wait(Duration::from_micros(work));
            }
        }
    }
}

/// CPU-bound spin for the given span; the service time model, so it must
/// not yield or sleep.
fn busy_wait(span: Duration) {
    let start = Instant::now();
    while start.elapsed() < span {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::ClhLock;
    use crate::lock_queue::LockQueue;

    #[test]
    fn simulation_processes_every_request() {
        let queue = LockQueue::new(ClhLock::new());
        let config = SimConfig {
            clients: 2,
            workers: 2,
            requests_per_client: 200,
            max_arrival_delay_us: 1,
            mean_work_us: 2,
        };
        let metrics = MetricsRecorder::new();
        run_simulation(&queue, &config, &metrics);
        assert_eq!(metrics.processed_requests(), 400);
        assert_eq!(metrics.control_dequeue_ops(), 2);
    }
}
