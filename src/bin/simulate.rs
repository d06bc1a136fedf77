//! Server simulation entry point: paced clients feeding a worker pool
//! through a CLH-locked ingress queue.

use anyhow::Result;
use clap::Parser;

use spliceq::sim::{run_simulation, SimConfig};
use spliceq::{ClhLock, LockQueue, MetricsRecorder};

#[derive(Debug, Parser)]
#[command(name = "simulate")]
#[command(about = "Simulate a server: paced clients, worker pool, shared ingress queue")]
struct Args {
    #[arg(long, default_value_t = 4)]
    clients: usize,
    #[arg(long, default_value_t = 4)]
    workers: usize,
    #[arg(long, default_value_t = 50_000)]
    requests_per_client: usize,
    /// Upper bound on the random pause between a client's requests (µs).
    #[arg(long, default_value_t = 50)]
    max_arrival_delay_us: u64,
    /// Mean synthetic service time per request (µs).
    #[arg(long, default_value_t = 1_000)]
    mean_work_us: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = SimConfig {
        clients: args.clients,
        workers: args.workers,
        requests_per_client: args.requests_per_client,
        max_arrival_delay_us: args.max_arrival_delay_us,
        mean_work_us: args.mean_work_us,
    };
    log::info!(
        "simulating {} clients against {} workers, {} requests each",
        config.clients,
        config.workers,
        config.requests_per_client
    );

    let ingress = LockQueue::new(ClhLock::new());
    let metrics = MetricsRecorder::new();
    let runtime = run_simulation(&ingress, &config, &metrics);
    metrics.print_summary(runtime);
    Ok(())
}
