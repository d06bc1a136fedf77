//! Full benchmark sweep: every queue variant across a grid of producer
//! counts and per-client workload sizes, with per-run result files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use spliceq::harness::{run_workload, Watchdog, WorkloadConfig};
use spliceq::{
    BackoffBatchQueue, BatchQueue, ClhLock, ConcurrentQueue, LockQueue, Message, MetricsRecorder,
    MsQueue, TasLock,
};

#[derive(Debug, Parser)]
#[command(name = "sweep")]
#[command(about = "Run every queue variant across a grid of producer counts and workload sizes")]
struct Args {
    /// Producer counts to test.
    #[arg(long, value_delimiter = ',', default_values_t = vec![4, 8, 16, 32])]
    producers: Vec<usize>,
    /// Per-producer message counts to test.
    #[arg(long, value_delimiter = ',', default_values_t = vec![10_000, 50_000, 200_000, 500_000])]
    messages: Vec<usize>,
    /// Staging size for the batching variants.
    #[arg(long, default_value_t = 16)]
    batch_threshold: usize,
    /// Directory the per-run result files land in.
    #[arg(long, default_value = "results")]
    out_dir: PathBuf,
    /// Per-variant watchdog deadline in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    for &messages_per_producer in &args.messages {
        println!("\n>>> workload: {messages_per_producer} messages per producer");
        for &producers in &args.producers {
            let consumers = (producers / 2).max(4);
            let config = WorkloadConfig {
                producers,
                consumers,
                messages_per_producer,
            };
            println!(
                "\n=== {} producers, {} consumers, {} total messages ===",
                producers,
                consumers,
                config.total_messages()
            );

            let subdir = args
                .out_dir
                .join(format!("threads_{producers}_{messages_per_producer}_perProducer"));

            run_variant(
                "LockQueue_TAS",
                &LockQueue::new(TasLock::new()),
                &subdir,
                &config,
                &args,
            );
            run_variant(
                "LockQueue_CLH",
                &LockQueue::new(ClhLock::new()),
                &subdir,
                &config,
                &args,
            );
            run_variant("MsQueue", &MsQueue::new(), &subdir, &config, &args);
            run_variant(
                "BatchQueue",
                &BatchQueue::<Message>::with_threshold(args.batch_threshold),
                &subdir,
                &config,
                &args,
            );
            run_variant(
                "BackoffBatchQueue",
                &BackoffBatchQueue::<Message>::with_threshold(args.batch_threshold),
                &subdir,
                &config,
                &args,
            );
        }
    }
    println!("\nAll sweeps completed.");
    Ok(())
}

fn run_variant<Q>(name: &str, queue: &Q, subdir: &Path, config: &WorkloadConfig, args: &Args)
where
    Q: ConcurrentQueue<Message> + Sync,
{
    println!("\nRunning {name} ...");
    let watchdog = Watchdog::arm(name, Duration::from_secs(args.timeout_secs));

    let metrics = MetricsRecorder::new();
    let runtime = run_workload(queue, config, &metrics);

    watchdog.disarm();
    metrics.write_summary(&subdir.join(name), runtime);
    println!(" -> {name} completed.");
}
