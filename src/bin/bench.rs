//! Single benchmark run: one queue variant, one workload shape.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use spliceq::harness::{run_workload, Watchdog, WorkloadConfig};
use spliceq::{
    BackoffBatchQueue, BatchQueue, ClhLock, LockQueue, Message, MetricsRecorder, MsQueue, TasLock,
};

#[derive(Debug, Parser)]
#[command(name = "bench")]
#[command(about = "Benchmark one concurrent queue variant under a producer/consumer workload")]
struct Args {
    /// Queue variant to exercise.
    #[arg(long, value_enum, default_value = "ms")]
    queue: Variant,
    #[arg(long, default_value_t = 4)]
    producers: usize,
    #[arg(long, default_value_t = 4)]
    consumers: usize,
    /// Messages enqueued by each producer.
    #[arg(long, default_value_t = 100_000)]
    messages: usize,
    /// Staging size for the batching variants.
    #[arg(long, default_value_t = 16)]
    batch_threshold: usize,
    /// Also write the summary under this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Watchdog deadline in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Variant {
    /// Spin-locked queue with the test-and-set lock.
    LockTas,
    /// Spin-locked queue with the CLH queue lock.
    LockClh,
    /// Michael-Scott lock-free queue.
    Ms,
    /// Batch-splicing queue.
    Batch,
    /// Batch-splicing queue with exponential backoff.
    Backoff,
}

impl Variant {
    fn label(self) -> &'static str {
        match self {
            Variant::LockTas => "LockQueue(TAS)",
            Variant::LockClh => "LockQueue(CLH)",
            Variant::Ms => "MsQueue",
            Variant::Batch => "BatchQueue",
            Variant::Backoff => "BackoffBatchQueue",
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = WorkloadConfig {
        producers: args.producers,
        consumers: args.consumers,
        messages_per_producer: args.messages,
    };
    log::info!(
        "running {} with {} producers, {} consumers, {} messages each",
        args.queue.label(),
        config.producers,
        config.consumers,
        config.messages_per_producer
    );

    match args.queue {
        Variant::LockTas => run(&LockQueue::new(TasLock::new()), &args, &config),
        Variant::LockClh => run(&LockQueue::new(ClhLock::new()), &args, &config),
        Variant::Ms => run(&MsQueue::new(), &args, &config),
        Variant::Batch => run(
            &BatchQueue::<Message>::with_threshold(args.batch_threshold),
            &args,
            &config,
        ),
        Variant::Backoff => run(
            &BackoffBatchQueue::<Message>::with_threshold(args.batch_threshold),
            &args,
            &config,
        ),
    }
    Ok(())
}

fn run<Q>(queue: &Q, args: &Args, config: &WorkloadConfig)
where
    Q: spliceq::ConcurrentQueue<Message> + Sync,
{
    let watchdog = Watchdog::arm(args.queue.label(), Duration::from_secs(args.timeout_secs));
    let metrics = MetricsRecorder::new();
    let runtime = run_workload(queue, config, &metrics);
    watchdog.disarm();

    match &args.out_dir {
        Some(dir) => metrics.write_summary(&dir.join(args.queue.label()), runtime),
        None => metrics.print_summary(runtime),
    }
}
