use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, ValueEnum};
use log::{error, info};

use workpool::{PoolConfig, Result, ShutdownPolicy, WorkerPool};

const GREETINGS: [&str; 3] = ["hello,world!", "Hello,world!", "Hello World!"];

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Run every queued task before stopping
    Drain,
    /// Drop queued tasks on shutdown
    Cancel,
}

impl From<Policy> for ShutdownPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Drain => ShutdownPolicy::Drain,
            Policy::Cancel => ShutdownPolicy::CancelPending,
        }
    }
}

#[derive(Parser)]
#[command(name = "workpool-demo", version, about = "Prints greetings from a worker pool")]
struct Cli {
    /// JSON pool configuration; flags below override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of worker threads [default: host parallelism]
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Bound the task queue to this many tasks
    #[arg(long, value_name = "N")]
    capacity: Option<usize>,

    /// What to do with queued tasks on shutdown
    #[arg(long, value_enum)]
    policy: Option<Policy>,

    /// Number of greeting tasks to submit
    #[arg(long, default_value_t = 3, value_name = "N")]
    tasks: usize,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    println!("{}", WorkerPool::max_worker_count());

    info!("workpool-demo {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Workers: {}, queue capacity: {:?}, shutdown policy: {:?}",
        config.threads, config.capacity, config.shutdown_policy
    );

    let pool = WorkerPool::new(config)?;
    pool.init()?;
    for i in 0..cli.tasks {
        let greeting = GREETINGS[i % GREETINGS.len()];
        pool.spawn(move || println!("{}", greeting))?;
    }
    pool.shutdown()
}

/// Layers command line flags over the config file, or over the defaults
/// when no file is given.
fn resolve_config(cli: &Cli) -> Result<PoolConfig> {
    let mut config = match &cli.config {
        Some(path) => PoolConfig::from_json(path)?,
        None => PoolConfig::default(),
    };
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }
    if let Some(capacity) = cli.capacity {
        config = config.bounded(capacity);
    }
    if let Some(policy) = cli.policy {
        config = config.with_shutdown_policy(policy.into());
    }
    config.validate()?;
    Ok(config)
}
