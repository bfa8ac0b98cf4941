use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use trackd_core::job::{JobPriority, JobSource};
use trackd_core::queue::{BatchRequest, QueueManager, SubmitRequest};
use trackd_core::{load_config, Config, Store, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "trackd")]
#[command(about = "Default-audio-track daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load configuration, open the store, and run the worker pool until a
    /// shutdown signal is received.
    Run,
    /// Enqueue a single file.
    Submit {
        path: PathBuf,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Walk a directory and enqueue every eligible file under a shared batch id.
    SubmitBatch {
        path: PathBuf,
        #[arg(long, default_value_t = true)]
        recursive: bool,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Show a single job, or overall queue counts if no job id is given.
    Status { job_id: Option<String> },
    /// Cancel a queued job.
    Cancel { job_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_ansi(true)
        .init();

    info!("trackd v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let store = Arc::new(Store::open(&config.database_path, config.processing.max_mp4_concurrent)?);
    let config = Arc::new(config);
    let queue = Arc::new(QueueManager::new(store, config.clone()));

    match args.command {
        Command::Run => run_daemon(queue, config).await,
        Command::Submit { path, priority } => submit(&queue, path, &priority).await,
        Command::SubmitBatch {
            path,
            recursive,
            pattern,
            dry_run,
            priority,
        } => submit_batch(&queue, path, recursive, pattern, dry_run, &priority).await,
        Command::Status { job_id } => status(&queue, job_id),
        Command::Cancel { job_id } => cancel(&queue, &job_id),
    }
}

async fn run_daemon(queue: Arc<QueueManager>, config: Arc<Config>) -> Result<()> {
    info!(
        worker_count = config.processing.worker_count,
        max_mp4_concurrent = config.processing.max_mp4_concurrent,
        "starting daemon"
    );

    let pool = WorkerPool::start(queue, config);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received ctrl-c");
    }

    pool.shutdown().await;
    Ok(())
}

async fn submit(queue: &QueueManager, path: PathBuf, priority: &str) -> Result<()> {
    let priority = parse_priority(priority)?;
    let req = SubmitRequest::new(path, priority, JobSource::Manual);
    let job = queue.submit(req).await?;
    println!("enqueued {}", job.job_id);
    Ok(())
}

async fn submit_batch(
    queue: &QueueManager,
    path: PathBuf,
    recursive: bool,
    pattern: Option<String>,
    dry_run: bool,
    priority: &str,
) -> Result<()> {
    let priority = parse_priority(priority)?;
    let (batch_id, jobs) = queue
        .submit_batch(BatchRequest {
            path,
            recursive,
            pattern,
            dry_run,
            priority,
        })
        .await;
    println!("batch {batch_id}: {} jobs enqueued", jobs.len());
    Ok(())
}

fn status(queue: &QueueManager, job_id: Option<String>) -> Result<()> {
    match job_id {
        Some(id) => {
            let job = queue.get(&id)?;
            println!("{:#?}", job);
        }
        None => {
            let stats = queue.queue_stats()?;
            println!(
                "total={} queued={} running={} completed={} failed={} cancelled={}",
                stats.total, stats.queued, stats.running, stats.completed, stats.failed, stats.cancelled
            );
        }
    }
    Ok(())
}

fn cancel(queue: &QueueManager, job_id: &str) -> Result<()> {
    queue.cancel(job_id)?;
    println!("cancelled {job_id}");
    Ok(())
}

fn parse_priority(s: &str) -> Result<JobPriority> {
    JobPriority::from_str(s).ok_or_else(|| anyhow::anyhow!("invalid priority: {s}"))
}
