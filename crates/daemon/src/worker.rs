use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::job::{Job, JobStatus};
use crate::pipeline::{self, PipelineOutcome};
use crate::queue::QueueManager;

const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_secs(1);

/// One cooperative worker: poll the queue manager, run the pipeline on
/// whatever it claims, write the terminal status back. The MP4 concurrency
/// cap is enforced inside the store's `claim_next` (see [`crate::store`]), so
/// a worker that successfully claims a job never needs to check the cap
/// itself or release the job back to the queue.
pub struct Worker {
    id: usize,
    queue: Arc<QueueManager>,
    config: Arc<Config>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn new(id: usize, queue: Arc<QueueManager>, config: Arc<Config>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            id,
            queue,
            config,
            shutdown,
        }
    }

    async fn run(self) {
        tracing::info!(worker_id = self.id, "worker started");
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.queue.next() {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await,
                Err(e) => {
                    tracing::error!(worker_id = self.id, error = %e, "failed to claim next job");
                    tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                }
            }
        }
        tracing::info!(worker_id = self.id, "worker stopped");
    }

    async fn process(&self, mut job: Job) {
        tracing::info!(
            worker_id = self.id,
            job_id = %job.job_id,
            file = %job.file_path.display(),
            container = ?job.container,
            "processing job"
        );

        let outcome = pipeline::process(&job, &self.config).await;

        match outcome {
            PipelineOutcome::Success {
                track_index,
                track_language,
            } => {
                job.status = JobStatus::Completed;
                job.success = Some(true);
                job.selected_track_index = Some(track_index);
                job.selected_track_language = Some(track_language);
                job.completed_at = Some(chrono::Utc::now());
                tracing::info!(worker_id = self.id, job_id = %job.job_id, "job completed");
            }
            PipelineOutcome::DryRun {
                track_index,
                track_language,
            } => {
                job.status = JobStatus::Completed;
                job.success = Some(true);
                job.selected_track_index = Some(track_index);
                job.selected_track_language = Some(track_language);
                job.completed_at = Some(chrono::Utc::now());
                tracing::info!(worker_id = self.id, job_id = %job.job_id, "dry run completed");
            }
            PipelineOutcome::Skipped { reason } => {
                job.status = JobStatus::Completed;
                job.success = Some(true);
                job.completed_at = Some(chrono::Utc::now());
                tracing::info!(worker_id = self.id, job_id = %job.job_id, reason, "job skipped");
            }
            PipelineOutcome::Failed { message } => {
                job.status = JobStatus::Failed;
                job.success = Some(false);
                job.error_message = Some(message.clone());
                job.completed_at = Some(chrono::Utc::now());
                tracing::error!(worker_id = self.id, job_id = %job.job_id, error = %message, "job failed");
            }
        }

        if let Err(e) = self.queue.store().update(&job) {
            tracing::error!(worker_id = self.id, job_id = %job.job_id, error = %e, "failed to persist job result");
        }
    }
}

/// Fixed-cardinality pool of [`Worker`]s sharing one [`QueueManager`].
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `config.processing.worker_count` workers. Before spinning up any
    /// worker, transition every job left `running` from a prior run to
    /// `failed` so no job is ever silently stuck behind a worker that no
    /// longer exists.
    pub fn start(queue: Arc<QueueManager>, config: Arc<Config>) -> Self {
        let recovered = queue
            .store()
            .fail_orphaned_running_jobs()
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to recover orphaned jobs at startup");
                0
            });
        if recovered > 0 {
            tracing::warn!(count = recovered, "recovered jobs orphaned by restart");
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_count = config.processing.worker_count;
        tracing::info!(worker_count, "starting worker pool");

        let handles = (0..worker_count)
            .map(|id| {
                let worker = Worker::new(id, queue.clone(), config.clone(), shutdown.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        Self { shutdown, handles }
    }

    /// Signal every worker to stop after its current job and wait for them.
    pub async fn shutdown(self) {
        tracing::info!(worker_count = self.handles.len(), "stopping worker pool");
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!("worker pool stopped");
    }
}
