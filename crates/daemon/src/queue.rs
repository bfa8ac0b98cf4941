use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AdmissionError;
use crate::job::{create_job, Job, JobPriority, JobSource, NewJob};
use crate::prober::{self, Container};
use crate::store::{QueueStats, Store};

/// Everything the caller supplies for one `submit` call.
pub struct SubmitRequest {
    pub path: PathBuf,
    pub priority: JobPriority,
    pub source: JobSource,
    pub webhook_id: Option<String>,
    pub batch_id: Option<String>,
    pub tmdb_id: Option<String>,
    pub original_language: Option<String>,
    pub series_title: Option<String>,
    pub movie_title: Option<String>,
}

impl SubmitRequest {
    pub fn new(path: PathBuf, priority: JobPriority, source: JobSource) -> Self {
        Self {
            path,
            priority,
            source,
            webhook_id: None,
            batch_id: None,
            tmdb_id: None,
            original_language: None,
            series_title: None,
            movie_title: None,
        }
    }
}

pub struct BatchRequest {
    pub path: PathBuf,
    pub recursive: bool,
    /// Glob pattern; defaults to matching both supported extensions when `None`.
    pub pattern: Option<String>,
    pub dry_run: bool,
    pub priority: JobPriority,
}

/// Thin, concurrency-safe facade over the [`Store`]. Owns no business logic
/// beyond admission checks (container support) and batch-id bookkeeping; the
/// hard concurrency problem (no two callers ever get the same job) is solved
/// inside the store's `claim_next` transaction, not here.
pub struct QueueManager {
    store: Arc<Store>,
    config: Arc<Config>,
}

impl QueueManager {
    pub fn new(store: Arc<Store>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    pub async fn submit(&self, req: SubmitRequest) -> Result<Job, AdmissionError> {
        if !req.path.is_file() {
            return Err(AdmissionError::BadPath(req.path));
        }

        let probe = prober::probe_file(&req.path).await?;
        if probe.container == Container::Unsupported {
            return Err(AdmissionError::UnsupportedContainer(probe.container));
        }
        if !self.container_enabled(probe.container) {
            return Err(AdmissionError::ContainerDisabled(probe.container));
        }

        let job = create_job(NewJob {
            file_path: req.path,
            container: probe.container,
            priority: req.priority,
            source: req.source,
            webhook_id: req.webhook_id,
            batch_id: req.batch_id,
            tmdb_id: req.tmdb_id,
            original_language: req.original_language,
            series_title: req.series_title,
            movie_title: req.movie_title,
        });

        self.store.insert(&job)?;
        Ok(job)
    }

    /// Walk a directory matching `request.pattern`, submitting one job per
    /// eligible file under a freshly generated shared `batch_id`. A candidate
    /// that fails admission does not prevent the rest of the batch from being
    /// submitted. In `dry_run`, nothing is inserted; candidates are only probed.
    pub async fn submit_batch(&self, request: BatchRequest) -> (String, Vec<Job>) {
        let batch_id = format!("batch_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let candidates = crate::batch::find_candidates(&request);

        let mut accepted = Vec::new();
        for candidate in candidates {
            if request.dry_run {
                if prober::probe_file(&candidate).await.is_ok() {
                    tracing::info!(path = %candidate.display(), batch_id = %batch_id, "dry run: would enqueue");
                }
                continue;
            }

            let req = SubmitRequest {
                path: candidate.clone(),
                priority: request.priority,
                source: JobSource::Manual,
                webhook_id: None,
                batch_id: Some(batch_id.clone()),
                tmdb_id: None,
                original_language: None,
                series_title: None,
                movie_title: None,
            };
            match self.submit(req).await {
                Ok(job) => accepted.push(job),
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "batch candidate rejected");
                }
            }
        }

        (batch_id, accepted)
    }

    pub fn next(&self) -> Result<Option<Job>, AdmissionError> {
        Ok(self.store.claim_next()?)
    }

    pub fn get(&self, job_id: &str) -> Result<Job, AdmissionError> {
        Ok(self.store.get(job_id)?)
    }

    pub fn list_by_webhook(&self, webhook_id: &str) -> Result<Vec<Job>, AdmissionError> {
        Ok(self.store.list_by_webhook(webhook_id)?)
    }

    pub fn list_by_batch(&self, batch_id: &str) -> Result<Vec<Job>, AdmissionError> {
        Ok(self.store.list_by_batch(batch_id)?)
    }

    pub fn cancel(&self, job_id: &str) -> Result<(), AdmissionError> {
        Ok(self.store.cancel(job_id)?)
    }

    pub fn running_mp4_count(&self) -> Result<u64, AdmissionError> {
        Ok(self.store.count_running_for_container(Container::Mp4)?)
    }

    pub fn queue_stats(&self) -> Result<QueueStats, AdmissionError> {
        Ok(self.store.aggregate_counts()?)
    }

    /// Prune terminal jobs whose `completed_at` is older than `days` days ago,
    /// computed directly from the current instant (no midnight rebasing).
    pub fn prune_old_jobs(&self, days: i64) -> Result<u64, AdmissionError> {
        let cutoff = Utc::now() - Duration::days(days);
        Ok(self.store.prune_terminal_before(cutoff)?)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn container_enabled(&self, container: Container) -> bool {
        match container {
            Container::Mkv => self.config.containers.mkv,
            Container::Mp4 => self.config.containers.mp4,
            Container::Unsupported => false,
        }
    }
}

/// Aggregate view across a webhook or batch group, mirroring the external
/// interface's `all_completed` / `any_failed` convenience flags.
pub struct GroupStatus {
    pub total_jobs: usize,
    pub all_completed: bool,
    pub any_failed: bool,
}

pub fn summarize_group(jobs: &[Job]) -> GroupStatus {
    GroupStatus {
        total_jobs: jobs.len(),
        all_completed: !jobs.is_empty() && jobs.iter().all(|j| j.status.is_terminal()),
        any_failed: jobs
            .iter()
            .any(|j| j.status == crate::job::JobStatus::Failed),
    }
}
