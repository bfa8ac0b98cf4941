use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::prober::Container;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    // Identity
    pub job_id: String,
    pub file_path: PathBuf,
    pub container: Container,

    // Lifecycle
    pub status: JobStatus,
    pub priority: JobPriority,
    pub source: JobSource,

    // Grouping
    pub webhook_id: Option<String>,
    pub batch_id: Option<String>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    // Result
    pub selected_track_index: Option<usize>,
    pub selected_track_language: Option<String>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub retry_count: u32,

    // Metadata hints, set by the caller at enqueue time
    pub tmdb_id: Option<String>,
    pub original_language: Option<String>,
    pub series_title: Option<String>,
    pub movie_title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => return None,
        })
    }

    /// True iff `self -> to` is a legal transition under the job state machine.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, Running) | (Queued, Cancelled) | (Running, Completed) | (Running, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    // Ord derives low < normal < high; callers compare with `>` for "more urgent"
    Low,
    Normal,
    High,
}

impl JobPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "high" => JobPriority::High,
            "normal" => JobPriority::Normal,
            "low" => JobPriority::Low,
            _ => return None,
        })
    }

    /// Ordinal used for `ORDER BY` in the store: higher value dequeues first.
    pub fn rank(self) -> i64 {
        match self {
            JobPriority::High => 2,
            JobPriority::Normal => 1,
            JobPriority::Low => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    Sonarr,
    Radarr,
    Manual,
    Retry,
}

impl JobSource {
    pub fn as_str(self) -> &'static str {
        match self {
            JobSource::Sonarr => "sonarr",
            JobSource::Radarr => "radarr",
            JobSource::Manual => "manual",
            JobSource::Retry => "retry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "sonarr" => JobSource::Sonarr,
            "radarr" => JobSource::Radarr,
            "manual" => JobSource::Manual,
            "retry" => JobSource::Retry,
            _ => return None,
        })
    }
}

/// Parameters needed to create a new job; everything the caller supplies at submit time.
pub struct NewJob {
    pub file_path: PathBuf,
    pub container: Container,
    pub priority: JobPriority,
    pub source: JobSource,
    pub webhook_id: Option<String>,
    pub batch_id: Option<String>,
    pub tmdb_id: Option<String>,
    pub original_language: Option<String>,
    pub series_title: Option<String>,
    pub movie_title: Option<String>,
}

pub fn create_job(new: NewJob) -> Job {
    Job {
        job_id: format!("job_{}", &Uuid::new_v4().simple().to_string()[..12]),
        file_path: new.file_path,
        container: new.container,
        status: JobStatus::Queued,
        priority: new.priority,
        source: new.source,
        webhook_id: new.webhook_id,
        batch_id: new.batch_id,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        selected_track_index: None,
        selected_track_language: None,
        success: None,
        error_message: None,
        retry_count: 0,
        tmdb_id: new.tmdb_id,
        original_language: new.original_language,
        series_title: new.series_title,
        movie_title: new.movie_title,
    }
}
