use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::job::{Job, JobPriority, JobSource, JobStatus};
use crate::prober::Container;

/// Aggregate counts across every status, used for the operator-facing queue summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub total: u64,
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Durable job store backed by a single SQLite database file.
///
/// All mutation goes through one connection guarded by a mutex: the store never
/// has more than one writer in flight, which is what lets `claim_next` be a
/// single serializable transaction instead of a read-then-write race.
pub struct Store {
    conn: Mutex<Connection>,
    max_mp4_concurrent: usize,
}

impl Store {
    pub fn open(path: &Path, max_mp4_concurrent: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_mp4_concurrent,
        })
    }

    pub fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO jobs (
                job_id, file_path, container, status, priority, priority_rank, source,
                webhook_id, batch_id, created_at, started_at, completed_at,
                selected_track_index, selected_track_language, success, error_message,
                retry_count, tmdb_id, original_language, series_title, movie_title
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)",
            params![
                job.job_id,
                path_to_string(&job.file_path),
                container_to_str(job.container),
                job.status.as_str(),
                job.priority.as_str(),
                job.priority.rank(),
                job.source.as_str(),
                job.webhook_id,
                job.batch_id,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.selected_track_index.map(|i| i as i64),
                job.selected_track_language,
                job.success,
                job.error_message,
                job.retry_count,
                job.tmdb_id,
                job.original_language,
                job.series_title,
                job.movie_title,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::AlreadyExists(job.job_id.clone()))
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    pub fn get(&self, job_id: &str) -> Result<Job, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM jobs WHERE job_id = ?1",
            params![job_id],
            row_to_job,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    /// Replace `job`'s mutable fields, but only if `current_status ->
    /// job.status` is a legal transition per [`JobStatus::can_transition_to`].
    /// The read-check-write happens inside one transaction (and the
    /// connection is already serialized behind `self.conn`'s mutex), so this
    /// is race-free: a job already in a terminal state can never be mutated
    /// again, and a forbidden transition fails loudly instead of silently
    /// overwriting the row.
    pub fn update(&self, job: &Job) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current_status_str: String = tx
            .query_row(
                "SELECT status FROM jobs WHERE job_id = ?1",
                params![job.job_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(job.job_id.clone()))?;
        let current_status = JobStatus::from_str(&current_status_str).unwrap_or(JobStatus::Failed);

        if !current_status.can_transition_to(job.status) {
            return Err(StoreError::IllegalTransition {
                job_id: job.job_id.clone(),
                from: current_status,
                to: job.status,
            });
        }

        let rows = tx.execute(
            "UPDATE jobs SET
                status = ?2, started_at = ?3, completed_at = ?4,
                selected_track_index = ?5, selected_track_language = ?6,
                success = ?7, error_message = ?8, retry_count = ?9
             WHERE job_id = ?1 AND status = ?10",
            params![
                job.job_id,
                job.status.as_str(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.selected_track_index.map(|i| i as i64),
                job.selected_track_language,
                job.success,
                job.error_message,
                job.retry_count,
                current_status_str,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::IllegalTransition {
                job_id: job.job_id.clone(),
                from: current_status,
                to: job.status,
            });
        }
        tx.commit()?;
        Ok(())
    }

    /// Atomically select the oldest `queued` job of the highest present priority
    /// class, transition it to `running`, and return it. MP4 candidates are
    /// skipped once `count_running_for_container(mp4)` has reached the configured
    /// cap, so a claimed job is guaranteed to respect the cap at claim time.
    pub fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let running_mp4: i64 = tx.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'running' AND container = 'mp4'",
            [],
            |r| r.get(0),
        )?;
        let mp4_exhausted = running_mp4 as usize >= self.max_mp4_concurrent;

        let job_id: Option<String> = if mp4_exhausted {
            tx.query_row(
                "SELECT job_id FROM jobs
                 WHERE status = 'queued' AND container != 'mp4'
                 ORDER BY priority_rank DESC, created_at ASC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?
        } else {
            tx.query_row(
                "SELECT job_id FROM jobs
                 WHERE status = 'queued'
                 ORDER BY priority_rank DESC, created_at ASC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?
        };

        let Some(job_id) = job_id else {
            tx.commit()?;
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE jobs SET status = 'running', started_at = ?2 WHERE job_id = ?1",
            params![job_id, now],
        )?;

        let job = tx.query_row(
            "SELECT * FROM jobs WHERE job_id = ?1",
            params![job_id],
            row_to_job,
        )?;

        tx.commit()?;
        Ok(Some(job))
    }

    pub fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        self.list_where("status = ?1", params![status.as_str()])
    }

    pub fn list_by_webhook(&self, webhook_id: &str) -> Result<Vec<Job>, StoreError> {
        self.list_where("webhook_id = ?1", params![webhook_id])
    }

    pub fn list_by_batch(&self, batch_id: &str) -> Result<Vec<Job>, StoreError> {
        self.list_where("batch_id = ?1", params![batch_id])
    }

    fn list_where(
        &self,
        predicate: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT * FROM jobs WHERE {predicate} ORDER BY created_at ASC");
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params, row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    pub fn count_running_for_container(&self, container: Container) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'running' AND container = ?1",
            params![container_to_str(container)],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn aggregate_counts(&self) -> Result<QueueStats, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stats = QueueStats::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |r| {
            let status: String = r.get(0)?;
            let count: i64 = r.get(1)?;
            Ok((status, count as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.total += count;
            match status.as_str() {
                "queued" => stats.queued = count,
                "running" => stats.running = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "cancelled" => stats.cancelled = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Cancel a job, legal only while it is still `queued`.
    pub fn cancel(&self, job_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE jobs SET status = 'cancelled', completed_at = ?2
             WHERE job_id = ?1 AND status = 'queued'",
            params![job_id, now],
        )?;
        if rows == 0 {
            // Distinguish "doesn't exist" from "exists but not queued" for a clearer error.
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM jobs WHERE job_id = ?1",
                    params![job_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::NotFound(job_id.to_string()));
            }
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_string(),
                from: JobStatus::Running,
                to: JobStatus::Cancelled,
            });
        }
        Ok(())
    }

    /// Mark every job still `running` as `failed`, used once at startup to
    /// recover from jobs orphaned by an unclean shutdown.
    pub fn fail_orphaned_running_jobs(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE jobs SET status = 'failed', success = 0, completed_at = ?1,
                error_message = 'orphaned by restart'
             WHERE status = 'running'",
            params![now],
        )?;
        Ok(rows as u64)
    }

    /// Delete terminal jobs whose `completed_at` is strictly older than `cutoff`.
    pub fn prune_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM jobs
             WHERE status IN ('completed', 'failed', 'cancelled')
               AND completed_at IS NOT NULL AND completed_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(rows as u64)
    }
}

fn path_to_string(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

fn container_to_str(c: Container) -> &'static str {
    match c {
        Container::Mkv => "mkv",
        Container::Mp4 => "mp4",
        Container::Unsupported => "unsupported",
    }
}

fn container_from_str(s: &str) -> Container {
    match s {
        "mkv" => Container::Mkv,
        "mp4" => Container::Mp4,
        _ => Container::Unsupported,
    }
}

fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let status_str: String = row.get("status")?;
    let priority_str: String = row.get("priority")?;
    let source_str: String = row.get("source")?;
    let container_str: String = row.get("container")?;
    let file_path: String = row.get("file_path")?;
    let created_at: String = row.get("created_at")?;

    Ok(Job {
        job_id: row.get("job_id")?,
        file_path: file_path.into(),
        container: container_from_str(&container_str),
        status: JobStatus::from_str(&status_str).unwrap_or(JobStatus::Failed),
        priority: JobPriority::from_str(&priority_str).unwrap_or(JobPriority::Normal),
        source: JobSource::from_str(&source_str).unwrap_or(JobSource::Manual),
        webhook_id: row.get("webhook_id")?,
        batch_id: row.get("batch_id")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        started_at: parse_ts(row.get("started_at")?),
        completed_at: parse_ts(row.get("completed_at")?),
        selected_track_index: row
            .get::<_, Option<i64>>("selected_track_index")?
            .map(|i| i as usize),
        selected_track_language: row.get("selected_track_language")?,
        success: row.get("success")?,
        error_message: row.get("error_message")?,
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        tmdb_id: row.get("tmdb_id")?,
        original_language: row.get("original_language")?,
        series_title: row.get("series_title")?,
        movie_title: row.get("movie_title")?,
    })
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            file_path TEXT NOT NULL,
            container TEXT NOT NULL,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            priority_rank INTEGER NOT NULL,
            source TEXT NOT NULL,
            webhook_id TEXT,
            batch_id TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            selected_track_index INTEGER,
            selected_track_language TEXT,
            success INTEGER,
            error_message TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            tmdb_id TEXT,
            original_language TEXT,
            series_title TEXT,
            movie_title TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_status ON jobs(status);
        CREATE INDEX IF NOT EXISTS idx_priority ON jobs(priority_rank, created_at);
        CREATE INDEX IF NOT EXISTS idx_webhook_id ON jobs(webhook_id);
        CREATE INDEX IF NOT EXISTS idx_batch_id ON jobs(batch_id);
        CREATE INDEX IF NOT EXISTS idx_created_at ON jobs(created_at);
        CREATE INDEX IF NOT EXISTS idx_running_container ON jobs(status, container);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{create_job, NewJob};
    use tempfile::tempdir;

    fn sample_store(max_mp4: usize) -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("jobs.db");
        let store = Store::open(&db_path, max_mp4).unwrap();
        (store, dir)
    }

    fn sample_job(container: Container, priority: JobPriority) -> Job {
        create_job(NewJob {
            file_path: "/media/x.mkv".into(),
            container,
            priority,
            source: JobSource::Manual,
            webhook_id: None,
            batch_id: None,
            tmdb_id: None,
            original_language: None,
            series_title: None,
            movie_title: None,
        })
    }

    #[test]
    fn insert_then_get_round_trips() {
        let (store, _dir) = sample_store(1);
        let job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();
        let fetched = store.get(&job.job_id).unwrap();
        assert_eq!(fetched.job_id, job.job_id);
        assert_eq!(fetched.status, JobStatus::Queued);
    }

    #[test]
    fn insert_with_colliding_job_id_fails_with_already_exists() {
        let (store, _dir) = sample_store(1);
        let job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();
        let err = store.insert(&job).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == job.job_id));
    }

    #[test]
    fn update_rejects_illegal_transition_from_queued_to_completed() {
        let (store, _dir) = sample_store(1);
        let mut job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();

        job.status = JobStatus::Completed;
        job.success = Some(true);
        let err = store.update(&job).unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        // The row must be unchanged by the rejected write.
        assert_eq!(store.get(&job.job_id).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn update_rejects_mutation_once_job_is_terminal() {
        let (store, _dir) = sample_store(1);
        let mut job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();
        job = store.claim_next().unwrap().unwrap();

        job.status = JobStatus::Completed;
        job.success = Some(true);
        store.update(&job).unwrap();

        // A second write attempting to flip it back, or to touch any other
        // field, must fail: once terminal, no field mutates.
        job.error_message = Some("late write".to_string());
        job.status = JobStatus::Failed;
        job.success = Some(false);
        let err = store.update(&job).unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert_eq!(store.get(&job.job_id).unwrap().status, JobStatus::Completed);
        assert_eq!(store.get(&job.job_id).unwrap().error_message, None);
    }

    #[test]
    fn update_allows_running_to_failed() {
        let (store, _dir) = sample_store(1);
        let job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();
        let mut running = store.claim_next().unwrap().unwrap();

        running.status = JobStatus::Failed;
        running.success = Some(false);
        running.error_message = Some("boom".to_string());
        store.update(&running).unwrap();

        let fetched = store.get(&job.job_id).unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn claim_next_respects_priority_then_fifo() {
        let (store, _dir) = sample_store(4);
        let low = sample_job(Container::Mkv, JobPriority::Low);
        let normal = sample_job(Container::Mkv, JobPriority::Normal);
        let high = sample_job(Container::Mkv, JobPriority::High);
        store.insert(&low).unwrap();
        store.insert(&normal).unwrap();
        store.insert(&high).unwrap();

        let first = store.claim_next().unwrap().unwrap();
        assert_eq!(first.job_id, high.job_id);
        let second = store.claim_next().unwrap().unwrap();
        assert_eq!(second.job_id, normal.job_id);
        let third = store.claim_next().unwrap().unwrap();
        assert_eq!(third.job_id, low.job_id);
        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn claim_next_marks_job_running_and_stamps_started_at() {
        let (store, _dir) = sample_store(1);
        let job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();
        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());
    }

    #[test]
    fn claim_next_skips_mp4_once_cap_reached() {
        let (store, _dir) = sample_store(1);
        let mp4_a = sample_job(Container::Mp4, JobPriority::High);
        let mp4_b = sample_job(Container::Mp4, JobPriority::High);
        let mkv = sample_job(Container::Mkv, JobPriority::Low);
        store.insert(&mp4_a).unwrap();
        store.insert(&mp4_b).unwrap();
        store.insert(&mkv).unwrap();

        let first = store.claim_next().unwrap().unwrap();
        assert_eq!(first.container, Container::Mp4);

        // Cap is now reached; the second MP4 job must be skipped in favor of the MKV job.
        let second = store.claim_next().unwrap().unwrap();
        assert_eq!(second.container, Container::Mkv);

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn cancel_only_legal_from_queued() {
        let (store, _dir) = sample_store(1);
        let job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();
        store.cancel(&job.job_id).unwrap();
        assert_eq!(store.get(&job.job_id).unwrap().status, JobStatus::Cancelled);

        let running_job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&running_job).unwrap();
        store.claim_next().unwrap();
        assert!(store.cancel(&running_job.job_id).is_err());
    }

    #[test]
    fn orphaned_running_jobs_fail_with_reason() {
        let (store, _dir) = sample_store(1);
        let job = sample_job(Container::Mkv, JobPriority::Normal);
        store.insert(&job).unwrap();
        store.claim_next().unwrap();
        let n = store.fail_orphaned_running_jobs().unwrap();
        assert_eq!(n, 1);
        let after = store.get(&job.job_id).unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.error_message.as_deref(), Some("orphaned by restart"));
    }
}
