use thiserror::Error;

/// Errors a caller of the enqueue API might want to match on.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("path does not exist or is not a regular file: {0}")]
    BadPath(std::path::PathBuf),
    #[error("container format is not supported: {0:?}")]
    UnsupportedContainer(crate::prober::Container),
    #[error("container support is disabled in configuration: {0:?}")]
    ContainerDisabled(crate::prober::Container),
    #[error("job id already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn prober for {path}: {source}")]
    Spawn {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("prober exited with failure for {path}: {stderr}")]
    ToolFailed {
        path: std::path::PathBuf,
        stderr: String,
    },
    #[error("failed to parse prober output for {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("probing {path} timed out after {timeout_secs}s")]
    Timeout {
        path: std::path::PathBuf,
        timeout_secs: u64,
    },
}

#[derive(Debug, Error)]
pub enum MutateError {
    #[error("track index {index} out of range (container has {count} audio tracks)")]
    InvalidTrack { index: usize, count: usize },
    #[error("insufficient free space to remux {path}: need >= {needed} bytes, have {available}")]
    InsufficientSpace {
        path: std::path::PathBuf,
        needed: u64,
        available: u64,
    },
    #[error("failed to spawn mutator for {path}: {source}")]
    Spawn {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mutator exited with failure for {path}: {stderr}")]
    ToolFailed {
        path: std::path::PathBuf,
        stderr: String,
    },
    #[error("mutating {path} timed out after {timeout_secs}s")]
    Timeout {
        path: std::path::PathBuf,
        timeout_secs: u64,
    },
    #[error("remuxed output for {path} failed the size sanity check: {new_size} bytes vs original {original_size} bytes")]
    SizeSanity {
        path: std::path::PathBuf,
        new_size: u64,
        original_size: u64,
    },
    #[error("atomic swap for {path} failed and rollback also failed: {detail}")]
    SwapFailed {
        path: std::path::PathBuf,
        detail: String,
    },
    #[error("failed to query audio track count for {0}")]
    TrackCountUnavailable(std::path::PathBuf),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job already exists: {0}")]
    AlreadyExists(String),
    #[error("illegal status transition for job {job_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        job_id: String,
        from: crate::job::JobStatus,
        to: crate::job::JobStatus,
    },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
