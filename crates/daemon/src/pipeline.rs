use std::path::Path;

use crate::config::Config;
use crate::job::Job;
use crate::mutator;
use crate::prober::{self, Container};
use crate::selector::{self, PathOverride};

/// Terminal outcome of running the pipeline once against a single job.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Success {
        track_index: usize,
        track_language: String,
    },
    Skipped {
        reason: &'static str,
    },
    DryRun {
        track_index: usize,
        track_language: String,
    },
    Failed {
        message: String,
    },
}

/// Runs the prober/selector/mutator trio for one job. Deliberately unaware of
/// the queue or the worker pool: it is a pure orchestration function of its
/// three collaborators plus configuration, so it can be exercised directly in
/// tests without a store or a pool running.
pub async fn process(job: &Job, config: &Config) -> PipelineOutcome {
    let path = job.file_path.as_path();

    if !path.is_file() {
        return PipelineOutcome::Failed {
            message: format!("{} no longer exists or is not a regular file", path.display()),
        };
    }

    let probe = match prober::probe_file(path).await {
        Ok(p) => p,
        Err(e) => return PipelineOutcome::Failed { message: e.to_string() },
    };

    if probe.container == Container::Unsupported {
        return PipelineOutcome::Skipped {
            reason: "unsupported_container",
        };
    }
    if !container_enabled(&config, probe.container) {
        return PipelineOutcome::Skipped {
            reason: "container_disabled",
        };
    }

    if probe.tracks.is_empty() {
        return PipelineOutcome::Skipped {
            reason: "no_audio_tracks",
        };
    }

    let overrides: Vec<PathOverride> = config
        .path_overrides
        .iter()
        .map(|o| PathOverride {
            glob: o.path.clone(),
            language_priority: o.language_priority.clone(),
        })
        .collect();

    let selection = selector::select(
        &probe.tracks,
        path,
        job.original_language.as_deref(),
        &overrides,
        &config.language_priority,
    );

    let Some(track) = selection.track else {
        return PipelineOutcome::Skipped {
            reason: "no_matching_track",
        };
    };

    if track.is_default && config.execution.skip_if_correct {
        return PipelineOutcome::Skipped {
            reason: "already_correct",
        };
    }

    if config.execution.dry_run {
        return PipelineOutcome::DryRun {
            track_index: track.index,
            track_language: track.language.clone(),
        };
    }

    match mutator::set_default_audio(probe.container, path, track.index).await {
        Ok(()) => PipelineOutcome::Success {
            track_index: track.index,
            track_language: track.language.clone(),
        },
        Err(e) => PipelineOutcome::Failed {
            message: e.to_string(),
        },
    }
}

fn container_enabled(config: &Config, container: Container) -> bool {
    match container {
        Container::Mkv => config.containers.mkv,
        Container::Mp4 => config.containers.mp4,
        Container::Unsupported => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::job::{create_job, JobPriority, JobSource, NewJob};
    use std::io::Write;

    fn job_for(path: &Path) -> Job {
        create_job(NewJob {
            file_path: path.to_path_buf(),
            container: Container::Mkv,
            priority: JobPriority::Normal,
            source: JobSource::Manual,
            webhook_id: None,
            batch_id: None,
            tmdb_id: None,
            original_language: None,
            series_title: None,
            movie_title: None,
        })
    }

    #[tokio::test]
    async fn missing_file_fails_before_probing() {
        let path = Path::new("/tmp/definitely-does-not-exist-trackd-test.mkv");
        let job = job_for(path);
        let config = Config::default();
        let outcome = process(&job, &config).await;
        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn non_media_file_is_treated_as_unsupported_or_fails_probe() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a real container").unwrap();
        let job = job_for(file.path());
        let config = Config::default();
        let outcome = process(&job, &config).await;
        // ffprobe isn't necessarily installed in this environment; either a
        // clean "unsupported" skip or a probe failure is an acceptable outcome
        // for a file that isn't a real container.
        assert!(matches!(
            outcome,
            PipelineOutcome::Skipped { .. } | PipelineOutcome::Failed { .. }
        ));
    }
}
