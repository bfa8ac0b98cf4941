use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::MutateError;
use crate::prober::audio_track_count;

const MP4_TIMEOUT_SECS: u64 = 300;
/// Post-remux output must be at least this fraction of the original size, as a
/// guard against a silently truncated remux.
const MIN_SIZE_RATIO: f64 = 0.9;
/// Preflight requires at least this multiple of the original size free on disk,
/// since the remux writes a full second copy before swapping.
const FREE_SPACE_MULTIPLIER: u64 = 2;

/// Rewrite the default-audio-track disposition by remuxing to a temporary file
/// and atomically swapping it over the original, with rollback on any failure.
pub async fn set_default_audio(path: &Path, index: usize) -> Result<(), MutateError> {
    let track_count = audio_track_count(path)
        .await
        .map_err(|_| MutateError::TrackCountUnavailable(path.to_path_buf()))?;
    if index >= track_count {
        return Err(MutateError::InvalidTrack {
            index,
            count: track_count,
        });
    }

    let original_size = fs::metadata(path)
        .map_err(|_| MutateError::TrackCountUnavailable(path.to_path_buf()))?
        .len();

    preflight_free_space(path, original_size)?;

    let temp_path = sibling_path(path, ".remux.tmp");
    let backup_path = backup_sibling_path(path);

    let remux_result = remux(path, &temp_path, index, track_count).await;
    if let Err(e) = remux_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = check_output_sane(&temp_path, original_size) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::copy(path, &backup_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(MutateError::SwapFailed {
            path: path.to_path_buf(),
            detail: format!("failed to create backup before swap: {e}"),
        });
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => {
            let _ = fs::remove_file(&backup_path);
            Ok(())
        }
        Err(rename_err) => match fs::copy(&backup_path, path) {
            Ok(_) => {
                let _ = fs::remove_file(&temp_path);
                let _ = fs::remove_file(&backup_path);
                Err(MutateError::SwapFailed {
                    path: path.to_path_buf(),
                    detail: format!(
                        "rename failed ({rename_err}) but original was restored from backup"
                    ),
                })
            }
            Err(restore_err) => Err(MutateError::SwapFailed {
                path: path.to_path_buf(),
                detail: format!(
                    "rename failed ({rename_err}) AND restore from backup failed ({restore_err}); \
                     backup preserved at {backup_path:?}"
                ),
            }),
        },
    }
}

fn preflight_free_space(path: &Path, original_size: u64) -> Result<(), MutateError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let available = fs2::available_space(dir).unwrap_or(u64::MAX);
    let needed = original_size.saturating_mul(FREE_SPACE_MULTIPLIER);
    if available < needed {
        return Err(MutateError::InsufficientSpace {
            path: path.to_path_buf(),
            needed,
            available,
        });
    }
    Ok(())
}

/// Hidden sibling path used for the in-progress remux output, so it never
/// shows up as a candidate in a directory scan while it's being written.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let parent = path.parent();
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let name = format!(".{file_name}{suffix}");
    match parent {
        Some(p) => p.join(name),
        None => PathBuf::from(name),
    }
}

/// Sibling backup path, `<name>.bak`. Not hidden: the spec requires this
/// suffix to be recognizable to an operator recovering manually after a
/// crash, so it deliberately doesn't get the leading-dot treatment
/// `sibling_path` gives the temporary remux output.
fn backup_sibling_path(path: &Path) -> PathBuf {
    let parent = path.parent();
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let name = format!("{file_name}.bak");
    match parent {
        Some(p) => p.join(name),
        None => PathBuf::from(name),
    }
}

async fn remux(
    path: &Path,
    temp_path: &Path,
    index: usize,
    track_count: usize,
) -> Result<(), MutateError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(path)
        .arg("-map")
        .arg("0")
        .arg("-c")
        .arg("copy")
        .arg("-movflags")
        .arg("+faststart");

    // Clear every audio track's default disposition, then set it on the target.
    for audio_ordinal in 0..track_count {
        let disposition = if audio_ordinal == index { "default" } else { "0" };
        cmd.arg(format!("-disposition:a:{audio_ordinal}"))
            .arg(disposition);
    }
    cmd.arg(temp_path);

    let output = timeout(Duration::from_secs(MP4_TIMEOUT_SECS), cmd.output())
        .await
        .map_err(|_| MutateError::Timeout {
            path: path.to_path_buf(),
            timeout_secs: MP4_TIMEOUT_SECS,
        })?
        .map_err(|e| MutateError::Spawn {
            path: path.to_path_buf(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(MutateError::ToolFailed {
            path: path.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(())
}

fn check_output_sane(temp_path: &Path, original_size: u64) -> Result<(), MutateError> {
    let metadata = fs::metadata(temp_path).map_err(|_| MutateError::SizeSanity {
        path: temp_path.to_path_buf(),
        new_size: 0,
        original_size,
    })?;
    let new_size = metadata.len();
    let minimum = (original_size as f64 * MIN_SIZE_RATIO) as u64;
    if new_size == 0 || new_size < minimum {
        return Err(MutateError::SizeSanity {
            path: temp_path.to_path_buf(),
            new_size,
            original_size,
        });
    }
    Ok(())
}
