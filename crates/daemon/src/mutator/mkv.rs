use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::MutateError;
use crate::prober::audio_track_count;

const MKV_TIMEOUT_SECS: u64 = 60;
/// Fallback used when the track count cannot be determined, mirroring the
/// conservative upper bound the original metadata editor assumed.
const FALLBACK_TRACK_COUNT: usize = 10;

/// Rewrite the default-audio-track flag in place via `mkvpropedit`. `mkvpropedit`
/// addresses audio tracks with a 1-based ordinal, so track `index` (0-based) is
/// addressed as `audio-track:{index + 1}`.
pub async fn set_default_audio(path: &Path, index: usize) -> Result<(), MutateError> {
    let track_count = audio_track_count(path)
        .await
        .unwrap_or(FALLBACK_TRACK_COUNT);

    if index >= track_count {
        return Err(MutateError::InvalidTrack {
            index,
            count: track_count,
        });
    }

    let mut cmd = Command::new("mkvpropedit");
    cmd.arg(path);
    for track_num in 1..=track_count {
        cmd.arg("--edit")
            .arg(format!("track:a{track_num}"))
            .arg("--set")
            .arg("flag-default=0");
    }
    cmd.arg("--edit")
        .arg(format!("track:a{}", index + 1))
        .arg("--set")
        .arg("flag-default=1");

    let output = timeout(Duration::from_secs(MKV_TIMEOUT_SECS), cmd.output())
        .await
        .map_err(|_| MutateError::Timeout {
            path: path.to_path_buf(),
            timeout_secs: MKV_TIMEOUT_SECS,
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
