use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mkv,
    Mp4,
    Unsupported,
}

/// One audio stream inside a container, in container order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioTrack {
    /// 0-based position among audio streams only.
    pub index: usize,
    /// Absolute stream index as reported by the container.
    pub stream_index: usize,
    pub codec: String,
    /// Normalized 3-letter code, "und" when unknown.
    pub language: String,
    pub title: Option<String>,
    pub is_default: bool,
    pub channels: Option<u32>,
    pub bitrate: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub container: Container,
    pub tracks: Vec<AudioTrack>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: String,
    codec_name: String,
    channels: Option<u32>,
    bit_rate: Option<String>,
    disposition: Option<FfprobeDisposition>,
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    default: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Classify the container and list its audio tracks in one external-process round trip.
pub async fn probe_file(path: &Path) -> Result<ProbeResult, ProbeError> {
    probe_file_with_timeout(path, DEFAULT_PROBE_TIMEOUT_SECS).await
}

pub async fn probe_file_with_timeout(
    path: &Path,
    timeout_secs: u64,
) -> Result<ProbeResult, ProbeError> {
    let run = async {
        Command::new("ffprobe")
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path)
            .output()
            .await
            .map_err(|e| ProbeError::Spawn {
                path: path.to_path_buf(),
                source: e,
            })
    };

    let output = timeout(Duration::from_secs(timeout_secs), run)
        .await
        .map_err(|_| ProbeError::Timeout {
            path: path.to_path_buf(),
            timeout_secs,
        })??;

    if !output.status.success() {
        return Err(ProbeError::ToolFailed {
            path: path.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: FfprobeOutput =
        serde_json::from_str(&stdout).map_err(|e| ProbeError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(parse_ffprobe_output(parsed))
}

fn classify_container(format_name: Option<&str>) -> Container {
    match format_name {
        Some(name) if name.split(',').any(|n| n == "matroska" || n == "webm") => Container::Mkv,
        Some(name) if name.split(',').any(|n| n == "mp4" || n == "mov" || n == "m4v") => {
            Container::Mp4
        }
        _ => Container::Unsupported,
    }
}

fn normalize_language(lang: Option<String>) -> String {
    match lang {
        Some(l) if !l.trim().is_empty() => l.trim().to_lowercase(),
        _ => "und".to_string(),
    }
}

fn parse_ffprobe_output(output: FfprobeOutput) -> ProbeResult {
    let container = classify_container(
        output
            .format
            .as_ref()
            .and_then(|f| f.format_name.as_deref()),
    );

    let mut tracks = Vec::new();
    let mut audio_ordinal = 0usize;
    for stream in output.streams.unwrap_or_default() {
        if stream.codec_type != "audio" {
            continue;
        }
        let tags = stream.tags;
        tracks.push(AudioTrack {
            index: audio_ordinal,
            stream_index: stream.index,
            codec: stream.codec_name,
            language: normalize_language(tags.as_ref().and_then(|t| t.language.clone())),
            title: tags.and_then(|t| t.title),
            is_default: stream
                .disposition
                .and_then(|d| d.default)
                .map(|v| v == 1)
                .unwrap_or(false),
            channels: stream.channels,
            bitrate: stream.bit_rate.and_then(|b| b.parse::<u64>().ok()),
        });
        audio_ordinal += 1;
    }

    ProbeResult { container, tracks }
}

/// Query the number of audio tracks, falling back to a probe if `ffprobe` cannot be trusted.
pub async fn audio_track_count(path: &Path) -> Result<usize, ProbeError> {
    Ok(probe_file(path).await?.tracks.len())
}
