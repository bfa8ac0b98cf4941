use globset::Glob;
use std::path::Path;

use crate::prober::AudioTrack;

/// Why the selector returned the track it did, or why it returned nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    OriginalLanguage,
    PriorityList,
    NoMatch,
}

pub struct Selection<'a> {
    pub track: Option<&'a AudioTrack>,
    pub reason: SelectionReason,
}

/// One path-scoped override: files whose path matches `glob` use `language_priority`
/// instead of the global list. Evaluated in order; first match wins.
#[derive(Debug, Clone)]
pub struct PathOverride {
    pub glob: String,
    pub language_priority: Vec<String>,
}

/// Resolve the effective priority list for `file_path`: first matching override,
/// else the global list.
pub fn resolve_priority<'a>(
    file_path: &Path,
    overrides: &'a [PathOverride],
    global_priority: &'a [String],
) -> &'a [String] {
    for over in overrides {
        let glob = match Glob::new(&over.glob) {
            Ok(g) => g.compile_matcher(),
            Err(_) => continue,
        };
        if glob.is_match(file_path) {
            return &over.language_priority;
        }
    }
    global_priority
}

/// Choose the default audio track for a file.
///
/// 1. If `original_language` is supplied and some track matches it exactly, return
///    the first such track (ties broken by ascending index).
/// 2. Otherwise walk the effective priority list (path override or global) in order
///    and return the first track matching any code in it.
/// 3. Otherwise return nothing.
pub fn select<'a>(
    tracks: &'a [AudioTrack],
    file_path: &Path,
    original_language: Option<&str>,
    overrides: &[PathOverride],
    global_priority: &[String],
) -> Selection<'a> {
    if let Some(lang) = original_language {
        if let Some(track) = tracks.iter().find(|t| t.language == lang) {
            return Selection {
                track: Some(track),
                reason: SelectionReason::OriginalLanguage,
            };
        }
    }

    let priority = resolve_priority(file_path, overrides, global_priority);
    for code in priority {
        if let Some(track) = tracks.iter().find(|t| &t.language == code) {
            return Selection {
                track: Some(track),
                reason: SelectionReason::PriorityList,
            };
        }
    }

    Selection {
        track: None,
        reason: SelectionReason::NoMatch,
    }
}
