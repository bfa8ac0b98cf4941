use globset::Glob;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::queue::BatchRequest;

const DEFAULT_EXTENSIONS: &[&str] = &["mkv", "mp4"];

/// Walk `request.path` collecting every regular file matching the request's
/// glob pattern. Non-recursive walks apply the pattern literally against
/// top-level entries; recursive walks prefix `**/` onto the pattern if it
/// isn't already anchored with one, so a bare `*.mkv` still matches files in
/// subdirectories. Directories never count as candidates.
pub fn find_candidates(request: &BatchRequest) -> Vec<PathBuf> {
    if request.path.is_file() {
        return vec![request.path.clone()];
    }

    let pattern = effective_pattern(request);
    let glob = match Glob::new(&pattern) {
        Ok(g) => g.compile_matcher(),
        Err(_) => return Vec::new(),
    };

    let mut results: Vec<PathBuf> = WalkDir::new(&request.path)
        .max_depth(if request.recursive { usize::MAX } else { 1 })
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let relative = path.strip_prefix(&request.path).unwrap_or(path);
            glob.is_match(relative) || glob.is_match(path)
        })
        .collect();

    results.sort();
    results.dedup();
    results
}

fn effective_pattern(request: &BatchRequest) -> String {
    let base = request
        .pattern
        .clone()
        .unwrap_or_else(|| format!("*.{{{}}}", DEFAULT_EXTENSIONS.join(",")));

    if request.recursive && !base.contains("**/") {
        format!("**/{base}")
    } else {
        base
    }
}
