use std::path::{Path, PathBuf};

/// One remote-to-local path rewrite rule.
#[derive(Debug, Clone)]
pub struct PathMapping {
    pub remote: PathBuf,
    pub local: PathBuf,
}

/// Rewrite a path reported by an upstream caller (e.g. a Sonarr/Radarr webhook,
/// which may see the library through a different mount than this process does)
/// to the local filesystem path. Tries each mapping in order; the first whose
/// `remote` prefix is an ancestor of `path` wins. Falls through to the input
/// path unchanged if nothing matches.
///
/// Pure and synchronous; nothing in the pipeline calls this automatically —
/// a caller assembling a job from a webhook payload is expected to call it
/// before submitting.
pub fn map_path(path: &Path, mappings: &[PathMapping]) -> PathBuf {
    for mapping in mappings {
        if let Ok(rest) = path.strip_prefix(&mapping.remote) {
            return mapping.local.join(rest);
        }
    }
    path.to_path_buf()
}
