mod mkv;
mod mp4;

use std::path::Path;

use crate::error::MutateError;
use crate::prober::Container;

/// Set the default audio track for a file, dispatching to the container-specific
/// variant. `index` is the 0-based ordinal among audio streams (matches
/// `AudioTrack::index` from the prober).
pub async fn set_default_audio(
    container: Container,
    path: &Path,
    index: usize,
) -> Result<(), MutateError> {
    match container {
        Container::Mkv => mkv::set_default_audio(path, index).await,
        Container::Mp4 => mp4::set_default_audio(path, index).await,
        Container::Unsupported => Err(MutateError::InvalidTrack { index, count: 0 }),
    }
}
