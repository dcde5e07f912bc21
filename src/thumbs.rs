use crate::http::response::ApiError;
use crate::state::AppState;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Seek offset for the poster frame, in seconds.
const POSTER_FRAME_OFFSET: &str = "5";

/// Returns the cached poster JPEG for `video_id`, regenerating it through
/// the external encoder when the cache is missing or older than the source.
/// Generation is serialized per id; losers of the race re-check freshness
/// under the lock and reuse the winner's output.
pub fn get_or_generate(
    state: &AppState,
    video_id: i64,
    source: &Path,
) -> Result<Vec<u8>, ApiError> {
    let cache_path = state.config.thumb_dir.join(format!("{video_id}.jpg"));
    if is_fresh(&cache_path, source) {
        return read_jpeg(&cache_path);
    }

    let lock = state.thumb_lock(video_id);
    let _guard = lock.lock().expect("thumbnail lock poisoned");
    if is_fresh(&cache_path, source) {
        return read_jpeg(&cache_path);
    }

    std::fs::create_dir_all(&state.config.thumb_dir).map_err(ApiError::internal)?;
    debug!(video_id, source = %source.display(), "generating thumbnail");
    let status = Command::new(&state.config.ffmpeg_path)
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-ss")
        .arg(POSTER_FRAME_OFFSET)
        .arg("-i")
        .arg(source)
        .arg("-vframes")
        .arg("1")
        .arg("-vf")
        .arg("scale=320:-1")
        .arg(&cache_path)
        .status();

    match status {
        Ok(status) if status.success() => read_jpeg(&cache_path),
        Ok(status) => {
            warn!(video_id, code = status.code(), "thumbnail encoder failed");
            remove_partial(&cache_path);
            Err(ApiError::Internal)
        }
        Err(err) => {
            warn!(video_id, error = %err, "failed to spawn thumbnail encoder");
            remove_partial(&cache_path);
            Err(ApiError::Internal)
        }
    }
}

/// A cache entry is fresh when it exists and is at least as new as the
/// source file.
fn is_fresh(cache_path: &Path, source: &Path) -> bool {
    let Ok(cache_meta) = std::fs::metadata(cache_path) else {
        return false;
    };
    let Ok(source_meta) = std::fs::metadata(source) else {
        return false;
    };
    match (cache_meta.modified(), source_meta.modified()) {
        (Ok(cache_mtime), Ok(source_mtime)) => cache_mtime >= source_mtime,
        _ => false,
    }
}

fn read_jpeg(path: &Path) -> Result<Vec<u8>, ApiError> {
    std::fs::read(path).map_err(ApiError::internal)
}

fn remove_partial(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove partial thumbnail");
        }
    }
}
