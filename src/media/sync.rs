use crate::db::{Db, DbError};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("media directory scan failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog update failed: {0}")]
    Db(#[from] DbError),
}

/// Makes the video table equal to the set of `.mp4` files currently in the
/// media directory. Upsert errors abort before the prune so a transient
/// store failure never empties the catalog.
pub fn sync_media_directory(db: &Db, media_dir: &Path) -> Result<usize, SyncError> {
    let mut observed = Vec::new();
    for entry in std::fs::read_dir(media_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') || !name.to_ascii_lowercase().ends_with(".mp4") {
            continue;
        }
        let title = title_from_filename(name);
        let video_id = db.upsert_video(&title, name, None, None)?;
        debug!(video_id, filename = name, "catalog upsert");
        observed.push(name.to_owned());
    }
    let pruned = db.prune_missing_videos(&observed)?;
    if pruned > 0 {
        info!(pruned, "pruned videos no longer on disk");
    }
    Ok(observed.len())
}

/// Human-readable title: drop the final extension, turn `_`/`-` into
/// spaces, fall back to the raw name when that leaves nothing.
pub fn title_from_filename(name: &str) -> String {
    let stem = name.rfind('.').map_or(name, |i| &name[..i]);
    let title = stem.replace(['_', '-'], " ");
    if title.trim().is_empty() {
        name.to_owned()
    } else {
        title
    }
}
