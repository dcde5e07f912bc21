use crate::db::Db;
use crate::media::sync_media_directory;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Sleep granularity; the stop flag is checked between slices so shutdown
/// never waits for a full interval.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Modification time of the media directory itself, which changes whenever
/// an entry is created, renamed or removed.
pub fn dir_mtime(dir: &Path) -> Option<SystemTime> {
    std::fs::metadata(dir).ok()?.modified().ok()
}

/// Spawns the hot-reload watcher thread. Every interval it compares the
/// directory mtime against the last remembered value and re-synchronizes on
/// change. The remembered value only advances after a successful sync, so
/// failures are retried on the next tick.
pub fn spawn(
    db: Arc<Db>,
    media_dir: PathBuf,
    interval: Duration,
    initial_mtime: Option<SystemTime>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("media-watcher".to_owned())
        .spawn(move || run(&db, &media_dir, interval, initial_mtime, &stop))
}

fn run(
    db: &Db,
    media_dir: &Path,
    interval: Duration,
    initial_mtime: Option<SystemTime>,
    stop: &AtomicBool,
) {
    let mut remembered = initial_mtime;
    'watch: loop {
        let mut slept = Duration::ZERO;
        while slept < interval {
            if stop.load(Ordering::SeqCst) {
                break 'watch;
            }
            thread::sleep(SLEEP_SLICE);
            slept += SLEEP_SLICE;
        }

        let observed = dir_mtime(media_dir);
        if observed.is_none() || observed == remembered {
            continue;
        }
        match sync_media_directory(db, media_dir) {
            Ok(count) => {
                info!(videos = count, "media directory re-synchronized");
                remembered = dir_mtime(media_dir);
            }
            Err(err) => warn!(error = %err, "media re-synchronization failed"),
        }
    }
    info!("media watcher stopped");
}
