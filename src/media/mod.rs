mod sync;
pub mod watcher;

pub use sync::{sync_media_directory, title_from_filename, SyncError};
