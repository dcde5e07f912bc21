use crate::config::Config;
use crate::db::Db;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub config: Arc<Config>,
    thumb_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new(db: Arc<Db>, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
            thumb_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Per-video lock serializing thumbnail generation. The map is bounded
    /// by the catalog size.
    pub fn thumb_lock(&self, video_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.thumb_locks.lock().expect("thumbnail lock map poisoned");
        locks
            .entry(video_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
