use crate::db::{Db, DbResult};
use chrono::{DateTime, Utc};
use rusqlite::params;

pub struct HistoryRow {
    pub video_id: i64,
    pub title: String,
    pub position: f64,
    pub updated_at: DateTime<Utc>,
}

impl Db {
    /// Last-writer-wins upsert keyed by (user, video).
    pub fn update_watch_history(
        &self,
        user_id: i64,
        video_id: i64,
        position: f64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO watch_history (user_id, video_id, position, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, video_id) DO UPDATE SET
                 position = excluded.position,
                 updated_at = excluded.updated_at",
            params![user_id, video_id, position, now],
        )?;
        Ok(())
    }

    pub fn list_watch_history(&self, user_id: i64) -> DbResult<Vec<HistoryRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT h.video_id, v.title, h.position, h.updated_at
             FROM watch_history h
             JOIN videos v ON v.video_id = h.video_id
             WHERE h.user_id = ?1
             ORDER BY h.updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |r| {
            Ok(HistoryRow {
                video_id: r.get(0)?,
                title: r.get(1)?,
                position: r.get(2)?,
                updated_at: r.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}
