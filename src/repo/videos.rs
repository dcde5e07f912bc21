use crate::db::{Db, DbResult};
use rusqlite::{params, OptionalExtension};

pub struct VideoRow {
    pub video_id: i64,
    pub title: String,
    pub filename: String,
    pub description: Option<String>,
    pub duration: Option<i64>,
}

pub struct VideoListRow {
    pub video_id: i64,
    pub title: String,
    pub filename: String,
    pub description: Option<String>,
    pub duration: Option<i64>,
    pub resume_seconds: f64,
}

const LIST_COLUMNS: &str = "v.video_id, v.title, v.filename, v.description, v.duration,
                            COALESCE(h.position, 0.0) AS resume_seconds";

impl Db {
    /// Upsert keyed by filename. The directory scan passes no description or
    /// duration, so NULL inputs keep whatever the row already carries.
    pub fn upsert_video(
        &self,
        title: &str,
        filename: &str,
        description: Option<&str>,
        duration: Option<i64>,
    ) -> DbResult<i64> {
        let conn = self.conn();
        let video_id = conn.query_row(
            "INSERT INTO videos (title, filename, description, duration) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(filename) DO UPDATE SET
                 title = excluded.title,
                 description = COALESCE(excluded.description, videos.description),
                 duration = COALESCE(excluded.duration, videos.duration)
             RETURNING video_id",
            params![title, filename, description, duration],
            |r| r.get(0),
        )?;
        Ok(video_id)
    }

    pub fn delete_video_by_filename(&self, filename: &str) -> DbResult<()> {
        self.conn().execute(
            "DELETE FROM videos WHERE filename = ?1",
            params![filename],
        )?;
        Ok(())
    }

    /// Deletes every video whose filename is not in `live`. The live set is
    /// staged in a temp table so the delete is a single statement and no
    /// transaction state outlives this call.
    pub fn prune_missing_videos(&self, live: &[String]) -> DbResult<u64> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS live_media (filename TEXT PRIMARY KEY);
             DELETE FROM live_media;",
        )?;
        {
            let mut insert = conn.prepare("INSERT OR IGNORE INTO live_media (filename) VALUES (?1)")?;
            for filename in live {
                insert.execute(params![filename])?;
            }
        }
        let pruned = conn.execute(
            "DELETE FROM videos WHERE filename NOT IN (SELECT filename FROM live_media)",
            [],
        )?;
        conn.execute("DROP TABLE live_media", [])?;
        Ok(pruned as u64)
    }

    pub fn get_video_by_id(&self, video_id: i64) -> DbResult<Option<VideoRow>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT video_id, title, filename, description, duration
                 FROM videos WHERE video_id = ?1",
                params![video_id],
                |r| {
                    Ok(VideoRow {
                        video_id: r.get(0)?,
                        title: r.get(1)?,
                        filename: r.get(2)?,
                        description: r.get(3)?,
                        duration: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// One catalog page with the caller's resume position joined in. Fetches
    /// `limit + 1` rows so the caller learns whether another page exists
    /// without a separate count.
    pub fn list_videos_with_resume(
        &self,
        user_id: i64,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<(Vec<VideoListRow>, bool)> {
        let conn = self.conn();
        let map_row = |r: &rusqlite::Row<'_>| {
            Ok(VideoListRow {
                video_id: r.get(0)?,
                title: r.get(1)?,
                filename: r.get(2)?,
                description: r.get(3)?,
                duration: r.get(4)?,
                resume_seconds: r.get(5)?,
            })
        };
        let mut videos: Vec<VideoListRow> = match search {
            Some(q) => {
                let pattern = format!("%{q}%");
                let mut stmt = conn.prepare(&format!(
                    "SELECT {LIST_COLUMNS}
                     FROM videos v
                     LEFT JOIN watch_history h ON h.video_id = v.video_id AND h.user_id = ?1
                     WHERE v.title LIKE ?2 OR v.filename LIKE ?2
                        OR COALESCE(v.description, '') LIKE ?2
                     ORDER BY v.video_id ASC
                     LIMIT ?3 OFFSET ?4"
                ))?;
                let rows = stmt.query_map(params![user_id, pattern, limit + 1, offset], map_row)?;
                rows.collect::<Result<_, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {LIST_COLUMNS}
                     FROM videos v
                     LEFT JOIN watch_history h ON h.video_id = v.video_id AND h.user_id = ?1
                     ORDER BY v.video_id ASC
                     LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt.query_map(params![user_id, limit + 1, offset], map_row)?;
                rows.collect::<Result<_, _>>()?
            }
        };
        let has_more = videos.len() as i64 > limit;
        videos.truncate(limit.max(0) as usize);
        Ok((videos, has_more))
    }
}
