use crate::db::{Db, DbResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

pub struct SessionRow {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl Db {
    /// Upsert by token. A re-issued token simply replaces its previous
    /// binding.
    pub fn create_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(token) DO UPDATE SET user_id = excluded.user_id,
                                              expires_at = excluded.expires_at",
            params![token, user_id, expires_at],
        )?;
        Ok(())
    }

    pub fn get_session(&self, token: &str) -> DbResult<Option<SessionRow>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |r| {
                    Ok(SessionRow {
                        user_id: r.get(0)?,
                        expires_at: r.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn delete_session(&self, token: &str) -> DbResult<()> {
        self.conn()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let purged = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(purged as u64)
    }
}
