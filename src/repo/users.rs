use crate::db::{Db, DbError, DbResult};
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

pub struct UserCredentials {
    pub user_id: i64,
    pub hash: Vec<u8>,
    pub salt: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error("{0}")]
    Db(#[from] DbError),
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

impl Db {
    pub fn get_user_credentials(&self, username: &str) -> DbResult<Option<UserCredentials>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT user_id, password_hash, password_salt FROM users WHERE username = ?1",
                params![username],
                |r| {
                    Ok(UserCredentials {
                        user_id: r.get(0)?,
                        hash: r.get(1)?,
                        salt: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_username(&self, user_id: i64) -> DbResult<Option<String>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT username FROM users WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn create_user(
        &self,
        username: &str,
        hash: &[u8],
        salt: &[u8],
    ) -> Result<i64, CreateUserError> {
        let conn = self.conn();
        match conn.execute(
            "INSERT INTO users (username, password_hash, password_salt) VALUES (?1, ?2, ?3)",
            params![username, hash, salt],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(err) if is_unique_violation(&err) => Err(CreateUserError::DuplicateUsername),
            Err(err) => Err(CreateUserError::Db(err.into())),
        }
    }

    /// Insert-if-absent, used only by seeding. Existing rows keep their
    /// credentials.
    pub fn upsert_user(&self, username: &str, hash: &[u8], salt: &[u8]) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO users (username, password_hash, password_salt) VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO NOTHING",
            params![username, hash, salt],
        )?;
        Ok(())
    }
}
