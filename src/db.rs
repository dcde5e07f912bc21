use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// One process-wide handle to the store. Every operation takes the mutex for
/// the full statement lifecycle, so callers must never re-enter the store
/// while holding rows; the query methods return fully buffered results.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &Path) -> DbResult<Db> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    /// Applies the schema file verbatim. Statements are idempotent, so this
    /// runs unconditionally at every startup.
    pub fn apply_schema(&self, schema_sql: &str) -> DbResult<()> {
        self.conn().execute_batch(schema_sql)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }
}
