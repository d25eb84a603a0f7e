//! SQLite-backed persistence adapter.

use super::{RepoError, RepoResult};
use crate::db::migrations::{apply_migrations, schema_status};
use crate::db::{open_db, open_db_in_memory, DbError};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;

const REQUIRED_TABLES: [&str; 4] = ["items", "item_sequence", "owner_id_windows", "item_templates"];

/// Single-connection item store shared by every box of a process.
///
/// Implements [`ItemRepository`](super::ItemRepository),
/// [`SequenceRepository`](super::SequenceRepository) and
/// [`TemplateRepository`](super::TemplateRepository).
pub struct SqliteItemStore {
    conn: Mutex<Connection>,
}

impl SqliteItemStore {
    /// Wraps a connection, applying pending migrations first.
    pub fn try_new(mut conn: Connection) -> RepoResult<Self> {
        apply_migrations(&mut conn)?;
        ensure_store_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens (and migrates) the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::try_new(open_db(path)?)
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

fn ensure_store_ready(conn: &Connection) -> RepoResult<()> {
    let status = schema_status(conn)?;
    if !status.is_current() {
        return Err(RepoError::Db(DbError::UnsupportedSchemaVersion {
            db_version: status.current,
            latest_supported: status.latest,
        }));
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
