//! Ordered schema steps of the item store.
//!
//! # Invariants
//! - Step versions start at 1 and increase by one.
//! - Pending steps run in a single transaction; `PRAGMA user_version` is
//!   bumped after each step inside it.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "items",
        sql: include_str!("0001_items.sql"),
    },
    SchemaStep {
        version: 2,
        name: "id_windows",
        sql: include_str!("0002_id_windows.sql"),
    },
    SchemaStep {
        version: 3,
        name: "templates",
        sql: include_str!("0003_templates.sql"),
    },
];

/// Schema version of a connection against this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current: u32,
    pub latest: u32,
}

impl SchemaStatus {
    pub fn is_current(&self) -> bool {
        self.current == self.latest
    }

    pub fn is_newer_than_build(&self) -> bool {
        self.current > self.latest
    }
}

pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

pub fn schema_status(conn: &Connection) -> DbResult<SchemaStatus> {
    Ok(SchemaStatus {
        current: current_user_version(conn)?,
        latest: latest_version(),
    })
}

/// Brings the item store up to [`latest_version`].
///
/// A store written by a newer build is rejected untouched.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let status = schema_status(conn)?;
    if status.is_newer_than_build() {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: status.current,
            latest_supported: status.latest,
        });
    }
    if status.is_current() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in SCHEMA_STEPS
        .iter()
        .skip_while(|step| step.version <= status.current)
    {
        tx.execute_batch(step.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", step.version))
            .map_err(|source| DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            })?;
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;
    Ok(())
}

pub(crate) fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}
