//! Persistence adapter contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Define the narrow data access contracts the item engine depends on.
//! - Keep SQL details inside `SqliteItemStore`.
//!
//! # Invariants
//! - Contracts are object safe and `Send + Sync`; boxes hold them as
//!   `Arc<dyn ...>`.
//! - Adapter failures are returned, never swallowed.
//! - Read paths reject malformed persisted rows instead of masking them.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod item_repo;
pub mod sequence_repo;
pub mod sqlite_store;
pub mod template_repo;

pub use item_repo::ItemRepository;
pub use sequence_repo::SequenceRepository;
pub use sqlite_store::SqliteItemStore;
pub use template_repo::TemplateRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error raised by persistence adapters.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    /// Adapter unreachable or refusing work.
    Unavailable(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted item data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::Unavailable(message) => write!(f, "item store unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) | Self::MissingRequiredTable(_) | Self::Unavailable(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
