//! Two-tier item identifier allocation.
//!
//! # Responsibility
//! - Wrap the durable monotonic sequence (`GlobalAllocator`).
//! - Hand out per-owner identifiers from pre-reserved windows
//!   (`WindowAllocator`), one durable round trip per window.
//!
//! # Invariants
//! - Identifiers from one allocator are strictly increasing.
//! - Windows never overlap: each one is a contiguous batch of the global
//!   sequence.
//! - A crash wastes at most the unused part of one window.

use crate::model::item::ItemId;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod global;
mod window;

pub use global::GlobalAllocator;
pub use window::{IdWindow, WindowAllocator};

/// Identifiers reserved per owner window.
pub const ID_WINDOW_SIZE: i64 = 100;

pub type AllocResult<T> = Result<T, AllocError>;

/// Errors from identifier allocation.
#[derive(Debug)]
pub enum AllocError {
    /// The durable sequence could not be advanced.
    Repo(RepoError),
    /// A batch of zero identifiers was requested.
    EmptyBatch,
}

impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "id allocation failed: {err}"),
            Self::EmptyBatch => write!(f, "id batch size must be positive"),
        }
    }
}

impl Error for AllocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::EmptyBatch => None,
        }
    }
}

impl From<RepoError> for AllocError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Source of fresh item identifiers.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> AllocResult<ItemId>;
}
