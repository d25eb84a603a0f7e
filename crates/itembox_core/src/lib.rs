//! Hierarchical item storage for game-server owners.
//! Boxes of items per owner, stack arithmetic, transfers, write-through
//! persistence and two-tier id allocation.

pub mod alloc;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use alloc::{
    AllocError, AllocResult, GlobalAllocator, IdSource, IdWindow, WindowAllocator, ID_WINDOW_SIZE,
};
pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::attribute::{Attr, AttrKind, AttrValue, AttributeTable};
pub use model::item::{AttrPatch, Item, ItemData, ItemError, ItemId, ItemRecord, ItemRef};
pub use model::owner::OwnerRef;
pub use model::template::{ItemTemplate, TemplateError};
pub use repo::{
    ItemRepository, RepoError, RepoResult, SequenceRepository, SqliteItemStore,
    TemplateRepository,
};
pub use service::engine::{Engine, EngineError};
pub use service::item_box::{
    BoxError, BoxResult, FailureClass, ItemBox, LoadReport, SyncOutcome, SyncReport,
};
pub use service::owner::{Owner, OwnerIds, OwnerSession};
pub use service::sync_task::SyncTask;
pub use service::template_registry::TemplateRegistry;
pub use service::transfer::{join_move_item, move_item};

/// Returns the engine crate version.
pub fn engine_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
