//! Item domain model.
//!
//! # Responsibility
//! - Define the attribute schema, item records and ownership references.
//! - Provide the snapshot list used for lock-free traversal of boxes.
//!
//! # Invariants
//! - Every record is identified by a positive `ItemId`.
//! - Inclusion is one level deep.

pub mod attribute;
pub mod item;
pub mod owner;
pub mod snapshot;
pub mod template;
