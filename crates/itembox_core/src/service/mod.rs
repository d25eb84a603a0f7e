//! Item engine services.
//!
//! # Responsibility
//! - Orchestrate boxes, transfers, owner sessions and templates over the
//!   persistence contracts.
//!
//! # Invariants
//! - Services depend on repository traits, never on SQL.

pub mod engine;
pub mod item_box;
pub mod owner;
pub mod sync_task;
pub mod template_registry;
pub mod transfer;
