//! Global id sequence and per-owner id window persistence.

use super::sqlite_store::SqliteItemStore;
use super::{RepoError, RepoResult};
use crate::alloc::IdWindow;
use crate::model::item::ItemId;
use crate::model::owner::OwnerRef;
use rusqlite::{params, OptionalExtension};

const ITEM_SEQUENCE: &str = "items";

/// Durable monotonic sequence plus window bookkeeping.
pub trait SequenceRepository: Send + Sync {
    fn allocate_sequence(&self) -> RepoResult<ItemId> {
        self.allocate_sequence_batch(1)
    }

    /// Reserves `count` contiguous values and returns the first one.
    fn allocate_sequence_batch(&self, count: u32) -> RepoResult<ItemId>;

    fn load_window(&self, owner: OwnerRef) -> RepoResult<Option<IdWindow>>;

    fn save_window(&self, owner: OwnerRef, window: &IdWindow) -> RepoResult<()>;
}

impl SequenceRepository for SqliteItemStore {
    fn allocate_sequence_batch(&self, count: u32) -> RepoResult<ItemId> {
        if count == 0 {
            return Err(RepoError::InvalidData(
                "sequence batch size must be positive".to_string(),
            ));
        }
        let start = self
            .conn()
            .query_row(
                "UPDATE item_sequence
                 SET next_value = next_value + ?1
                 WHERE name = ?2
                 RETURNING next_value - ?1;",
                params![i64::from(count), ITEM_SEQUENCE],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        start.ok_or(RepoError::MissingRequiredTable("item_sequence"))
    }

    fn load_window(&self, owner: OwnerRef) -> RepoResult<Option<IdWindow>> {
        let window = self
            .conn()
            .query_row(
                "SELECT window_start, next_window_start, cursor
                 FROM owner_id_windows
                 WHERE owner_kind = ?1 AND owner_id = ?2;",
                params![owner.kind_str(), owner.id()],
                |row| {
                    Ok(IdWindow {
                        window_start: row.get(0)?,
                        next_window_start: row.get(1)?,
                        cursor: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(window)
    }

    fn save_window(&self, owner: OwnerRef, window: &IdWindow) -> RepoResult<()> {
        self.conn().execute(
            "INSERT INTO owner_id_windows (owner_kind, owner_id, window_start, next_window_start, cursor)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(owner_kind, owner_id) DO UPDATE SET
                window_start = excluded.window_start,
                next_window_start = excluded.next_window_start,
                cursor = excluded.cursor,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                owner.kind_str(),
                owner.id(),
                window.window_start,
                window.next_window_start,
                window.cursor
            ],
        )?;
        Ok(())
    }
}
