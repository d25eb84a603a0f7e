//! Item row persistence contract and its SQLite implementation.

use super::sqlite_store::SqliteItemStore;
use super::{RepoError, RepoResult};
use crate::model::attribute::{Attr, AttributeTable};
use crate::model::item::{ItemData, ItemId};
use crate::model::owner::OwnerRef;
use rusqlite::{params, Row};

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    parent_id,
    owner_kind,
    owner_id,
    attrs
FROM items";

/// Durable storage of item rows.
pub trait ItemRepository: Send + Sync {
    /// Loads every row owned by `owner`, top-level and included alike.
    fn load_items(&self, owner: OwnerRef) -> RepoResult<Vec<ItemData>>;
    fn load_item(&self, id: ItemId) -> RepoResult<Option<ItemData>>;
    /// Inserts or replaces the row with the item's id.
    fn save_item(&self, item: &ItemData) -> RepoResult<()>;
    /// Deletes the row and every row included in it; returns the rows removed.
    fn cascading_delete(&self, id: ItemId) -> RepoResult<usize>;
}

impl ItemRepository for SqliteItemStore {
    fn load_items(&self, owner: OwnerRef) -> RepoResult<Vec<ItemData>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE owner_kind = ?1 AND owner_id = ?2
             ORDER BY id ASC;"
        ))?;

        let mut rows = stmt.query(params![owner.kind_str(), owner.id()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn load_item(&self, id: ItemId) -> RepoResult<Option<ItemData>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn save_item(&self, item: &ItemData) -> RepoResult<()> {
        let id = item.id();
        if id <= 0 {
            return Err(RepoError::InvalidData(format!(
                "refusing to save item without a positive id ({id})"
            )));
        }
        let attrs = serde_json::to_string(&item.attrs)
            .map_err(|err| RepoError::InvalidData(format!("item {id} attrs: {err}")))?;

        self.conn().execute(
            "INSERT INTO items (id, parent_id, owner_kind, owner_id, attrs)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                parent_id = excluded.parent_id,
                owner_kind = excluded.owner_kind,
                owner_id = excluded.owner_id,
                attrs = excluded.attrs,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                id,
                item.parent,
                item.owner.kind_str(),
                item.owner.id(),
                attrs
            ],
        )?;
        Ok(())
    }

    fn cascading_delete(&self, id: ItemId) -> RepoResult<usize> {
        let changed = self
            .conn()
            .execute("DELETE FROM items WHERE id = ?1 OR parent_id = ?1;", [id])?;
        Ok(changed)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<ItemData> {
    let id: ItemId = row.get("id")?;
    let owner_kind: String = row.get("owner_kind")?;
    let owner_id: i64 = row.get("owner_id")?;
    let owner = OwnerRef::from_parts(&owner_kind, owner_id).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid owner kind `{owner_kind}` in items.owner_kind for item {id}"
        ))
    })?;

    let attrs_text: String = row.get("attrs")?;
    let mut attrs: AttributeTable = serde_json::from_str(&attrs_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid attrs for item {id} in items.attrs: {err}"))
    })?;
    // The row key wins over whatever the blob says.
    attrs.set(Attr::Id, id);

    Ok(ItemData {
        parent: row.get("parent_id")?,
        owner,
        attrs,
    })
}
