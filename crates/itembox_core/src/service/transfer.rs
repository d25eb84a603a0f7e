//! Moves between boxes.
//!
//! A move is two box operations: take from the source, then add to the
//! destination. It is not atomic. If the destination add fails the item has
//! already left the source; the error carries its id and is logged.

use super::item_box::{BoxError, BoxResult, ItemBox};
use super::owner::{Owner, OwnerIds};
use crate::model::item::{AttrPatch, Item, ItemId};
use log::{debug, error};
use std::sync::Arc;

/// Takes `count` of item `id` out of `src` (see [`ItemBox::get_split_item`]),
/// hands it to `dst`'s owner with `patch` applied, and adds it to `dst`.
///
/// Returns the item as it now sits in `dst`. A destination write failure
/// is queued by `dst` and still returns the item.
pub fn move_item(
    src: &ItemBox,
    id: ItemId,
    count: i32,
    keep_same_id: bool,
    dst: &ItemBox,
    actor: &dyn Owner,
    patch: &AttrPatch,
) -> BoxResult<Arc<Item>> {
    ensure_actor(src, id, actor)?;
    let item = src.get_split_item(id, count, keep_same_id, &OwnerIds(actor))?;
    item.relocate(dst.owner(), patch);
    admit(dst, item, id)
}

/// Like [`move_item`], but when `dst` already holds a joinable stack the
/// moved count is added to it instead of creating a new record.
///
/// Items without a positive count cannot be absorbed and are moved as is.
pub fn join_move_item(
    src: &ItemBox,
    id: ItemId,
    count: i32,
    dst: &ItemBox,
    actor: &dyn Owner,
    patch: &AttrPatch,
) -> BoxResult<Arc<Item>> {
    ensure_actor(src, id, actor)?;
    let sample = src
        .find_item(id)
        .ok_or(BoxError::NotFound(id))?
        .record()
        .data();
    if sample.count() <= 0 {
        return move_item(src, id, count, false, dst, actor, patch);
    }
    let Some(target) = dst.find_joinable_item(&sample) else {
        return move_item(src, id, count, false, dst, actor, patch);
    };

    let moved = match src.withdraw(id, count) {
        Ok(moved) => moved,
        // Emptied since the sample was taken.
        Err(BoxError::InvalidCount { .. }) => {
            return move_item(src, id, count, false, dst, actor, patch)
        }
        Err(err) => return Err(err),
    };
    let total = match dst.add_count(target.id(), moved) {
        Ok(total) => total,
        Err(BoxError::Adapter { .. }) => target.record().count(),
        Err(err) => {
            error!(
                "event=join_move module=transfer status=error item_id={id} target_id={} moved={moved} error_code=target_update_failed error={err}",
                target.id()
            );
            return Err(err);
        }
    };
    debug!(
        "event=join_move module=transfer status=ok item_id={id} target_id={} moved={moved} total={total}",
        target.id()
    );
    Ok(target)
}

fn ensure_actor(src: &ItemBox, id: ItemId, actor: &dyn Owner) -> BoxResult<()> {
    if actor.bypasses_checks() || actor.owner_ref() == src.owner() {
        return Ok(());
    }
    Err(BoxError::Forbidden {
        id,
        actor: actor.owner_ref(),
    })
}

fn admit(dst: &ItemBox, item: Arc<Item>, source_id: ItemId) -> BoxResult<Arc<Item>> {
    match dst.add_item(Arc::clone(&item)) {
        Ok(true) => Ok(item),
        Ok(false) => {
            error!(
                "event=move_item module=transfer status=error item_id={source_id} moved_id={} owner={} error_code=duplicate_in_destination",
                item.id(),
                dst.owner()
            );
            Err(BoxError::Integrity(format!(
                "destination {} already holds item {}",
                dst.owner(),
                item.id()
            )))
        }
        Err(BoxError::Adapter { .. }) => Ok(item),
        Err(err) => Err(err),
    }
}
