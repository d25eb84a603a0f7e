use super::{AllocError, AllocResult, IdSource};
use crate::model::item::ItemId;
use crate::repo::SequenceRepository;
use log::debug;
use std::ops::Range;
use std::sync::Arc;

/// Global monotonic identifier sequence backed by the durable store.
#[derive(Clone)]
pub struct GlobalAllocator {
    store: Arc<dyn SequenceRepository>,
}

impl GlobalAllocator {
    pub fn new(store: Arc<dyn SequenceRepository>) -> Self {
        Self { store }
    }

    /// Allocates one identifier.
    pub fn allocate(&self) -> AllocResult<ItemId> {
        Ok(self.store.allocate_sequence()?)
    }

    /// Allocates `count` contiguous identifiers in one store round trip.
    pub fn allocate_batch(&self, count: u32) -> AllocResult<Range<ItemId>> {
        if count == 0 {
            return Err(AllocError::EmptyBatch);
        }
        let start = self.store.allocate_sequence_batch(count)?;
        debug!("event=id_batch module=alloc status=ok start={start} count={count}");
        Ok(start..start + i64::from(count))
    }
}

impl IdSource for GlobalAllocator {
    fn next_id(&self) -> AllocResult<ItemId> {
        self.allocate()
    }
}
