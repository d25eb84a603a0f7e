//! Copy-on-write record lists with atomically published snapshots.
//!
//! # Invariants
//! - Readers hold an `Arc<Snapshot<T>>` that never changes under them.
//! - Every structural change publishes a new snapshot with `generation + 1`.
//! - Writers are serialized by the publication lock; readers only clone the
//!   current pointer.

use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable view of a list at one generation.
#[derive(Debug)]
pub struct Snapshot<T> {
    generation: u64,
    entries: Vec<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.entries.iter()
    }

    pub fn first(&self) -> Option<&Arc<T>> {
        self.entries.first()
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Ordered list whose mutations replace the whole snapshot.
#[derive(Debug)]
pub struct CowList<T> {
    current: RwLock<Arc<Snapshot<T>>>,
}

impl<T> Default for CowList<T> {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot {
                generation: 0,
                entries: Vec::new(),
            })),
        }
    }
}

impl<T> CowList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the current snapshot for a consistent traversal.
    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        Arc::clone(&*self.current.read())
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Appends `entry` unless an existing entry matches `is_same`.
    ///
    /// Returns `false` when an equal entry was already present.
    pub fn push_if_absent(&self, entry: Arc<T>, is_same: impl Fn(&T, &T) -> bool) -> bool {
        let mut current = self.current.write();
        if current.entries.iter().any(|existing| is_same(existing, &entry)) {
            return false;
        }
        let mut entries = current.entries.clone();
        entries.push(entry);
        *current = Arc::new(Snapshot {
            generation: current.generation + 1,
            entries,
        });
        true
    }

    /// Removes the first entry matching `predicate` and returns it.
    pub fn remove_first(&self, predicate: impl Fn(&Arc<T>) -> bool) -> Option<Arc<T>> {
        let mut current = self.current.write();
        let position = current.entries.iter().position(|entry| predicate(entry))?;
        let mut entries = current.entries.clone();
        let removed = entries.remove(position);
        *current = Arc::new(Snapshot {
            generation: current.generation + 1,
            entries,
        });
        Some(removed)
    }
}
