//! Root binding tracking
//!
//! Roots are the caller's named bindings: references held from outside the
//! object graph rather than from another object's outgoing list. `create` and
//! `add_reference` register a binding; `remove_reference` releases one.
//! The collector treats rooted objects as externally held.

use crate::object::ObjectId;
use rustc_hash::FxHashMap;

/// Per-object count of caller root bindings
#[derive(Debug, Default)]
pub struct RootSet {
    counts: FxHashMap<ObjectId, usize>,
}

impl RootSet {
    /// Create an empty root set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more root binding for an object
    pub fn add(&mut self, id: ObjectId) {
        *self.counts.entry(id).or_insert(0) += 1;
    }

    /// Release one root binding; returns false if none was registered
    pub fn remove(&mut self, id: ObjectId) -> bool {
        match self.counts.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.counts.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Drop all bindings for an object (called on deallocation)
    pub fn forget(&mut self, id: ObjectId) {
        self.counts.remove(&id);
    }

    /// Number of root bindings for an object
    pub fn count(&self, id: ObjectId) -> usize {
        self.counts.get(&id).copied().unwrap_or(0)
    }

    /// Check whether an object has at least one root binding
    pub fn contains(&self, id: ObjectId) -> bool {
        self.counts.contains_key(&id)
    }

    /// Number of distinct rooted objects
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if no object is rooted
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over rooted objects and their binding counts
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, usize)> + '_ {
        self.counts.iter().map(|(id, count)| (*id, *count))
    }
}
