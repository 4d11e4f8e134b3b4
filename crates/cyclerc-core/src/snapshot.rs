//! Heap snapshots
//!
//! A snapshot is a serializable dump of the live object graph: per-object
//! identity, payload kind, reference count, root bindings, and outgoing
//! edges, plus lifetime counters. It is the data source for diagnostic
//! surfaces (the console layer's `status` and `list` commands) and for tests
//! asserting that a failed operation left state untouched.

use crate::object::{ObjectId, PayloadKind};
use crate::tracker::ReferenceTracker;
use serde::{Deserialize, Serialize};

/// One live object as seen by a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Stable identity
    pub id: ObjectId,

    /// Payload kind (contents are not serialized)
    pub kind: PayloadKind,

    /// Current reference count
    pub refcount: usize,

    /// Caller root bindings held for this object
    pub root_bindings: usize,

    /// Outgoing strong references, in order
    pub outgoing: Vec<ObjectId>,
}

/// Serializable dump of the live object graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    /// Live objects in ascending id order
    pub objects: Vec<ObjectRecord>,

    /// Objects created over the tracker's lifetime
    pub total_created: usize,

    /// Objects deallocated over the tracker's lifetime
    pub total_deallocated: usize,
}

impl HeapSnapshot {
    /// Number of live objects in the snapshot
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Find a record by id
    pub fn get(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.objects
            .binary_search_by_key(&id, |record| record.id)
            .ok()
            .map(|index| &self.objects[index])
    }
}

impl ReferenceTracker {
    /// Take a snapshot of the live object graph
    pub fn snapshot(&self) -> HeapSnapshot {
        let state = self.state();
        let mut objects: Vec<ObjectRecord> = state
            .objects
            .values()
            .map(|obj| ObjectRecord {
                id: obj.id(),
                kind: obj.payload().kind(),
                refcount: obj.refcount(),
                root_bindings: state.roots.count(obj.id()),
                outgoing: obj.outgoing().to_vec(),
            })
            .collect();
        objects.sort_unstable_by_key(|record| record.id);

        HeapSnapshot {
            objects,
            total_created: state.stats.total_created,
            total_deallocated: state.stats.total_deallocated,
        }
    }
}
