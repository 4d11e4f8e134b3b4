//! Container operations
//!
//! Sequence and mapping objects are ordinary tracked objects whose payload
//! describes their structure. Every element mutation routes through the
//! tracker's internal increment/decrement path — never a direct field write —
//! so container slots are strong references like any other, and removing the
//! last reference to a container cascades release of everything it holds.
//!
//! A sequence stores its elements as the object's outgoing edges, in order.
//! A mapping stores key-to-id entries in its payload, with one matching
//! outgoing edge per entry.
//!
//! `list_get`/`dict_get` return borrowed handles: reading does not add a
//! reference, and releasing a borrowed handle is a caller bug.

use crate::handle::ObjectHandle;
use crate::object::{ObjectId, Payload, PayloadKind};
use crate::tracker::{decref_cascade, incref, ReferenceTracker};
use crate::{TrackerError, TrackerResult};

impl ReferenceTracker {
    /// Append a child to a sequence
    pub fn list_push(&self, list: &ObjectHandle, child: &ObjectHandle) -> TrackerResult<()> {
        let len = self.list_len(list)?;
        self.list_insert(list, len, child)
    }

    /// Insert a child into a sequence at `index` (shifting later elements)
    pub fn list_insert(
        &self,
        list: &ObjectHandle,
        index: usize,
        child: &ObjectHandle,
    ) -> TrackerResult<()> {
        self.mutation_guard()?;
        let list_id = list.id();
        let child_id = child.id();

        let mut events = Vec::new();
        {
            let mut state = self.state_mut();
            if !state.objects.contains_key(&child_id) {
                return Err(TrackerError::InvalidHandle(child_id));
            }
            let obj = state
                .objects
                .get_mut(&list_id)
                .ok_or(TrackerError::InvalidHandle(list_id))?;
            expect_kind(&obj.payload, PayloadKind::List)?;
            if index > obj.outgoing.len() {
                return Err(TrackerError::IndexOutOfBounds {
                    index,
                    len: obj.outgoing.len(),
                });
            }
            obj.outgoing.insert(index, child_id);
            incref(&mut state, &mut events, child_id);
        }
        self.dispatch(events);
        Ok(())
    }

    /// Remove the element at `index`, releasing its reference
    ///
    /// Returns the removed object's id (which may already be deallocated if
    /// the sequence held its last reference).
    pub fn list_remove(&self, list: &ObjectHandle, index: usize) -> TrackerResult<ObjectId> {
        self.mutation_guard()?;
        let list_id = list.id();

        let mut events = Vec::new();
        let removed = {
            let mut state = self.state_mut();
            let obj = state
                .objects
                .get_mut(&list_id)
                .ok_or(TrackerError::InvalidHandle(list_id))?;
            expect_kind(&obj.payload, PayloadKind::List)?;
            if index >= obj.outgoing.len() {
                return Err(TrackerError::IndexOutOfBounds {
                    index,
                    len: obj.outgoing.len(),
                });
            }
            let removed = obj.outgoing.remove(index);
            decref_cascade(&mut state, &mut events, removed);
            removed
        };
        self.dispatch(events);
        Ok(removed)
    }

    /// Get a borrowed handle to the element at `index`
    pub fn list_get(&self, list: &ObjectHandle, index: usize) -> TrackerResult<ObjectHandle> {
        let state = self.state();
        let obj = state
            .objects
            .get(&list.id())
            .ok_or(TrackerError::InvalidHandle(list.id()))?;
        expect_kind(&obj.payload, PayloadKind::List)?;
        obj.outgoing
            .get(index)
            .map(|&id| ObjectHandle::new(id))
            .ok_or(TrackerError::IndexOutOfBounds {
                index,
                len: obj.outgoing.len(),
            })
    }

    /// Number of elements in a sequence
    pub fn list_len(&self, list: &ObjectHandle) -> TrackerResult<usize> {
        let state = self.state();
        let obj = state
            .objects
            .get(&list.id())
            .ok_or(TrackerError::InvalidHandle(list.id()))?;
        expect_kind(&obj.payload, PayloadKind::List)?;
        Ok(obj.outgoing.len())
    }

    /// Insert a child into a mapping under `key`
    ///
    /// Replacing an existing key releases the previously held value as part
    /// of the same operation.
    pub fn dict_insert(
        &self,
        dict: &ObjectHandle,
        key: &str,
        child: &ObjectHandle,
    ) -> TrackerResult<()> {
        self.mutation_guard()?;
        let dict_id = dict.id();
        let child_id = child.id();

        let mut events = Vec::new();
        {
            let mut state = self.state_mut();
            if !state.objects.contains_key(&child_id) {
                return Err(TrackerError::InvalidHandle(child_id));
            }
            let obj = state
                .objects
                .get_mut(&dict_id)
                .ok_or(TrackerError::InvalidHandle(dict_id))?;
            let map = match &mut obj.payload {
                Payload::Dict(map) => map,
                other => {
                    return Err(TrackerError::TypeError(format!(
                        "expected Dict payload, found {:?}",
                        other.kind()
                    )))
                }
            };

            let replaced = map.insert(key.to_string(), child_id);
            obj.outgoing.push(child_id);
            incref(&mut state, &mut events, child_id);

            if let Some(old_id) = replaced {
                if let Some(obj) = state.objects.get_mut(&dict_id) {
                    if let Some(position) = obj.outgoing.iter().rposition(|&edge| edge == old_id) {
                        obj.outgoing.remove(position);
                    }
                }
                decref_cascade(&mut state, &mut events, old_id);
            }
        }
        self.dispatch(events);
        Ok(())
    }

    /// Remove the entry under `key`, releasing its reference
    ///
    /// Returns the removed object's id.
    pub fn dict_remove(&self, dict: &ObjectHandle, key: &str) -> TrackerResult<ObjectId> {
        self.mutation_guard()?;
        let dict_id = dict.id();

        let mut events = Vec::new();
        let removed = {
            let mut state = self.state_mut();
            let obj = state
                .objects
                .get_mut(&dict_id)
                .ok_or(TrackerError::InvalidHandle(dict_id))?;
            let map = match &mut obj.payload {
                Payload::Dict(map) => map,
                other => {
                    return Err(TrackerError::TypeError(format!(
                        "expected Dict payload, found {:?}",
                        other.kind()
                    )))
                }
            };
            let removed = map
                .remove(key)
                .ok_or_else(|| TrackerError::MissingKey(key.to_string()))?;
            if let Some(position) = obj.outgoing.iter().rposition(|&edge| edge == removed) {
                obj.outgoing.remove(position);
            }
            decref_cascade(&mut state, &mut events, removed);
            removed
        };
        self.dispatch(events);
        Ok(removed)
    }

    /// Get a borrowed handle to the entry under `key`
    pub fn dict_get(&self, dict: &ObjectHandle, key: &str) -> TrackerResult<ObjectHandle> {
        let state = self.state();
        let obj = state
            .objects
            .get(&dict.id())
            .ok_or(TrackerError::InvalidHandle(dict.id()))?;
        match &obj.payload {
            Payload::Dict(map) => map
                .get(key)
                .map(|&id| ObjectHandle::new(id))
                .ok_or_else(|| TrackerError::MissingKey(key.to_string())),
            other => Err(TrackerError::TypeError(format!(
                "expected Dict payload, found {:?}",
                other.kind()
            ))),
        }
    }

    /// Number of entries in a mapping
    pub fn dict_len(&self, dict: &ObjectHandle) -> TrackerResult<usize> {
        let state = self.state();
        let obj = state
            .objects
            .get(&dict.id())
            .ok_or(TrackerError::InvalidHandle(dict.id()))?;
        match &obj.payload {
            Payload::Dict(map) => Ok(map.len()),
            other => Err(TrackerError::TypeError(format!(
                "expected Dict payload, found {:?}",
                other.kind()
            ))),
        }
    }
}

fn expect_kind(payload: &Payload, kind: PayloadKind) -> TrackerResult<()> {
    if payload.kind() == kind {
        Ok(())
    } else {
        Err(TrackerError::TypeError(format!(
            "expected {:?} payload, found {:?}",
            kind,
            payload.kind()
        )))
    }
}
