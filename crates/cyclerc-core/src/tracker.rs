//! Reference tracker
//!
//! [`ReferenceTracker`] is the authoritative API for the object registry: it
//! is the only component that allocates or deallocates a tracked object or
//! mutates a reference count. All operations run to completion before the
//! next is accepted (single-threaded cooperative model); state lives behind a
//! `RefCell` and event callbacks are dispatched only after the state borrow
//! is released, with a guard flag rejecting reentrant mutation.

use crate::collector::{self, CollectScope, CollectStats, CollectionReport};
use crate::events::{self, EventSink, NullSink, TrackerEvent};
use crate::handle::ObjectHandle;
use crate::object::{ManagedObject, ObjectId, Payload};
use crate::roots::RootSet;
use crate::{TrackerError, TrackerResult};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Maximum number of live objects (0 = unlimited). `create` fails with
    /// `ResourceExhaustion` once the limit is reached.
    pub max_objects: usize,

    /// Automatic collection threshold: run a full cycle-collection pass once
    /// this many objects have been created since the last pass (0 = collect
    /// only on demand).
    pub collect_threshold: usize,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            max_objects: 0,
            collect_threshold: 1024,
        }
    }
}

/// Tracker statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    /// Objects currently live
    pub live_objects: usize,

    /// Objects created over the tracker's lifetime
    pub total_created: usize,

    /// Objects deallocated over the tracker's lifetime
    pub total_deallocated: usize,

    /// Highest number of simultaneously live objects seen
    pub peak_live: usize,
}

/// Mutable tracker state, frozen as a unit during a collection pass
pub(crate) struct TrackerState {
    /// Live object registry
    pub(crate) objects: FxHashMap<ObjectId, ManagedObject>,

    /// Caller root bindings
    pub(crate) roots: RootSet,

    /// Next id to assign; ids below this watermark were allocated at some point
    pub(crate) next_id: u64,

    /// Creations since the last collection pass
    pub(crate) created_since_collect: usize,

    /// Lifetime counters
    pub(crate) stats: TrackerStats,

    /// Collection pass counters
    pub(crate) collect_stats: CollectStats,
}

impl TrackerState {
    fn new() -> Self {
        Self {
            objects: FxHashMap::default(),
            roots: RootSet::new(),
            next_id: 0,
            created_since_collect: 0,
            stats: TrackerStats::default(),
            collect_stats: CollectStats::default(),
        }
    }
}

/// Reference-counted object manager
///
/// Objects are created with refcount 1 (the creating root binding), mutated
/// only through this API, and destroyed either synchronously when their count
/// reaches zero or by a [`run_collection`](ReferenceTracker::run_collection)
/// pass when they are part of an unreachable cycle.
pub struct ReferenceTracker {
    state: RefCell<TrackerState>,
    sink: RefCell<Box<dyn EventSink>>,
    dispatching: Cell<bool>,
    options: TrackerOptions,
}

impl ReferenceTracker {
    /// Create a tracker with default options and no event sink
    pub fn new() -> Self {
        Self::with_options(TrackerOptions::default())
    }

    /// Create a tracker with explicit options
    pub fn with_options(options: TrackerOptions) -> Self {
        Self {
            state: RefCell::new(TrackerState::new()),
            sink: RefCell::new(Box::new(NullSink)),
            dispatching: Cell::new(false),
            options,
        }
    }

    /// Get the tracker's options
    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    /// Install an event sink, replacing the previous one
    ///
    /// Fails with `ReentrancyViolation` when called from a sink callback.
    pub fn set_sink(&self, sink: Box<dyn EventSink>) -> TrackerResult<()> {
        self.mutation_guard()?;
        *self.sink.borrow_mut() = sink;
        Ok(())
    }

    /// Create a new tracked object with refcount 1
    ///
    /// The creating reference is registered as a root binding and `on_create`
    /// is emitted. Container payloads must start empty. May trigger an
    /// automatic full collection pass per
    /// [`TrackerOptions::collect_threshold`].
    pub fn create(&self, payload: Payload) -> TrackerResult<ObjectHandle> {
        self.mutation_guard()?;
        if let Payload::Dict(map) = &payload {
            if !map.is_empty() {
                return Err(TrackerError::TypeError(
                    "mapping payload must start empty".into(),
                ));
            }
        }

        let mut events = Vec::new();
        let (handle, auto_collect) = {
            let mut state = self.state.borrow_mut();
            if self.options.max_objects > 0 && state.objects.len() >= self.options.max_objects {
                return Err(TrackerError::ResourceExhaustion(self.options.max_objects));
            }

            let id = ObjectId::new(state.next_id);
            state.next_id += 1;
            state.objects.insert(id, ManagedObject::new(id, payload));
            state.roots.add(id);
            state.stats.total_created += 1;
            state.stats.peak_live = state.stats.peak_live.max(state.objects.len());
            state.created_since_collect += 1;
            events.push(TrackerEvent::Created(id));

            let auto = self.options.collect_threshold > 0
                && state.created_since_collect >= self.options.collect_threshold;
            (ObjectHandle::new(id), auto)
        };
        self.dispatch(events);

        if auto_collect {
            self.run_collection(CollectScope::All)?;
        }
        Ok(handle)
    }

    /// Add a reference to a live object, returning an equivalent handle
    ///
    /// The new reference is a root binding; `on_increment` is emitted with
    /// the resulting count. Fails with `InvalidHandle` if the object is not
    /// live.
    pub fn add_reference(&self, handle: &ObjectHandle) -> TrackerResult<ObjectHandle> {
        self.mutation_guard()?;
        let id = handle.id();

        let mut events = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            let obj = state
                .objects
                .get_mut(&id)
                .ok_or(TrackerError::InvalidHandle(id))?;
            obj.refcount += 1;
            let new_count = obj.refcount;
            state.roots.add(id);
            events.push(TrackerEvent::Incremented(id, new_count));
        }
        self.dispatch(events);
        Ok(ObjectHandle::new(id))
    }

    /// Release a reference to an object
    ///
    /// Emits `on_decrement` with the resulting count. When the count reaches
    /// zero the object is deallocated synchronously: `on_deallocate` fires
    /// and every outgoing reference is released in turn (cascade). Fails with
    /// `Underflow` on a double release (the id was already deallocated) and
    /// `InvalidHandle` for an id that was never allocated; either failure
    /// leaves state untouched.
    pub fn remove_reference(&self, handle: ObjectHandle) -> TrackerResult<()> {
        self.mutation_guard()?;
        let id = handle.id();

        let mut events = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            if !state.objects.contains_key(&id) {
                return Err(if id.as_u64() < state.next_id {
                    TrackerError::Underflow(id)
                } else {
                    TrackerError::InvalidHandle(id)
                });
            }
            state.roots.remove(id);
            decref_cascade(&mut state, &mut events, id);
        }
        self.dispatch(events);
        Ok(())
    }

    /// Read an object's current reference count
    pub fn get_count(&self, handle: &ObjectHandle) -> TrackerResult<usize> {
        let state = self.state.borrow();
        state
            .objects
            .get(&handle.id())
            .map(|obj| obj.refcount)
            .ok_or(TrackerError::InvalidHandle(handle.id()))
    }

    /// Check whether an object is currently live
    pub fn contains(&self, handle: &ObjectHandle) -> bool {
        self.state.borrow().objects.contains_key(&handle.id())
    }

    /// Number of currently live objects
    pub fn live_objects(&self) -> usize {
        self.state.borrow().objects.len()
    }

    /// Add a strong reference from a container (or any object) to a child
    ///
    /// Appends an outgoing edge on the container and issues the matching
    /// internal increment on the child; this is how cycles are formed.
    /// Self-edges are allowed. Fails with `InvalidHandle` if either end is
    /// not live, before any mutation.
    pub fn bind_into(
        &self,
        container: &ObjectHandle,
        child: &ObjectHandle,
    ) -> TrackerResult<()> {
        self.mutation_guard()?;
        let container_id = container.id();
        let child_id = child.id();

        let mut events = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            if !state.objects.contains_key(&container_id) {
                return Err(TrackerError::InvalidHandle(container_id));
            }
            if !state.objects.contains_key(&child_id) {
                return Err(TrackerError::InvalidHandle(child_id));
            }
            if let Some(obj) = state.objects.get_mut(&container_id) {
                obj.outgoing.push(child_id);
            }
            incref(&mut state, &mut events, child_id);
        }
        self.dispatch(events);
        Ok(())
    }

    /// Remove a strong reference from a container to a child
    ///
    /// Drops the most recently added matching outgoing edge and issues the
    /// matching internal decrement (which may cascade). On a mapping
    /// container an un-keyed edge is preferred; otherwise the corresponding
    /// key entry is dropped as well. Fails with `InvalidHandle` if either end
    /// is not live and `TypeError` if no such edge exists, before any
    /// mutation.
    pub fn unbind_from(
        &self,
        container: &ObjectHandle,
        child: &ObjectHandle,
    ) -> TrackerResult<()> {
        self.mutation_guard()?;
        let container_id = container.id();
        let child_id = child.id();

        let mut events = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            if !state.objects.contains_key(&child_id) {
                return Err(TrackerError::InvalidHandle(child_id));
            }
            let obj = state
                .objects
                .get_mut(&container_id)
                .ok_or(TrackerError::InvalidHandle(container_id))?;
            let position = obj
                .outgoing
                .iter()
                .rposition(|&edge| edge == child_id)
                .ok_or_else(|| {
                    TrackerError::TypeError(format!(
                        "no reference from {container_id} to {child_id}"
                    ))
                })?;
            obj.outgoing.remove(position);

            // A mapping keeps one edge per keyed slot. If removing this edge
            // leaves fewer edges than keyed slots, drop the first key that
            // maps to the child so payload and edges stay in step.
            if let Payload::Dict(map) = &mut obj.payload {
                let edges = obj
                    .outgoing
                    .iter()
                    .filter(|&&edge| edge == child_id)
                    .count();
                let keyed = map.values().filter(|&&value| value == child_id).count();
                if keyed > edges {
                    if let Some(key) = map
                        .iter()
                        .find(|(_, &value)| value == child_id)
                        .map(|(key, _)| key.clone())
                    {
                        map.remove(&key);
                    }
                }
            }

            decref_cascade(&mut state, &mut events, child_id);
        }
        self.dispatch(events);
        Ok(())
    }

    /// Run a cycle-collection pass
    ///
    /// See [`CollectScope`] for the candidate set. The pass runs to
    /// completion inside this call; no mutation can interleave. A pass that
    /// reclaims nothing is a normal no-op. Fails with `InvalidHandle` if a
    /// subset scope names a dead object, before any mutation.
    pub fn run_collection(&self, scope: CollectScope) -> TrackerResult<CollectionReport> {
        self.mutation_guard()?;

        let mut events = Vec::new();
        let report = {
            let mut state = self.state.borrow_mut();
            let report = collector::run_pass(&mut state, &scope, &mut events)?;
            state.created_since_collect = 0;
            report
        };
        self.dispatch(events);
        Ok(report)
    }

    /// Get lifetime statistics
    pub fn stats(&self) -> TrackerStats {
        let state = self.state.borrow();
        let mut stats = state.stats.clone();
        stats.live_objects = state.objects.len();
        stats
    }

    /// Get cycle-collection statistics
    pub fn collect_stats(&self) -> CollectStats {
        self.state.borrow().collect_stats.clone()
    }

    /// Number of root bindings currently held for an object
    pub fn root_bindings(&self, handle: &ObjectHandle) -> usize {
        self.state.borrow().roots.count(handle.id())
    }

    /// Reject mutation while event callbacks are running
    pub(crate) fn mutation_guard(&self) -> TrackerResult<()> {
        if self.dispatching.get() {
            Err(TrackerError::ReentrancyViolation)
        } else {
            Ok(())
        }
    }

    /// Deliver queued events with the reentrancy guard set
    pub(crate) fn dispatch(&self, queued: Vec<TrackerEvent>) {
        if queued.is_empty() {
            return;
        }
        self.dispatching.set(true);
        events::deliver(self.sink.borrow_mut().as_mut(), &queued);
        self.dispatching.set(false);
    }

    /// Borrow the state for read-only module-internal access
    pub(crate) fn state(&self) -> std::cell::Ref<'_, TrackerState> {
        self.state.borrow()
    }

    /// Borrow the state mutably for module-internal access
    pub(crate) fn state_mut(&self) -> std::cell::RefMut<'_, TrackerState> {
        self.state.borrow_mut()
    }
}

impl Default for ReferenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Increment a live object's count and queue the event
pub(crate) fn incref(
    state: &mut TrackerState,
    events: &mut Vec<TrackerEvent>,
    id: ObjectId,
) {
    if let Some(obj) = state.objects.get_mut(&id) {
        obj.refcount += 1;
        events.push(TrackerEvent::Incremented(id, obj.refcount));
    } else {
        debug_assert!(false, "incref on dead object {id}");
    }
}

/// Decrement a live object's count, deallocating and cascading on zero
///
/// Runs iteratively over a worklist: each deallocated object's outgoing
/// references are queued for their own decrement, so a container holding the
/// last reference to its children releases them all.
pub(crate) fn decref_cascade(
    state: &mut TrackerState,
    events: &mut Vec<TrackerEvent>,
    start: ObjectId,
) {
    let mut pending = VecDeque::new();
    pending.push_back(start);

    while let Some(id) = pending.pop_front() {
        let new_count = match state.objects.get_mut(&id) {
            Some(obj) => {
                debug_assert!(obj.refcount > 0, "decrement below zero on {id}");
                obj.refcount -= 1;
                obj.refcount
            }
            None => {
                debug_assert!(false, "decref on dead object {id}");
                continue;
            }
        };
        events.push(TrackerEvent::Decremented(id, new_count));

        if new_count == 0 {
            events.push(TrackerEvent::Deallocated(id));
            if let Some(obj) = state.objects.remove(&id) {
                state.roots.forget(id);
                state.stats.total_deallocated += 1;
                pending.extend(obj.outgoing);
            }
        }
    }
}
