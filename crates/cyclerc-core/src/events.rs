//! Lifecycle event observation
//!
//! The tracker reports every creation, increment, decrement, and deallocation
//! through an injected [`EventSink`]. Callbacks run synchronously, in the
//! order the mutations were applied, after the triggering operation has fully
//! committed. A callback must not mutate tracker state; reentrant mutation is
//! rejected with [`TrackerError::ReentrancyViolation`](crate::TrackerError).

use crate::object::ObjectId;
use std::cell::RefCell;
use std::rc::Rc;

/// A lifecycle event emitted by the tracker
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// An object was created with refcount 1
    Created(ObjectId),
    /// A reference was added; carries the resulting count
    Incremented(ObjectId, usize),
    /// A reference was removed; carries the resulting count
    Decremented(ObjectId, usize),
    /// The object was deallocated
    Deallocated(ObjectId),
}

/// Observer of tracker lifecycle events
///
/// All methods default to no-ops so sinks can implement only what they need.
pub trait EventSink {
    /// An object was created (initial count 1)
    fn on_create(&mut self, _id: ObjectId) {}

    /// A reference was added
    fn on_increment(&mut self, _id: ObjectId, _new_count: usize) {}

    /// A reference was removed
    fn on_decrement(&mut self, _id: ObjectId, _new_count: usize) {}

    /// The object was deallocated; fires exactly once per identity
    fn on_deallocate(&mut self, _id: ObjectId) {}
}

/// Sink that ignores every event (the default)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Shared event log filled by a [`RecordingSink`]
pub type EventLog = Rc<RefCell<Vec<TrackerEvent>>>;

/// Sink that appends every event to a shared log
///
/// The log handle stays usable after the sink is handed to the tracker, which
/// is how the console layer (and the tests) observe emissions.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    log: EventLog,
}

impl RecordingSink {
    /// Create a sink with an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to the shared log
    pub fn log(&self) -> EventLog {
        Rc::clone(&self.log)
    }
}

impl EventSink for RecordingSink {
    fn on_create(&mut self, id: ObjectId) {
        self.log.borrow_mut().push(TrackerEvent::Created(id));
    }

    fn on_increment(&mut self, id: ObjectId, new_count: usize) {
        self.log.borrow_mut().push(TrackerEvent::Incremented(id, new_count));
    }

    fn on_decrement(&mut self, id: ObjectId, new_count: usize) {
        self.log.borrow_mut().push(TrackerEvent::Decremented(id, new_count));
    }

    fn on_deallocate(&mut self, id: ObjectId) {
        self.log.borrow_mut().push(TrackerEvent::Deallocated(id));
    }
}

/// Deliver queued events to a sink, in order
pub(crate) fn deliver(sink: &mut dyn EventSink, events: &[TrackerEvent]) {
    for event in events {
        match *event {
            TrackerEvent::Created(id) => sink.on_create(id),
            TrackerEvent::Incremented(id, count) => sink.on_increment(id, count),
            TrackerEvent::Decremented(id, count) => sink.on_decrement(id, count),
            TrackerEvent::Deallocated(id) => sink.on_deallocate(id),
        }
    }
}
