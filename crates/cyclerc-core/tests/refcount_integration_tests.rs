//! Integration tests for reference counting
//!
//! Tests cover:
//! - Count algebra across create/add/remove sequences
//! - Deallocation events firing exactly once
//! - Cascading release through containers
//! - Failure atomicity (underflow, invalid handles)
//! - Reentrancy rejection from event callbacks

use cyclerc_core::{
    CollectScope, EventSink, ObjectId, Payload, RecordingSink, ReferenceTracker, TrackerError,
    TrackerEvent,
};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_count_algebra() {
    let tracker = ReferenceTracker::new();
    let h = tracker.create(Payload::Int(0)).unwrap();

    // 1 + adds - removes, as long as the count never hits zero.
    let h2 = tracker.add_reference(&h).unwrap();
    let h3 = tracker.add_reference(&h).unwrap();
    let h4 = tracker.add_reference(&h).unwrap();
    tracker.remove_reference(h2).unwrap();
    tracker.remove_reference(h3).unwrap();

    assert_eq!(tracker.get_count(&h).unwrap(), 2);
    tracker.remove_reference(h4).unwrap();
    assert_eq!(tracker.get_count(&h).unwrap(), 1);
}

#[test]
fn test_container_holds_last_reference() {
    // create(X) -> 1, add_reference -> 2, bind into list -> 3,
    // remove h2 -> 2, remove root -> 1 (held by list),
    // remove the list's root -> cascade frees X.
    let tracker = ReferenceTracker::new();
    let sink = RecordingSink::new();
    let log = sink.log();
    tracker.set_sink(Box::new(sink)).unwrap();

    let x = tracker.create(Payload::Str("X".into())).unwrap();
    assert_eq!(tracker.get_count(&x).unwrap(), 1);

    let h2 = tracker.add_reference(&x).unwrap();
    assert_eq!(tracker.get_count(&x).unwrap(), 2);

    let list = tracker.create(Payload::list()).unwrap();
    tracker.list_push(&list, &x).unwrap();
    assert_eq!(tracker.get_count(&x).unwrap(), 3);

    tracker.remove_reference(h2).unwrap();
    assert_eq!(tracker.get_count(&x).unwrap(), 2);

    tracker.remove_reference(x).unwrap();
    assert_eq!(tracker.get_count(&x).unwrap(), 1);
    assert!(tracker.contains(&x));

    tracker.remove_reference(list).unwrap();
    assert!(!tracker.contains(&x));

    let deallocs: Vec<ObjectId> = log
        .borrow()
        .iter()
        .filter_map(|event| match event {
            TrackerEvent::Deallocated(id) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(deallocs, vec![list.id(), x.id()]);
}

#[test]
fn test_deallocation_fires_exactly_once() {
    let tracker = ReferenceTracker::new();
    let sink = RecordingSink::new();
    let log = sink.log();
    tracker.set_sink(Box::new(sink)).unwrap();

    let h = tracker.create(Payload::Unit).unwrap();
    let h2 = tracker.add_reference(&h).unwrap();
    tracker.remove_reference(h2).unwrap();
    tracker.remove_reference(h).unwrap();

    // Further operations on the dead id must not re-emit anything.
    assert!(tracker.add_reference(&h).is_err());
    assert!(tracker.remove_reference(h).is_err());
    tracker.run_collection(CollectScope::All).unwrap();

    let dealloc_count = log
        .borrow()
        .iter()
        .filter(|event| matches!(event, TrackerEvent::Deallocated(id) if *id == h.id()))
        .count();
    assert_eq!(dealloc_count, 1);
}

#[test]
fn test_container_cascade_emits_n_deallocations() {
    let tracker = ReferenceTracker::new();
    let sink = RecordingSink::new();
    let log = sink.log();
    tracker.set_sink(Box::new(sink)).unwrap();

    let list = tracker.create(Payload::list()).unwrap();
    let n = 5;
    for i in 0..n {
        let child = tracker.create(Payload::Int(i)).unwrap();
        tracker.list_push(&list, &child).unwrap();
        tracker.remove_reference(child).unwrap();
    }
    log.borrow_mut().clear();

    tracker.remove_reference(list).unwrap();

    let dealloc_count = log
        .borrow()
        .iter()
        .filter(|event| matches!(event, TrackerEvent::Deallocated(_)))
        .count();
    // The list itself plus exactly N children.
    assert_eq!(dealloc_count, 1 + n as usize);
    assert_eq!(tracker.live_objects(), 0);
}

#[test]
fn test_underflow_leaves_state_unchanged() {
    let tracker = ReferenceTracker::new();
    let kept = tracker.create(Payload::Int(7)).unwrap();
    let list = tracker.create(Payload::list()).unwrap();
    tracker.list_push(&list, &kept).unwrap();

    let doomed = tracker.create(Payload::Unit).unwrap();
    tracker.remove_reference(doomed).unwrap();

    let before = tracker.snapshot();
    assert_eq!(
        tracker.remove_reference(doomed),
        Err(TrackerError::Underflow(doomed.id()))
    );
    assert_eq!(tracker.snapshot(), before);
}

#[test]
fn test_never_allocated_id_is_invalid() {
    let tracker = ReferenceTracker::new();
    let foreign = ReferenceTracker::new();
    foreign.create(Payload::Unit).unwrap();
    let stray = foreign.create(Payload::Unit).unwrap();

    // Id 1 was never handed out by `tracker`.
    assert_eq!(
        tracker.remove_reference(stray),
        Err(TrackerError::InvalidHandle(stray.id()))
    );
}

struct ReentrantSink {
    tracker: Rc<ReferenceTracker>,
    errors: Rc<RefCell<Vec<TrackerError>>>,
}

impl EventSink for ReentrantSink {
    fn on_create(&mut self, _id: ObjectId) {
        let mut errors = self.errors.borrow_mut();
        if let Err(err) = self.tracker.create(Payload::Unit) {
            errors.push(err);
        }
        if let Err(err) = self.tracker.run_collection(CollectScope::All) {
            errors.push(err);
        }
    }
}

#[test]
fn test_reentrant_mutation_is_rejected() {
    let tracker = Rc::new(ReferenceTracker::new());
    let errors = Rc::new(RefCell::new(Vec::new()));
    tracker
        .set_sink(Box::new(ReentrantSink {
            tracker: Rc::clone(&tracker),
            errors: Rc::clone(&errors),
        }))
        .unwrap();

    let h = tracker.create(Payload::Unit).unwrap();

    assert_eq!(
        *errors.borrow(),
        vec![
            TrackerError::ReentrancyViolation,
            TrackerError::ReentrancyViolation
        ]
    );
    // The reentrant attempts must not have allocated anything.
    assert_eq!(tracker.live_objects(), 1);
    assert_eq!(tracker.get_count(&h).unwrap(), 1);
}
