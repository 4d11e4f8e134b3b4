//! Cycle collector
//!
//! Reference counting alone cannot free objects that keep each other's counts
//! positive while being unreachable from any root. This module implements the
//! trial-deletion pass that finds and reclaims such groups:
//!
//! 1. **Candidate gathering**: seed a scratch counter per candidate from its
//!    real refcount, then subtract one for every reference coming from
//!    another candidate. Real counts are never touched.
//! 2. **Reachability partition**: a candidate whose scratch stays positive is
//!    externally held (a root binding or a reference from outside the set);
//!    it and everything transitively reachable from it inside the set is
//!    restored to alive.
//! 3. **Reclamation**: the rest has no external holder; it is removed
//!    wholesale, one deallocation event per object. References the doomed
//!    group held into the surviving graph are then released through the
//!    normal decrement path, so survivors' counts stay exact.
//!
//! A pass runs to completion inside a single tracker call, so the candidate
//! set is frozen for its duration.

use crate::events::TrackerEvent;
use crate::handle::ObjectHandle;
use crate::object::{Mark, ObjectId};
use crate::tracker::{decref_cascade, TrackerState};
use crate::{TrackerError, TrackerResult};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Candidate set for a collection pass
#[derive(Debug, Clone)]
pub enum CollectScope {
    /// Examine every live object
    All,
    /// Examine only the given objects; references from outside the subset
    /// count as external holders
    Subset(Vec<ObjectHandle>),
}

/// Outcome of a collection pass
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    /// Ids reclaimed by this pass, in ascending order
    pub reclaimed: Vec<ObjectId>,

    /// Number of candidates examined
    pub examined: usize,

    /// Wall-clock duration of the pass
    pub duration: Duration,
}

/// Cycle-collection statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectStats {
    /// Total number of passes run
    pub passes: usize,

    /// Total objects reclaimed across all passes
    pub objects_reclaimed: usize,

    /// Objects reclaimed by the most recent pass
    pub last_reclaimed: usize,

    /// Total pause time across all passes
    pub total_pause_time: Duration,

    /// Duration of the most recent pass
    pub last_pause_time: Duration,
}

/// Run one trial-deletion pass over the frozen state
///
/// Queues one `Deallocated` event per reclaimed object, plus the decrement
/// (and possible cascade) events for survivors the doomed group referenced.
/// Fails with `InvalidHandle` (before any mutation) if a subset scope names
/// a dead object.
pub(crate) fn run_pass(
    state: &mut TrackerState,
    scope: &CollectScope,
    events: &mut Vec<TrackerEvent>,
) -> TrackerResult<CollectionReport> {
    let start = Instant::now();

    let candidates: FxHashSet<ObjectId> = match scope {
        CollectScope::All => state.objects.keys().copied().collect(),
        CollectScope::Subset(handles) => {
            let mut set = FxHashSet::default();
            for handle in handles {
                if !state.objects.contains_key(&handle.id()) {
                    return Err(TrackerError::InvalidHandle(handle.id()));
                }
                set.insert(handle.id());
            }
            set
        }
    };

    // Phase 1: trial deletion. Scratch counts start at the real refcount and
    // lose one per reference held by another candidate, leaving only the
    // external share.
    let mut scratch: FxHashMap<ObjectId, usize> = FxHashMap::default();
    for id in &candidates {
        if let Some(obj) = state.objects.get(id) {
            scratch.insert(*id, obj.refcount);
        }
    }
    for id in &candidates {
        let edges: Vec<ObjectId> = match state.objects.get(id) {
            Some(obj) => obj.outgoing.clone(),
            None => continue,
        };
        for edge in edges {
            if let Some(count) = scratch.get_mut(&edge) {
                debug_assert!(*count > 0, "internal references exceed refcount on {edge}");
                *count = count.saturating_sub(1);
            }
        }
    }

    // Phase 2: restore everything reachable from an externally held
    // candidate. Marks walk Unvisited -> InProgress (queued) -> Reachable.
    for id in &candidates {
        if let Some(obj) = state.objects.get_mut(id) {
            obj.mark = Mark::Unvisited;
        }
    }
    let mut worklist: Vec<ObjectId> = Vec::new();
    for (&id, &external) in &scratch {
        if external > 0 {
            if let Some(obj) = state.objects.get_mut(&id) {
                obj.mark = Mark::InProgress;
                worklist.push(id);
            }
        }
    }
    while let Some(id) = worklist.pop() {
        let edges: Vec<ObjectId> = match state.objects.get_mut(&id) {
            Some(obj) => {
                obj.mark = Mark::Reachable;
                obj.outgoing.clone()
            }
            None => continue,
        };
        for edge in edges {
            if !scratch.contains_key(&edge) {
                continue;
            }
            if let Some(obj) = state.objects.get_mut(&edge) {
                if obj.mark == Mark::Unvisited {
                    obj.mark = Mark::InProgress;
                    worklist.push(edge);
                }
            }
        }
    }

    // Phase 3: reclaim the unreachable partition wholesale. Edges among the
    // doomed die with it, but edges out of it hold real counts on survivors
    // (restored candidates, or objects outside a subset scope) and must be
    // released like any other dropped reference.
    let mut doomed: Vec<ObjectId> = candidates
        .iter()
        .copied()
        .filter(|id| {
            state
                .objects
                .get(id)
                .is_some_and(|obj| obj.mark == Mark::Unvisited)
        })
        .collect();
    doomed.sort_unstable();
    let doomed_set: FxHashSet<ObjectId> = doomed.iter().copied().collect();

    let mut outward: Vec<ObjectId> = Vec::new();
    for &id in &doomed {
        debug_assert_eq!(state.roots.count(id), 0, "reclaiming rooted object {id}");
        if let Some(obj) = state.objects.remove(&id) {
            state.roots.forget(id);
            state.stats.total_deallocated += 1;
            events.push(TrackerEvent::Deallocated(id));
            outward.extend(obj.outgoing.into_iter().filter(|e| !doomed_set.contains(e)));
        }
    }
    for edge in outward {
        decref_cascade(state, events, edge);
    }

    // Survivor marks are only meaningful during the pass.
    for id in &candidates {
        if let Some(obj) = state.objects.get_mut(id) {
            obj.mark = Mark::Unvisited;
        }
    }

    let duration = start.elapsed();
    state.collect_stats.passes += 1;
    state.collect_stats.objects_reclaimed += doomed.len();
    state.collect_stats.last_reclaimed = doomed.len();
    state.collect_stats.last_pause_time = duration;
    state.collect_stats.total_pause_time += duration;

    Ok(CollectionReport {
        reclaimed: doomed,
        examined: candidates.len(),
        duration,
    })
}
