//! Reference-counted object manager with a cycle-collecting garbage collector
//!
//! This crate tracks object lifetimes via reference counting and reclaims the
//! reference cycles that counting alone cannot free:
//!
//! - **ManagedObject**: identity, payload, refcount, outgoing reference set
//! - **ReferenceTracker**: the authoritative API for creating objects and
//!   mutating reference counts
//! - **Container operations**: sequence/mapping payloads whose element
//!   mutations route through the tracker (this is how cycles form)
//! - **Cycle collector**: trial-deletion pass over the live object registry
//! - **EventSink**: injected observer of creation, increment, decrement, and
//!   deallocation events
//!
//! # Example
//!
//! ```
//! use cyclerc_core::{CollectScope, Payload, ReferenceTracker};
//!
//! let tracker = ReferenceTracker::new();
//!
//! // Two lists referencing each other form a cycle.
//! let a = tracker.create(Payload::list())?;
//! let b = tracker.create(Payload::list())?;
//! tracker.bind_into(&a, &b)?;
//! tracker.bind_into(&b, &a)?;
//!
//! // Dropping the roots leaves both counts at 1: counting cannot free them.
//! tracker.remove_reference(a)?;
//! tracker.remove_reference(b)?;
//! assert_eq!(tracker.live_objects(), 2);
//!
//! // The collector reclaims the unreachable pair.
//! let report = tracker.run_collection(CollectScope::All)?;
//! assert_eq!(report.reclaimed.len(), 2);
//! assert_eq!(tracker.live_objects(), 0);
//! # Ok::<(), cyclerc_core::TrackerError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod collector;
pub mod container;
pub mod events;
pub mod handle;
pub mod object;
pub mod roots;
pub mod snapshot;
pub mod tracker;

pub use collector::{CollectScope, CollectStats, CollectionReport};
pub use events::{EventLog, EventSink, NullSink, RecordingSink, TrackerEvent};
pub use handle::ObjectHandle;
pub use object::{ManagedObject, Mark, ObjectId, Payload, PayloadKind};
pub use roots::RootSet;
pub use snapshot::{HeapSnapshot, ObjectRecord};
pub use tracker::{ReferenceTracker, TrackerOptions, TrackerStats};

/// Tracker operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// Operation referenced an object that is not currently live
    #[error("invalid handle: object {0} is not live")]
    InvalidHandle(ObjectId),

    /// Release requested on an object whose count already reached zero
    #[error("refcount underflow: object {0} was already released")]
    Underflow(ObjectId),

    /// Tracker mutation attempted from within an event callback
    #[error("reentrant mutation from event callback")]
    ReentrancyViolation,

    /// Object limit reached; carries the configured limit
    #[error("object capacity exhausted: limit is {0}")]
    ResourceExhaustion(usize),

    /// Payload kind does not support the requested operation
    #[error("type error: {0}")]
    TypeError(String),

    /// Sequence index out of range
    #[error("index {index} out of bounds for sequence of length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Sequence length at the time of the operation
        len: usize,
    },

    /// Mapping key not present
    #[error("missing key: {0:?}")]
    MissingKey(String),
}

/// Tracker operation result
pub type TrackerResult<T> = Result<T, TrackerError>;
