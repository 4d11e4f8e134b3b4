//! Tracked object model
//!
//! Every tracked allocation is a [`ManagedObject`]: a stable identity, a
//! tagged payload, a reference count, and an ordered list of outgoing strong
//! references. The outgoing list is the authoritative edge set of the object
//! graph; one entry corresponds to exactly one strong reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identity of a tracked object
///
/// Ids are assigned monotonically by the tracker and are never reused, so a
/// deallocated object's id stays distinguishable from a never-allocated one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create an object ID from its raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the object ID as a u64
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a payload, without its data
///
/// Used by heap snapshots so diagnostics can report object shapes without
/// serializing payload contents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    /// No payload data
    Unit,
    /// Boolean scalar
    Bool,
    /// Integer scalar
    Int,
    /// Floating-point scalar
    Float,
    /// String scalar
    Str,
    /// Sequence container
    List,
    /// Mapping container
    Dict,
}

/// Tagged payload carried by a tracked object
///
/// Scalars own their data directly. Containers hold references to other
/// tracked objects:
///
/// - `List` stores no data of its own; a list's elements are exactly the
///   object's outgoing edges, in order.
/// - `Dict` maps keys to object ids; every value also has a matching outgoing
///   edge. `BTreeMap` keeps key order deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload data
    Unit,
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar
    Int(i64),
    /// Floating-point scalar
    Float(f64),
    /// String scalar
    Str(String),
    /// Sequence container; elements live in the object's outgoing edges
    List,
    /// Mapping container from string keys to object ids
    Dict(BTreeMap<String, ObjectId>),
}

impl Payload {
    /// Create an empty sequence payload
    pub fn list() -> Self {
        Payload::List
    }

    /// Create an empty mapping payload
    pub fn dict() -> Self {
        Payload::Dict(BTreeMap::new())
    }

    /// Get the payload's kind
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Unit => PayloadKind::Unit,
            Payload::Bool(_) => PayloadKind::Bool,
            Payload::Int(_) => PayloadKind::Int,
            Payload::Float(_) => PayloadKind::Float,
            Payload::Str(_) => PayloadKind::Str,
            Payload::List => PayloadKind::List,
            Payload::Dict(_) => PayloadKind::Dict,
        }
    }

    /// Check whether this payload is a container
    pub fn is_container(&self) -> bool {
        matches!(self, Payload::List | Payload::Dict(_))
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Int(value)
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Payload::Float(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Str(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Str(value)
    }
}

/// Collection mark, meaningful only while a collector pass runs
///
/// Outside a pass every live object is `Unvisited`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Mark {
    /// Not yet seen by the current pass
    #[default]
    Unvisited,
    /// Queued for the reachability scan but not yet expanded
    InProgress,
    /// Proven reachable from an external holder
    Reachable,
}

/// A tracked unit of memory
///
/// Invariant: `refcount` equals the number of live holders pointing at this
/// object — root bindings held by the caller plus occurrences of its id in
/// other live objects' outgoing lists.
#[derive(Debug, Clone)]
pub struct ManagedObject {
    /// Stable identity
    pub(crate) id: ObjectId,

    /// Payload value or container structure
    pub(crate) payload: Payload,

    /// Number of strong references currently held
    pub(crate) refcount: usize,

    /// Outgoing strong references, ordered; duplicates allowed
    pub(crate) outgoing: Vec<ObjectId>,

    /// Collection mark (tracker-internal)
    pub(crate) mark: Mark,
}

impl ManagedObject {
    /// Create a new object with a single reference (the creating binding)
    pub(crate) fn new(id: ObjectId, payload: Payload) -> Self {
        Self {
            id,
            payload,
            refcount: 1,
            outgoing: Vec::new(),
            mark: Mark::Unvisited,
        }
    }

    /// Get the object's identity
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the payload
    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Get the current reference count
    #[inline]
    pub fn refcount(&self) -> usize {
        self.refcount
    }

    /// Get the outgoing strong references, in order
    #[inline]
    pub fn outgoing(&self) -> &[ObjectId] {
        &self.outgoing
    }
}
