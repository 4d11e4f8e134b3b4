//! Caller-facing object handles
//!
//! A handle names a tracked object; it does not keep it alive by itself. The
//! tracker counts one reference per root binding and per container slot, and
//! every operation validates liveness against the registry, so a stale handle
//! is reported as an error rather than dereferenced.

use crate::object::ObjectId;
use std::fmt;

/// A handle to a tracked object
///
/// Handles are cheap `Copy` values (id carriers, like a smart pointer without
/// the pointer). Equality and hashing follow the object's identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    id: ObjectId,
}

impl ObjectHandle {
    /// Create a handle for an id (tracker-internal)
    #[inline]
    pub(crate) fn new(id: ObjectId) -> Self {
        Self { id }
    }

    /// Get the identity this handle refers to
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle({})", self.id)
    }
}
