//! Identity types shared by every message that flows through the engine.
//!
//! Both identifiers wrap a [`uuid::Uuid`] rather than a sequential counter:
//! messages can originate from concurrent, independent flow executions with
//! no shared generator to coordinate through.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique identifier assigned to a message at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Mint a fresh, globally unique id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID value.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identifier of the flow execution a message belongs to.
///
/// Assigned by the caller for the initial message of a run and propagated by
/// convention — the engine never generates or inspects one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Mint a fresh run id. A convenience for callers who do not already
    /// have one to correlate against (e.g. a session id from upstream).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run:{}", self.0)
    }
}

impl From<Uuid> for RunId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
