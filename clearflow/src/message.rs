//! The message envelope: identity, timing, and causality shared by every
//! value that flows through the engine.
//!
//! `Message` is a trait, not a base struct — Rust has no instantiable
//! abstract base class for callers to misuse, so the "abstract Event/Command
//! cannot be instantiated directly" invariant from the original design holds
//! vacuously here: only concrete leaf types (application-defined) implement
//! `Message`. The remaining invariant — an `Event`'s `triggered_by_id` must
//! be non-null — is enforced by `Envelope::for_event`'s signature rather than
//! by a post-construction check; see `SPEC_FULL.md` §3.

use std::any::Any;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::ids::{MessageId, RunId};

/// Shared fields carried by every message: identity, timing, and causality.
///
/// Deeply immutable once constructed — there is no setter. Embed one of
/// these as a field in every concrete message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    id: MessageId,
    run_id: RunId,
    triggered_by_id: Option<MessageId>,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Build the envelope for a Command: an intent, whose causal predecessor
    /// is optional (the initial command of a run has none).
    pub fn for_command(run_id: RunId, triggered_by_id: Option<MessageId>) -> Self {
        Self {
            id: MessageId::new(),
            run_id,
            triggered_by_id,
            timestamp: Utc::now(),
        }
    }

    /// Build the envelope for an Event: a fact, which always has a cause.
    /// `triggered_by_id` is mandatory here — there is no way to construct an
    /// event envelope without one, which is how this crate upholds the
    /// "Event triggered_by_id MUST be non-null" invariant without a runtime
    /// check.
    pub fn for_event(run_id: RunId, triggered_by_id: MessageId) -> Self {
        Self {
            id: MessageId::new(),
            run_id,
            triggered_by_id: Some(triggered_by_id),
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn triggered_by_id(&self) -> Option<MessageId> {
        self.triggered_by_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Implemented by every concrete value that can flow through a [`crate::Node`].
///
/// Routing dispatches on the *concrete* runtime type behind this trait
/// object, not on any notion of inheritance — see `SPEC_FULL.md` §4.1's
/// rationale. `as_any`/`into_any` are the mechanism: for a plain leaf message
/// they return `self`; for a hand-written output enum (a node with more than
/// one possible outcome type) they delegate to whichever variant is active,
/// so the concrete type recovered at the routing edge is the *inner*
/// variant's type, not the enum's.
pub trait Message: fmt::Debug + Send + Sync {
    /// The envelope fields (identity, timing, causality) of this message.
    fn envelope(&self) -> &Envelope;

    /// Type-erased reference to the concrete value backing this message,
    /// used by the router to obtain a `TypeId` for dispatch.
    fn as_any(&self) -> &dyn Any;

    /// Type-erased, owned conversion, used by the executor to downcast a
    /// routed message into the next node's declared input type.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Human-readable name of the concrete message type, for diagnostics
    /// (error messages naming the offending type).
    fn type_name(&self) -> &'static str;

    /// Clone the message behind a new box. The executor needs this to keep
    /// a copy of a node's input available for the `on_node_end`/`on_flow_end`
    /// callback hooks when that node fails — the input itself has already
    /// been moved into the failing `process` call by then. Concrete message
    /// types implement this as `Box::new(self.clone())` and so must derive
    /// or implement `Clone` themselves.
    fn clone_message(&self) -> Box<dyn Message>;
}

/// Marker trait for message types representing an intent. `triggered_by_id`
/// on a Command's envelope may be null — the initial command of a run is
/// legal. Implemented by concrete command structs that embed an [`Envelope`]
/// built via [`Envelope::for_command`].
pub trait Command: Message {}

/// Marker trait for message types representing a fact. Every concrete event
/// type's envelope is built via [`Envelope::for_event`], which makes a
/// null-`triggered_by_id` event a non-expressible state.
pub trait Event: Message {}

/// Errors raised while validating a message payload beyond the base
/// envelope contract (the envelope's own invariants are enforced by
/// construction and cannot fail at runtime — see the module doc comment).
///
/// Kept for API completeness against the documented error taxonomy, and for
/// application-defined messages that want to validate their own payload
/// fields through the same error type.
#[derive(Debug, thiserror::Error)]
pub enum MessageConstructError {
    #[error("invalid message payload: {reason}")]
    InvalidPayload { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_envelope_allows_null_cause() {
        let env = Envelope::for_command(RunId::new(), None);
        assert!(env.triggered_by_id().is_none());
    }

    #[test]
    fn event_envelope_always_has_a_cause() {
        let cause = MessageId::new();
        let env = Envelope::for_event(RunId::new(), cause);
        assert_eq!(env.triggered_by_id(), Some(cause));
    }

    #[test]
    fn envelopes_from_distinct_constructions_have_distinct_ids() {
        let run = RunId::new();
        let a = Envelope::for_command(run, None);
        let b = Envelope::for_command(run, None);
        assert_ne!(a.id(), b.id());
    }
}
