//! Type erasure at the routing edge.
//!
//! Public builder methods (`route`/`end` in `builder.rs`) are typed in terms
//! of the concrete `Input`/`Output` associated types of the nodes they
//! connect, checked by the compiler via [`Emits`]/[`Accepts`] below. The
//! *stored* route table, however, is keyed on a runtime type token — a
//! node's declared output union (if it has more than one possible concrete
//! outcome type) cannot be expressed as a single Rust generic parameter
//! threaded through an ordered builder chain, and a node's declared input
//! union (fan-in from more than one source type) has the same problem in
//! reverse. See `SPEC_FULL.md` §4 Supplement for the full rationale.
//!
//! Fan-out (one node, several possible outcome types) is handled by
//! `Emits` alone, since the route table only ever needs to recognize the
//! concrete outcome type, not convert it. Fan-in (one node, several possible
//! source types) additionally needs a conversion step — the destination
//! node's `process` expects its own `Input` type, not the arbitrary leaf
//! type that triggered the edge — which is why `Accepts` carries
//! `from_concrete` and `builder.rs`'s `route` wraps the destination in a
//! per-edge adapter that applies it before the node ever sees the message.

use std::any::TypeId;
use std::sync::Arc;

use crate::node::ErasedNode;

/// Key identifying one routing edge: the source node's name (its identity
/// for routing purposes) paired with the runtime type of the concrete
/// message that triggers this edge.
pub type RouteKey = (Arc<str>, TypeId);

/// Sentinel meaning "execution ends here," or a concrete next node.
pub enum RouteDestination {
    Terminal,
    Node(Arc<dyn ErasedNode>),
}

impl Clone for RouteDestination {
    fn clone(&self) -> Self {
        match self {
            RouteDestination::Terminal => RouteDestination::Terminal,
            RouteDestination::Node(n) => RouteDestination::Node(Arc::clone(n)),
        }
    }
}

/// Declares that a node's `Output` type can resolve, at runtime, to the
/// concrete message type `M`. Every leaf message type implements this
/// reflexively (`Emits<Self>`); a hand-written output enum implements it
/// once per variant, naming each concrete type it can produce.
///
/// ```rust,ignore
/// enum GateOutcome { Yes(Yes), No(No) }
/// impl Emits<Yes> for GateOutcome {}
/// impl Emits<No> for GateOutcome {}
/// ```
pub trait Emits<M: 'static>: 'static {}

impl<M: 'static> Emits<M> for M {}

/// Declares that a node's `Input` type can be produced from the concrete
/// message type `M`, and knows how to do so. Mirrors [`Emits`] for the
/// consuming side of an edge; most nodes only ever accept a single concrete
/// type and get this reflexively. A node whose `Input` is a hand-written
/// fan-in union implements this once per leaf type it accepts, each
/// supplying the conversion:
///
/// ```rust,ignore
/// enum GateInput { FromA(A), FromB(B) }
/// impl Accepts<A> for GateInput {
///     fn from_concrete(message: A) -> Self { GateInput::FromA(message) }
/// }
/// impl Accepts<B> for GateInput {
///     fn from_concrete(message: B) -> Self { GateInput::FromB(message) }
/// }
/// ```
///
/// `FlowBuilder::route` binds the conversion at the edge, not inside the
/// destination node itself — see `builder.rs`'s `RouteAdapter`. This is what
/// makes fan-in work despite type erasure: the adapter created for a given
/// edge knows the edge's concrete `TOutcome` at the call site, so it can
/// downcast to that exact leaf type and call `from_concrete` before handing
/// the result to the node, rather than relying on the node's declared
/// `Input` type to match the wire type directly.
pub trait Accepts<M: 'static>: 'static {
    fn from_concrete(message: M) -> Self;
}

impl<M: 'static> Accepts<M> for M {
    fn from_concrete(message: M) -> M {
        message
    }
}
