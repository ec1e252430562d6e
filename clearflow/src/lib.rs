//! clearflow - a type-safe, message-driven workflow engine
//!
//! A flow is a directed graph of async processing [`Node`]s connected by
//! typed routes. A single [`Message`] enters at the flow's starting node and
//! is handed from node to node until it reaches a route bound to
//! [`FlowBuilder::end`], at which point the flow returns.
//!
//! # Architecture
//!
//! ```text
//!  Command ──▶ [Node A] ──▶ Event ──▶ [Node B] ──▶ Event ──▶ (terminal)
//!                 │                       │
//!                 └── on_node_start/end ──┘   CallbackHandler (sequential,
//!                         on_flow_start/end    absorbs its own errors)
//! ```
//!
//! - [`Message`]/[`Command`]/[`Event`]: the envelope contract every value
//!   flowing through a flow implements.
//! - [`Node`]: a single async transformation from one message type to
//!   another.
//! - [`create_flow`]/[`FlowBuilder`]: assemble nodes into a route table.
//! - [`Flow`]: the built, runnable graph; implements [`Node`] itself, so
//!   flows nest as nodes in other flows.
//! - [`CallbackHandler`]/[`CompositeHandler`]: sequential, error-absorbing
//!   lifecycle hooks, for logging and metrics.
//! - [`Observer`]/[`ObservableFlow`]: concurrent, fail-fast per-message-type
//!   watchers, for invariants that must not be allowed to silently fail.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clearflow::{create_flow, Node};
//!
//! let start = Arc::new(MyStartNode::new("start")?);
//! let sink = Arc::new(MySinkNode::new("sink")?);
//!
//! let flow = create_flow("example", start.clone())
//!     .route::<MyEvent, _, _>(&start, &sink)?
//!     .end::<MyOtherEvent, _>(&sink)?;
//!
//! let result = flow.run(my_command).await?;
//! ```
//!
//! # Non-goals
//!
//! This crate does not provide a CLI, a persistence layer, or a distributed
//! transport — it is a library for composing and running in-process message
//! flows. See `SPEC_FULL.md` for the full design rationale.

#![forbid(unsafe_code)]

mod builder;
mod callbacks;
mod error;
mod flow;
mod ids;
mod message;
mod node;
mod observer;
mod route;

pub use builder::{create_flow, FlowBuildError, FlowBuilder};
pub use callbacks::{CallbackHandler, CompositeHandler, HookError};
pub use error::{ClearFlowError, Result};
pub use flow::{Flow, FlowExecError};
pub use ids::{MessageId, RunId};
pub use message::{Command, Envelope, Event, Message, MessageConstructError};
pub use node::{ErasedNode, Node, NodeBase, NodeConstructError};
pub use observer::{Observer, ObservableFlow, ObserverError};
pub use route::{Accepts, Emits, RouteDestination, RouteKey};
