//! The node contract: a uniform, asynchronous message transformer.
//!
//! The engine treats nodes as opaque — it calls `process` and nothing else.
//! [`Node`] is a typed trait with associated `Input`/`Output` types, used at
//! the public builder API; [`ErasedNode`] is its type-erased counterpart,
//! used only inside the route table (see `route.rs`).

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Message;

/// A polymorphic transformer from one message type to another.
///
/// Implementors MUST complete in finite time or return an error, MUST NOT
/// retain references to messages across calls, and MUST NOT mutate the
/// input message — the last is enforced structurally by [`Envelope`](crate::message::Envelope)'s
/// immutability and by `process` taking `Self::Input` by value.
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// The concrete message type this node accepts.
    type Input: Message + 'static;
    /// The concrete message type this node produces. When a node can emit
    /// more than one kind of outcome, this is a hand-written enum whose
    /// [`Message`] impl delegates to the active variant — see `route.rs`.
    type Output: Message + 'static;

    /// Identity for routing; non-empty, whitespace-trimmed.
    fn name(&self) -> &str;

    /// Transform one message into another. May suspend freely; suspension
    /// points are exactly the awaits inside this method.
    async fn process(&self, message: Self::Input) -> anyhow::Result<Self::Output>;
}

/// Name-validation helper embedded by concrete node structs, in the spirit
/// of `ids.rs`'s validated-newtype constructors. Nodes are not required to
/// use `NodeBase` — any struct with a stable, validated `name()` satisfies
/// [`Node`] — but it is the straightforward way to get the construction-time
/// `InvalidNode` check spec.md §4.2 requires.
#[derive(Debug, Clone)]
pub struct NodeBase {
    name: Arc<str>,
}

impl NodeBase {
    /// Validate and store a node name. Fails if `name` is empty or
    /// whitespace-only.
    pub fn new(name: impl Into<String>) -> Result<Self, NodeConstructError> {
        let raw = name.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NodeConstructError::EmptyName);
        }
        Ok(Self {
            name: Arc::from(trimmed),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Error raised by node construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NodeConstructError {
    #[error("node name must not be empty or whitespace-only")]
    EmptyName,
}

/// Type-erased form of [`Node`], used internally by the route table so that
/// nodes with differing `Input`/`Output` types can share one collection.
/// Never appears in a public builder/flow signature.
#[async_trait]
pub trait ErasedNode: Send + Sync {
    fn name(&self) -> &str;

    /// Downcast `message` to this node's declared input type, run `process`,
    /// and re-erase the output. Returns an error if the downcast fails (an
    /// engine bug, since the builder only ever wires type-matched edges) or
    /// if the node itself fails.
    async fn process_erased(&self, message: Box<dyn Message>) -> anyhow::Result<Box<dyn Message>>;
}

#[async_trait]
impl<N> ErasedNode for N
where
    N: Node,
{
    fn name(&self) -> &str {
        Node::name(self)
    }

    async fn process_erased(&self, message: Box<dyn Message>) -> anyhow::Result<Box<dyn Message>> {
        let type_name = message.type_name();
        let input = message.into_any().downcast::<N::Input>().unwrap_or_else(|_| {
            unreachable!(
                "route table delivered a '{type_name}' message to a node expecting a different type; \
                 this is a builder bug, not a caller error"
            )
        });
        let output = self.process(*input).await?;
        Ok(Box::new(output))
    }
}
