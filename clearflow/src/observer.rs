//! Observers: a concurrent, fail-fast side channel for messages flowing
//! through a [`crate::Flow`].
//!
//! This is the deliberate inverse of [`crate::callbacks::CallbackHandler`]:
//! callbacks are invoked sequentially and absorb their own errors; observers
//! are invoked concurrently and the first error aborts the whole dispatch.
//! See `SPEC_FULL.md` §9 ("Callback vs observer duality").

use std::any::TypeId;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::flow::{Flow, FlowExecError};
use crate::message::Message;
use crate::node::ErasedNode;
use crate::route::RouteDestination;

/// Notified once per message of concrete type `M` that passes through an
/// [`ObservableFlow`]. Unlike [`crate::callbacks::CallbackHandler`], an
/// observer is typed to a single concrete message type rather than the
/// type-erased flow/node boundary — it only ever sees messages it declared
/// interest in.
#[async_trait]
pub trait Observer<M: Message + 'static>: Send + Sync {
    async fn on_message(&self, message: &M) -> anyhow::Result<()>;
}

/// Internal, type-erased form of [`Observer`] so a heterogeneous set of
/// observers (one per message type) can share a collection.
#[async_trait]
trait ErasedObserver: Send + Sync {
    fn message_type(&self) -> TypeId;
    async fn notify(&self, message: &dyn Message) -> anyhow::Result<()>;
}

struct TypedObserver<M: Message + 'static> {
    inner: Arc<dyn Observer<M>>,
}

#[async_trait]
impl<M: Message + 'static> ErasedObserver for TypedObserver<M> {
    fn message_type(&self) -> TypeId {
        TypeId::of::<M>()
    }

    async fn notify(&self, message: &dyn Message) -> anyhow::Result<()> {
        // The caller only routes a message to observers whose `message_type`
        // matches its `TypeId`, so this downcast cannot fail.
        let concrete = message
            .as_any()
            .downcast_ref::<M>()
            .expect("dispatch table guarantees a matching concrete type");
        self.inner.on_message(concrete).await
    }
}

/// Errors raised by observer dispatch. Distinct from
/// [`crate::flow::FlowExecError`] — an `ObserverError` means a *watcher*
/// failed, not the flow's own processing.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("observer failed while watching message type '{message_type}': {source}")]
    NotificationFailed {
        message_type: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Wraps a [`crate::Flow`] with a set of observers notified, concurrently
/// and exactly once, after *every* hop the flow takes — not just its
/// terminal output.
///
/// This re-implements the flow's own dispatch loop (mirroring
/// [`Flow::execute`]) rather than calling [`crate::Node::process`] on the
/// inner flow once, because a single call only ever surfaces the flow's
/// final message: every message produced between the first and last node
/// would otherwise be invisible to observation. Walking the route table
/// itself, and notifying after each node runs, is what lets an observer
/// registered on an intermediate message type fire.
///
/// This crate registers observers against exact concrete types rather than
/// walking a supertype hierarchy: Rust's trait objects carry no runtime
/// subtype relationship to walk (there is no `issubclass` equivalent over
/// arbitrary trait impls), so the closest faithful behavior is an exact
/// `TypeId` match. A node with a multi-variant output enum gets per-variant
/// `Message::as_any`/`into_any` delegation (see `route.rs`), so an observer
/// registered on an inner variant type still fires correctly even though the
/// node's declared `Output` is the enum. This is recorded as a deviation in
/// `DESIGN.md`.
pub struct ObservableFlow<TIn, TOut> {
    inner: Arc<Flow<TIn, TOut>>,
    observers: Vec<Arc<dyn ErasedObserver>>,
}

impl<TIn, TOut> ObservableFlow<TIn, TOut>
where
    TIn: Message + 'static,
    TOut: Message + 'static,
{
    pub fn new(inner: Arc<Flow<TIn, TOut>>) -> Self {
        Self {
            inner,
            observers: Vec::new(),
        }
    }

    /// Register an observer for exactly one concrete message type. Returns
    /// `self` for chaining; unlike [`crate::builder::FlowBuilder`], this
    /// mutates and returns the same wrapper rather than producing a new one,
    /// since observer registration has no reachability/duplicate invariants
    /// to protect.
    pub fn watch<M>(mut self, observer: Arc<dyn Observer<M>>) -> Self
    where
        M: Message + 'static,
    {
        self.observers.push(Arc::new(TypedObserver { inner: observer }));
        self
    }

    /// Notify every observer whose registered type matches `message`'s
    /// concrete type, concurrently. The first observer error aborts the
    /// remaining notifications and is returned; observers that already
    /// completed are not rolled back — there is nothing to roll back, since
    /// observation has no side effect on the flow's own state.
    async fn notify(&self, message: &dyn Message) -> Result<(), ObserverError> {
        let type_id = message.as_any().type_id();
        let matching = self.observers.iter().filter(|o| o.message_type() == type_id);

        let notifications = matching.map(|o| async move {
            o.notify(message).await.map_err(|source| ObserverError::NotificationFailed {
                message_type: message.type_name(),
                source,
            })
        });

        try_join_all(notifications).await?;
        Ok(())
    }

    /// Run the wrapped flow to completion, notifying observers after every
    /// hop (including the initial message, before the first node runs).
    /// Mirrors [`Flow::execute`]'s dispatch loop exactly, substituting
    /// observer notification for callback-hook firing.
    pub async fn process(&self, message: TIn) -> anyhow::Result<TOut> {
        let mut current_node: Arc<dyn ErasedNode> = Arc::clone(self.inner.starting_node());
        let mut current_message: Box<dyn Message> = Box::new(message);

        self.notify(current_message.as_ref()).await?;

        loop {
            let node_name = current_node.name().to_string();
            let output = current_node
                .process_erased(current_message)
                .await
                .map_err(|source| FlowExecError::NodeFailure {
                    node: node_name.clone(),
                    source,
                })?;

            self.notify(output.as_ref()).await?;

            let type_id = output.as_any().type_id();
            let destination = self
                .inner
                .routes()
                .iter()
                .find(|((source, tid), _)| source.as_ref() == node_name && *tid == type_id)
                .map(|(_, dest)| dest);

            match destination {
                Some(RouteDestination::Terminal) => {
                    let type_name = output.type_name();
                    let downcast = output.into_any().downcast::<TOut>().unwrap_or_else(|_| {
                        unreachable!(
                            "observed flow '{}' terminated with a '{type_name}' message that does \
                             not match its declared terminal type; this is a builder bug, not a \
                             caller error",
                            self.inner.name()
                        )
                    });
                    return Ok(*downcast);
                }
                Some(RouteDestination::Node(next)) => {
                    current_node = Arc::clone(next);
                    current_message = output;
                }
                None => {
                    return Err(FlowExecError::UnroutedMessage {
                        node: node_name,
                        message_type: output.type_name(),
                    }
                    .into());
                }
            }
        }
    }
}
