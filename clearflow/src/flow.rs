//! The flow executor: a deterministic, single-message dispatch loop over an
//! immutable route table. A `Flow` itself implements [`Node`], so flows
//! compose — the executor has no special case for a nested flow; it calls
//! `process` like any other node (spec.md §9, "Flow-as-node").

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::callbacks::{report_if_failed, CallbackHandler};
use crate::message::Message;
use crate::node::{ErasedNode, Node};
use crate::route::{RouteDestination, RouteKey};

/// A built, runnable flow. Produced only by [`crate::builder::FlowBuilder::end`];
/// never mutated after construction.
pub struct Flow<TIn, TOut> {
    name: Arc<str>,
    starting_node: Arc<dyn ErasedNode>,
    routes: Arc<Vec<(RouteKey, RouteDestination)>>,
    callbacks: Option<Arc<dyn CallbackHandler>>,
    _marker: PhantomData<fn(TIn) -> TOut>,
}

/// Errors surfaced by executing a built flow. Build-time errors
/// ([`crate::builder::FlowBuildError`]) are a disjoint set — a `Flow` value
/// only ever fails this way once it is already running.
#[derive(Debug, thiserror::Error)]
pub enum FlowExecError {
    #[error("no route bound for node '{node}' producing message type '{message_type}'")]
    UnroutedMessage { node: String, message_type: &'static str },

    #[error("node '{node}' failed: {source}")]
    NodeFailure {
        node: String,
        #[source]
        source: anyhow::Error,
    },
}

impl<TIn, TOut> Flow<TIn, TOut> {
    pub(crate) fn new(
        name: Arc<str>,
        starting_node: Arc<dyn ErasedNode>,
        routes: Arc<Vec<(RouteKey, RouteDestination)>>,
        callbacks: Option<Arc<dyn CallbackHandler>>,
    ) -> Self {
        Self {
            name,
            starting_node,
            routes,
            callbacks,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The flow's own starting node, type-erased. Exposed crate-internally
    /// so [`crate::observer::ObservableFlow`] can walk this flow's route
    /// table itself rather than treating the flow as an opaque single-hop
    /// [`Node`].
    pub(crate) fn starting_node(&self) -> &Arc<dyn ErasedNode> {
        &self.starting_node
    }

    /// The flow's immutable route table. See [`Flow::starting_node`].
    pub(crate) fn routes(&self) -> &Arc<Vec<(RouteKey, RouteDestination)>> {
        &self.routes
    }
}

impl<TIn, TOut> Flow<TIn, TOut>
where
    TIn: Message + 'static,
    TOut: Message + 'static,
{
    /// Run the flow to completion, returning its typed terminal output.
    /// Equivalent to [`Node::process`] but with the flow's own
    /// [`FlowExecError`] rather than an opaque `anyhow::Error`, for callers
    /// who hold a `Flow` directly rather than composing it into another
    /// flow as a node.
    pub async fn run(&self, message: TIn) -> Result<TOut, FlowExecError> {
        let output = self.execute(Box::new(message)).await?;
        let type_name = output.type_name();
        let downcast = output.into_any().downcast::<TOut>().unwrap_or_else(|_| {
            unreachable!(
                "flow '{}' terminated with a '{type_name}' message that does not match its \
                 declared terminal type; this is a builder bug, not a caller error",
                self.name
            )
        });
        Ok(*downcast)
    }

    /// The type-erased dispatch loop described in spec.md §4.4.
    async fn execute(&self, initial_message: Box<dyn Message>) -> Result<Box<dyn Message>, FlowExecError> {
        tracing::debug!(flow = self.name.as_ref(), "flow started");
        if let Some(cb) = &self.callbacks {
            report_if_failed(
                "on_flow_start",
                self.name.as_ref(),
                cb.on_flow_start(&self.name, initial_message.as_ref()).await,
            )
            .await;
        }

        let mut current_node: Arc<dyn ErasedNode> = Arc::clone(&self.starting_node);
        let mut current_message = initial_message;

        loop {
            if let Some(cb) = &self.callbacks {
                report_if_failed(
                    "on_node_start",
                    self.name.as_ref(),
                    cb.on_node_start(current_node.name(), current_message.as_ref()).await,
                )
                .await;
            }

            let node_name = current_node.name().to_string();
            // Retained in case `process_erased` fails: the callback/flow-end
            // hooks still need a reference to the message that was being
            // processed, but `process_erased` consumes its argument.
            let input_snapshot = current_message.clone_message();

            match current_node.process_erased(current_message).await {
                Ok(output) => {
                    if let Some(cb) = &self.callbacks {
                        report_if_failed(
                            "on_node_end",
                            self.name.as_ref(),
                            cb.on_node_end(&node_name, output.as_ref(), None).await,
                        )
                        .await;
                    }

                    let type_id = output.as_any().type_id();
                    let destination = self
                        .routes
                        .iter()
                        .find(|((source, tid), _)| source.as_ref() == node_name && *tid == type_id)
                        .map(|(_, dest)| dest);

                    match destination {
                        Some(RouteDestination::Terminal) => {
                            if let Some(cb) = &self.callbacks {
                                report_if_failed(
                                    "on_flow_end",
                                    self.name.as_ref(),
                                    cb.on_flow_end(&self.name, output.as_ref(), None).await,
                                )
                                .await;
                            }
                            tracing::debug!(flow = self.name.as_ref(), "flow ended");
                            return Ok(output);
                        }
                        Some(RouteDestination::Node(next)) => {
                            current_node = Arc::clone(next);
                            current_message = output;
                        }
                        None => {
                            let err = FlowExecError::UnroutedMessage {
                                node: node_name,
                                message_type: output.type_name(),
                            };
                            if let Some(cb) = &self.callbacks {
                                report_if_failed(
                                    "on_flow_end",
                                    self.name.as_ref(),
                                    cb.on_flow_end(&self.name, output.as_ref(), Some(&err)).await,
                                )
                                .await;
                            }
                            tracing::debug!(flow = self.name.as_ref(), error = %err, "flow ended with error");
                            return Err(err);
                        }
                    }
                }
                Err(source) => {
                    let failed_node = node_name.clone();
                    let err = FlowExecError::NodeFailure { node: node_name, source };
                    if let Some(cb) = &self.callbacks {
                        report_if_failed(
                            "on_node_end",
                            self.name.as_ref(),
                            cb.on_node_end(&failed_node, input_snapshot.as_ref(), Some(&err)).await,
                        )
                        .await;
                        report_if_failed(
                            "on_flow_end",
                            self.name.as_ref(),
                            cb.on_flow_end(&self.name, input_snapshot.as_ref(), Some(&err)).await,
                        )
                        .await;
                    }
                    tracing::debug!(flow = self.name.as_ref(), error = %err, "flow ended with error");
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl<TIn, TOut> Node for Flow<TIn, TOut>
where
    TIn: Message + 'static,
    TOut: Message + 'static,
{
    type Input = TIn;
    type Output = TOut;

    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, message: TIn) -> anyhow::Result<TOut> {
        Ok(self.run(message).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::create_flow;
    use crate::ids::RunId;
    use crate::message::{Command, Envelope, Event};
    use crate::node::NodeBase;

    #[derive(Debug, Clone)]
    struct Cmd {
        envelope: Envelope,
        data: String,
    }
    impl Message for Cmd {
        fn envelope(&self) -> &Envelope {
            &self.envelope
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
        fn type_name(&self) -> &'static str {
            "Cmd"
        }
        fn clone_message(&self) -> Box<dyn Message> {
            Box::new(self.clone())
        }
    }
    impl Command for Cmd {}

    #[derive(Debug, Clone)]
    struct EvtA {
        envelope: Envelope,
        data: String,
    }
    impl Message for EvtA {
        fn envelope(&self) -> &Envelope {
            &self.envelope
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
            self
        }
        fn type_name(&self) -> &'static str {
            "EvtA"
        }
        fn clone_message(&self) -> Box<dyn Message> {
            Box::new(self.clone())
        }
    }
    impl Event for EvtA {}

    struct Start {
        base: NodeBase,
    }
    #[async_trait]
    impl Node for Start {
        type Input = Cmd;
        type Output = EvtA;
        fn name(&self) -> &str {
            self.base.name()
        }
        async fn process(&self, message: Cmd) -> anyhow::Result<EvtA> {
            Ok(EvtA {
                envelope: Envelope::for_event(message.envelope.run_id(), message.envelope.id()),
                data: format!("started: {}", message.data),
            })
        }
    }

    #[tokio::test]
    async fn single_hop_flow_terminates_in_one_step() {
        let start = Arc::new(Start {
            base: NodeBase::new("start").unwrap(),
        });
        let flow = create_flow("single", start.clone())
            .end::<EvtA, _>(&start)
            .unwrap();

        let run = RunId::new();
        let input = Cmd {
            envelope: Envelope::for_command(run, None),
            data: "x".to_string(),
        };
        let output = flow.run(input).await.unwrap();
        assert_eq!(output.data, "started: x");
        assert_eq!(output.envelope.run_id(), run);
    }

    struct Failer {
        base: NodeBase,
    }
    #[async_trait]
    impl Node for Failer {
        type Input = Cmd;
        type Output = EvtA;
        fn name(&self) -> &str {
            self.base.name()
        }
        async fn process(&self, _message: Cmd) -> anyhow::Result<EvtA> {
            anyhow::bail!("node exploded")
        }
    }

    #[tokio::test]
    async fn node_failure_propagates_unchanged_with_no_handler() {
        let failer = Arc::new(Failer {
            base: NodeBase::new("failer").unwrap(),
        });
        let flow = create_flow("failing", failer.clone())
            .end::<EvtA, _>(&failer)
            .unwrap();

        let input = Cmd {
            envelope: Envelope::for_command(RunId::new(), None),
            data: "x".to_string(),
        };
        let err = flow.run(input).await.unwrap_err();
        assert!(matches!(err, FlowExecError::NodeFailure { node, .. } if node == "failer"));
    }
}
