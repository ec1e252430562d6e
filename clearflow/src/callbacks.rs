//! The callback protocol: a non-interfering observer of flow lifecycle
//! events. Handler errors are absorbed and reported to a diagnostics sink —
//! the inverse of [`crate::observer`]'s fail-fast policy. See
//! `SPEC_FULL.md` §9 ("Callback vs observer duality").

use async_trait::async_trait;

use crate::message::Message;

/// A process-level, possibly-absent error passed to the `on_*_end` hooks.
/// Kept as a trait object here (rather than this crate's concrete
/// `FlowExecError`) so `callbacks.rs` has no dependency on `flow.rs`.
pub type HookError<'a> = &'a (dyn std::error::Error + Send + Sync + 'static);

/// Four asynchronous lifecycle hooks, all defaulting to no-ops. Implement
/// only the ones you need.
///
/// Contract: a handler receives message references and MUST NOT retain them
/// beyond the call — the engine does not enforce this, it is a documented
/// obligation on implementors (spec.md §4.5, "No retention").
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn on_flow_start(&self, _flow_name: &str, _message: &dyn Message) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_flow_end(
        &self,
        _flow_name: &str,
        _message: &dyn Message,
        _error: Option<HookError<'_>>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_node_start(&self, _node_name: &str, _message: &dyn Message) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_node_end(
        &self,
        _node_name: &str,
        _message: &dyn Message,
        _error: Option<HookError<'_>>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs `hook_name`'s call to `f` and, if it errs, reports the failure to
/// the diagnostics sink (`tracing::error!`) instead of letting it propagate.
/// This is the sole mechanism by which callback errors are isolated from
/// flow logic — every call site in `flow.rs`/`observer.rs`'s callback path
/// goes through this function.
pub(crate) async fn report_if_failed<F>(hook_name: &str, handler_name: &str, result: anyhow::Result<()>) {
    if let Err(err) = result {
        tracing::error!(
            handler = handler_name,
            hook = hook_name,
            error = %err,
            "callback handler failed; flow execution continues"
        );
    }
}

/// Fans out to an ordered set of sub-handlers, invoking them sequentially
/// (never concurrently — spec.md §5) and isolating each one's failure so a
/// faulty handler never masks another.
pub struct CompositeHandler {
    handlers: Vec<std::sync::Arc<dyn CallbackHandler>>,
}

impl CompositeHandler {
    pub fn new(handlers: Vec<std::sync::Arc<dyn CallbackHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl CallbackHandler for CompositeHandler {
    async fn on_flow_start(&self, flow_name: &str, message: &dyn Message) -> anyhow::Result<()> {
        for (i, h) in self.handlers.iter().enumerate() {
            report_if_failed(
                "on_flow_start",
                &format!("handler[{i}]"),
                h.on_flow_start(flow_name, message).await,
            )
            .await;
        }
        Ok(())
    }

    async fn on_flow_end(
        &self,
        flow_name: &str,
        message: &dyn Message,
        error: Option<HookError<'_>>,
    ) -> anyhow::Result<()> {
        for (i, h) in self.handlers.iter().enumerate() {
            report_if_failed(
                "on_flow_end",
                &format!("handler[{i}]"),
                h.on_flow_end(flow_name, message, error).await,
            )
            .await;
        }
        Ok(())
    }

    async fn on_node_start(&self, node_name: &str, message: &dyn Message) -> anyhow::Result<()> {
        for (i, h) in self.handlers.iter().enumerate() {
            report_if_failed(
                "on_node_start",
                &format!("handler[{i}]"),
                h.on_node_start(node_name, message).await,
            )
            .await;
        }
        Ok(())
    }

    async fn on_node_end(
        &self,
        node_name: &str,
        message: &dyn Message,
        error: Option<HookError<'_>>,
    ) -> anyhow::Result<()> {
        for (i, h) in self.handlers.iter().enumerate() {
            report_if_failed(
                "on_node_end",
                &format!("handler[{i}]"),
                h.on_node_end(node_name, message, error).await,
            )
            .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Envelope;
    use crate::ids::RunId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Probe {
        envelope: Envelope,
    }
    impl Message for Probe {
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
            "Probe"
        }
        fn clone_message(&self) -> Box<dyn Message> {
            Box::new(self.clone())
        }
    }

    struct Failing;
    #[async_trait]
    impl CallbackHandler for Failing {
        async fn on_flow_start(&self, _flow_name: &str, _message: &dyn Message) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    struct Counting {
        count: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl CallbackHandler for Counting {
        async fn on_flow_start(&self, _flow_name: &str, _message: &dyn Message) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn composite_handler_isolates_failing_sub_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let composite = CompositeHandler::new(vec![
            Arc::new(Failing),
            Arc::new(Counting { count: count.clone() }),
        ]);
        let message = Probe {
            envelope: Envelope::for_command(RunId::new(), None),
        };
        composite.on_flow_start("f", &message).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
