use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{BehaviorContext, DispatchContext, OutgoingPhysicalContext};
use crate::message::TransportOperation;
use crate::outbox::PendingTransportOperations;
use crate::pipeline::{
    Behavior, Next, ProcessingResult, StageConnector, StageContext, StageInvoker,
};
use crate::transport::Transport;

/// Captures the operation when a delivery consistency scope is open, and
/// dispatches it through the dispatch chain otherwise
pub(crate) async fn capture_or_dispatch(
    parent: &BehaviorContext,
    operation: TransportOperation,
    immediate_dispatch: bool,
    stage: StageInvoker<'_, DispatchContext>,
) -> ProcessingResult<()> {
    if !immediate_dispatch {
        if let Some(pending) = parent.extensions().get::<PendingTransportOperations>() {
            tracing::trace!(
                message_id = %operation.message_id,
                destination = %operation.destination,
                "captured outgoing operation"
            );
            pending.add(operation);
            return Ok(());
        }
    }

    let mut dispatch = DispatchContext::new(parent, vec![operation]);
    stage.invoke(&mut dispatch).await
}

/// Turns an outgoing physical message into a transport operation
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingToDispatchConnector;

#[async_trait]
impl StageConnector<OutgoingPhysicalContext, DispatchContext> for RoutingToDispatchConnector {
    async fn invoke(
        &self,
        context: &mut OutgoingPhysicalContext,
        stage: StageInvoker<'_, DispatchContext>,
    ) -> ProcessingResult<()> {
        let operation = context.to_operation();
        capture_or_dispatch(
            context.behavior_context(),
            operation,
            context.immediate_dispatch,
            stage,
        )
        .await
    }
}

/// Hands every operation of the dispatch context to the transport, in order
pub struct ImmediateDispatchTerminator {
    transport: Arc<dyn Transport>,
}

impl ImmediateDispatchTerminator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Behavior<DispatchContext> for ImmediateDispatchTerminator {
    async fn invoke(
        &self,
        context: &mut DispatchContext,
        _next: Next<'_, DispatchContext>,
    ) -> ProcessingResult<()> {
        for operation in &context.operations {
            self.transport.dispatch(operation).await?;
        }
        Ok(())
    }
}
