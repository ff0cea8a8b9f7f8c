use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::{IncomingLogicalContext, InvokeHandlerContext};
use crate::handlers::{MessageHandlerContext, MessageHandlerRegistry};
use crate::pipeline::{
    Behavior, Next, ProcessingError, ProcessingResult, StageConnector, StageContext, StageInvoker,
};

/// Runs the invoke handler chain once per handler registered for the message
pub struct LoadHandlersConnector {
    handlers: Arc<MessageHandlerRegistry>,
}

impl LoadHandlersConnector {
    pub fn new(handlers: Arc<MessageHandlerRegistry>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl StageConnector<IncomingLogicalContext, InvokeHandlerContext> for LoadHandlersConnector {
    async fn invoke(
        &self,
        context: &mut IncomingLogicalContext,
        stage: StageInvoker<'_, InvokeHandlerContext>,
    ) -> ProcessingResult<()> {
        let handlers = self.handlers.handlers_for(context.message.metadata().type_id());
        if handlers.is_empty() {
            return Err(ProcessingError::no_handlers(context.message.message_type()));
        }

        for handler in handlers {
            let mut invocation = InvokeHandlerContext::new(
                context.behavior_context(),
                context.message_id.clone(),
                context.headers.clone(),
                context.message.clone(),
                handler,
            );
            stage.invoke(&mut invocation).await?;
            context.message_handled = true;

            if invocation.handler_invocation_aborted {
                debug!(
                    message_id = %context.message_id,
                    handler = %invocation.handler.handler_type(),
                    "handler stopped dispatch of the current message"
                );
                break;
            }
        }
        Ok(())
    }
}

/// Terminating step that calls the handler of the invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokeHandlerTerminator;

#[async_trait]
impl Behavior<InvokeHandlerContext> for InvokeHandlerTerminator {
    async fn invoke(
        &self,
        context: &mut InvokeHandlerContext,
        _next: Next<'_, InvokeHandlerContext>,
    ) -> ProcessingResult<()> {
        let mut handler_context = MessageHandlerContext::new(
            context.behavior_context().clone(),
            context.message_id.clone(),
            context.headers.clone(),
        );

        context
            .handler
            .handle(&context.message, &mut handler_context)
            .await
            .map_err(|source| ProcessingError::Handler {
                handler: context.handler.handler_type().to_string(),
                message_type: context.message.message_type().to_string(),
                source,
            })?;

        context.handler_invocation_aborted = handler_context.is_dispatch_aborted();
        Ok(())
    }
}
