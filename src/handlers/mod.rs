//! # Message Handlers
//!
//! Application logic invoked once per logical message and handler. Handlers
//! are registered per message type and run in registration order.

mod context;

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::message::{LogicalMessage, Message};
use crate::pipeline::HandlerError;

pub use context::MessageHandlerContext;

/// Handles messages of type `M`
#[async_trait]
pub trait HandleMessages<M: Message>: Send + Sync + 'static {
    async fn handle(&self, message: &M, context: &mut MessageHandlerContext)
        -> Result<(), HandlerError>;
}

/// Type-erased handler stored in the registry
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handler type name for diagnostics
    fn handler_type(&self) -> &'static str;

    async fn handle(
        &self,
        message: &LogicalMessage,
        context: &mut MessageHandlerContext,
    ) -> Result<(), HandlerError>;
}

struct TypedHandler<M, H> {
    handler: Arc<H>,
    _message: PhantomData<fn(M)>,
}

#[async_trait]
impl<M, H> MessageHandler for TypedHandler<M, H>
where
    M: Message,
    H: HandleMessages<M>,
{
    fn handler_type(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    async fn handle(
        &self,
        message: &LogicalMessage,
        context: &mut MessageHandlerContext,
    ) -> Result<(), HandlerError> {
        let typed = message.downcast_ref::<M>().ok_or_else(|| {
            format!(
                "handler {} expects {} but received {}",
                std::any::type_name::<H>(),
                M::MESSAGE_TYPE,
                message.message_type()
            )
        })?;
        self.handler.handle(typed, context).await
    }
}

/// Handlers keyed by message type
#[derive(Clone, Default)]
pub struct MessageHandlerRegistry {
    handlers: HashMap<TypeId, Vec<Arc<dyn MessageHandler>>>,
}

impl MessageHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M, H>(&mut self, handler: H) -> &mut Self
    where
        M: Message,
        H: HandleMessages<M>,
    {
        self.register_shared::<M, H>(Arc::new(handler))
    }

    /// Register a handler instance that may also be registered for other message types
    pub fn register_shared<M, H>(&mut self, handler: Arc<H>) -> &mut Self
    where
        M: Message,
        H: HandleMessages<M>,
    {
        let erased: Arc<dyn MessageHandler> = Arc::new(TypedHandler::<M, H> {
            handler,
            _message: PhantomData,
        });
        self.handlers
            .entry(TypeId::of::<M>())
            .or_default()
            .push(erased);
        self
    }

    /// Handlers for a message type, in registration order
    pub fn handlers_for(&self, type_id: TypeId) -> Vec<Arc<dyn MessageHandler>> {
        self.handlers.get(&type_id).cloned().unwrap_or_default()
    }

    pub fn handles<M: Message>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<M>())
    }

    /// Number of registered handler bindings across all message types
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for MessageHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings: Vec<&'static str> = self
            .handlers
            .values()
            .flatten()
            .map(|handler| handler.handler_type())
            .collect();
        f.debug_struct("MessageHandlerRegistry")
            .field("handlers", &bindings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderPlaced;

    impl Message for OrderPlaced {
        const MESSAGE_TYPE: &'static str = "Sales.OrderPlaced";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderCancelled;

    impl Message for OrderCancelled {
        const MESSAGE_TYPE: &'static str = "Sales.OrderCancelled";
    }

    struct OrderPolicy;

    #[async_trait]
    impl HandleMessages<OrderPlaced> for OrderPolicy {
        async fn handle(
            &self,
            _message: &OrderPlaced,
            _context: &mut MessageHandlerContext,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl HandleMessages<OrderCancelled> for OrderPolicy {
        async fn handle(
            &self,
            _message: &OrderCancelled,
            _context: &mut MessageHandlerContext,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn test_handlers_are_kept_in_registration_order() {
        let policy = Arc::new(OrderPolicy);
        let mut registry = MessageHandlerRegistry::new();
        registry
            .register_shared::<OrderPlaced, _>(Arc::clone(&policy))
            .register_shared::<OrderCancelled, _>(policy)
            .register::<OrderPlaced, _>(OrderPolicy);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.handlers_for(TypeId::of::<OrderPlaced>()).len(), 2);
        assert!(registry.handles::<OrderCancelled>());
        assert!(registry.handlers_for(TypeId::of::<u32>()).is_empty());
    }

    #[test]
    fn test_erased_handler_rejects_other_message_types() {
        use crate::config::CourierConfig;
        use crate::context::{BehaviorContext, ContextBag};
        use crate::endpoint::EndpointComponents;
        use crate::message::Headers;
        use crate::pipeline::{PipelineAssembler, PipelineSettings};
        use crate::transport::InMemoryTransport;

        let components = EndpointComponents::new(
            CourierConfig::default(),
            Arc::new(InMemoryTransport::new("test")),
        );
        let pipelines = PipelineAssembler::new(&PipelineSettings::new(), &components)
            .assemble()
            .unwrap();
        let base = BehaviorContext::new(Arc::new(pipelines), ContextBag::new());
        let mut context = MessageHandlerContext::new(base, "m-1", Headers::new());

        let mut registry = MessageHandlerRegistry::new();
        registry.register::<OrderPlaced, _>(OrderPolicy);
        let handlers = registry.handlers_for(TypeId::of::<OrderPlaced>());
        let handler = &handlers[0];

        let err = tokio_test::block_on(
            handler.handle(&LogicalMessage::new(OrderCancelled), &mut context),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Sales.OrderCancelled"));
        assert!(
            tokio_test::block_on(handler.handle(&LogicalMessage::new(OrderPlaced), &mut context))
                .is_ok()
        );
    }
}
