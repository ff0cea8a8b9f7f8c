use std::sync::Arc;

use crate::config::CourierConfig;
use crate::handlers::MessageHandlerRegistry;
use crate::incoming::MutateIncomingTransportMessage;
use crate::message::MessageMetadataRegistry;
use crate::outbox::OutboxStorage;
use crate::outgoing::MutateOutgoingTransportMessage;
use crate::routing::UnicastRoutingTable;
use crate::serialization::SerializerResolver;
use crate::transport::Transport;

/// Everything step factories may draw on when a pipeline is assembled
#[derive(Clone)]
pub struct EndpointComponents {
    pub config: Arc<CourierConfig>,
    pub transport: Arc<dyn Transport>,
    pub outbox_storage: Option<Arc<dyn OutboxStorage>>,
    pub messages: Arc<MessageMetadataRegistry>,
    pub handlers: Arc<MessageHandlerRegistry>,
    pub serializers: Arc<SerializerResolver>,
    pub routing: Arc<UnicastRoutingTable>,
    pub incoming_mutators: Vec<Arc<dyn MutateIncomingTransportMessage>>,
    pub outgoing_mutators: Vec<Arc<dyn MutateOutgoingTransportMessage>>,
}

impl EndpointComponents {
    /// Components with empty registries, JSON serialization and the configured routes
    pub fn new(config: CourierConfig, transport: Arc<dyn Transport>) -> Self {
        let routing = UnicastRoutingTable::from_config(&config.routing);
        Self {
            config: Arc::new(config),
            transport,
            outbox_storage: None,
            messages: Arc::new(MessageMetadataRegistry::new()),
            handlers: Arc::new(MessageHandlerRegistry::new()),
            serializers: Arc::new(SerializerResolver::default()),
            routing: Arc::new(routing),
            incoming_mutators: Vec::new(),
            outgoing_mutators: Vec::new(),
        }
    }

    /// Storage the delivery consistency connector uses, `None` when disabled
    pub fn active_outbox(&self) -> Option<Arc<dyn OutboxStorage>> {
        self.outbox_storage
            .clone()
            .filter(|_| self.config.outbox.enabled)
    }
}

impl std::fmt::Debug for EndpointComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointComponents")
            .field("endpoint", &self.config.endpoint.name)
            .field("outbox", &self.outbox_storage.is_some())
            .field("messages", &self.messages.len())
            .field("handlers", &self.handlers.len())
            .field("routes", &self.routing.len())
            .field("incoming_mutators", &self.incoming_mutators.len())
            .field("outgoing_mutators", &self.outgoing_mutators.len())
            .finish()
    }
}
