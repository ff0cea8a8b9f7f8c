//! # Endpoint
//!
//! Wires the core steps into [`PipelineSettings`], collects application
//! registrations (messages, handlers, routes, mutators, custom steps) and
//! assembles them into an [`Endpoint`] that processes envelopes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier_core::config::CourierConfig;
//! use courier_core::endpoint::EndpointBuilder;
//! use courier_core::outbox::InMemoryOutboxStorage;
//! use courier_core::transport::InMemoryTransport;
//!
//! # async fn run() -> courier_core::Result<()> {
//! let transport = Arc::new(InMemoryTransport::new("sales"));
//! let endpoint = EndpointBuilder::new(CourierConfig::default(), transport)
//!     .with_outbox_storage(Arc::new(InMemoryOutboxStorage::new()))
//!     .build()?;
//!
//! while let Some(outcome) = endpoint.receive_once().await? {
//!     println!("{outcome:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod components;

use std::sync::Arc;

use tracing::{info, instrument, warn};

pub use components::EndpointComponents;

use crate::config::CourierConfig;
use crate::constants::well_known_steps;
use crate::context::{
    BehaviorContext, ContextBag, DispatchContext, IncomingLogicalContext, IncomingPhysicalContext,
    InvokeHandlerContext, OutgoingLogicalContext, OutgoingPhysicalContext, ProcessingOutcome,
    TransportReceiveContext,
};
use crate::handlers::{HandleMessages, MessageHandlerRegistry};
use crate::incoming::{
    AuditProcessedMessageBehavior, DeliveryConsistencyConnector,
    DeserializeLogicalMessagesConnector, InvokeHandlerTerminator, LoadHandlersConnector,
    MutateIncomingTransportMessage, MutateIncomingTransportMessageBehavior,
};
use crate::message::{Message, MessageMetadataRegistry};
use crate::outbox::OutboxStorage;
use crate::outgoing::{
    AttachCausationHeadersBehavior, ImmediateDispatchTerminator, MessageOperations,
    MutateOutgoingTransportMessage, MutateOutgoingTransportMessageBehavior, PublishOptions,
    RoutingToDispatchConnector, SendOptions, SerializeMessageConnector, UnicastRoutingBehavior,
};
use crate::pipeline::{
    PipelineAssembler, PipelineConfigurationError, PipelineSettings, Pipelines, ProcessingResult,
    RegisterStep, ReplaceStep,
};
use crate::routing::UnicastRoutingTable;
use crate::serialization::{MessageSerializer, SerializerResolver};
use crate::transport::Transport;

pub struct EndpointBuilder {
    config: CourierConfig,
    transport: Arc<dyn Transport>,
    outbox_storage: Option<Arc<dyn OutboxStorage>>,
    messages: MessageMetadataRegistry,
    handlers: MessageHandlerRegistry,
    serializers: SerializerResolver,
    routing: UnicastRoutingTable,
    incoming_mutators: Vec<Arc<dyn MutateIncomingTransportMessage>>,
    outgoing_mutators: Vec<Arc<dyn MutateOutgoingTransportMessage>>,
    settings: PipelineSettings,
    core_registration: Result<(), PipelineConfigurationError>,
}

impl EndpointBuilder {
    /// Builder with every core step registered
    pub fn new(config: CourierConfig, transport: Arc<dyn Transport>) -> Self {
        let mut settings = PipelineSettings::new();
        let core_registration = register_core_steps(&mut settings);
        let routing = UnicastRoutingTable::from_config(&config.routing);

        Self {
            config,
            transport,
            outbox_storage: None,
            messages: MessageMetadataRegistry::new(),
            handlers: MessageHandlerRegistry::new(),
            serializers: SerializerResolver::default(),
            routing,
            incoming_mutators: Vec::new(),
            outgoing_mutators: Vec::new(),
            settings,
            core_registration,
        }
    }

    /// Enable exactly-once processing backed by `storage`
    pub fn with_outbox_storage(mut self, storage: Arc<dyn OutboxStorage>) -> Self {
        self.outbox_storage = Some(storage);
        self
    }

    /// Accept incoming bodies of an additional content type
    pub fn with_serializer(mut self, serializer: Arc<dyn MessageSerializer>) -> Self {
        self.serializers.add(serializer);
        self
    }

    pub fn register_message<M: Message>(mut self) -> Self {
        self.messages.register::<M>();
        self
    }

    /// Register `handler` for `M`; the message type is registered as well
    pub fn register_handler<M, H>(mut self, handler: H) -> Self
    where
        M: Message,
        H: HandleMessages<M>,
    {
        self.messages.register::<M>();
        self.handlers.register::<M, H>(handler);
        self
    }

    pub fn register_shared_handler<M, H>(mut self, handler: Arc<H>) -> Self
    where
        M: Message,
        H: HandleMessages<M>,
    {
        self.messages.register::<M>();
        self.handlers.register_shared::<M, H>(handler);
        self
    }

    pub fn route<M: Message>(mut self, destination: impl Into<String>) -> Self {
        self.routing.route::<M>(destination);
        self
    }

    pub fn add_incoming_mutator(mut self, mutator: impl MutateIncomingTransportMessage) -> Self {
        self.incoming_mutators.push(Arc::new(mutator));
        self
    }

    pub fn add_outgoing_mutator(mut self, mutator: impl MutateOutgoingTransportMessage) -> Self {
        self.outgoing_mutators.push(Arc::new(mutator));
        self
    }

    /// Add a custom step; fails immediately on a duplicate or malformed registration
    pub fn register_step(mut self, step: RegisterStep) -> Result<Self, PipelineConfigurationError> {
        self.settings.register(step)?;
        Ok(self)
    }

    pub fn replace_step(mut self, replacement: ReplaceStep) -> Result<Self, PipelineConfigurationError> {
        self.settings.replace(replacement)?;
        Ok(self)
    }

    /// Direct access to the step registrations
    pub fn pipeline(&mut self) -> &mut PipelineSettings {
        &mut self.settings
    }

    /// Validate the configuration and assemble every stage chain
    pub fn build(self) -> crate::Result<Endpoint> {
        self.core_registration?;
        self.config.validate()?;

        let components = EndpointComponents {
            config: Arc::new(self.config),
            transport: self.transport,
            outbox_storage: self.outbox_storage,
            messages: Arc::new(self.messages),
            handlers: Arc::new(self.handlers),
            serializers: Arc::new(self.serializers),
            routing: Arc::new(self.routing),
            incoming_mutators: self.incoming_mutators,
            outgoing_mutators: self.outgoing_mutators,
        };

        let pipelines = PipelineAssembler::new(&self.settings, &components).assemble()?;

        info!(
            endpoint = %components.config.endpoint.name,
            local_address = %components.config.endpoint.local_address(),
            outbox = components.active_outbox().is_some(),
            audit = components.config.audit_enabled(),
            message_types = components.messages.len(),
            handlers = components.handlers.len(),
            "Endpoint pipelines assembled"
        );

        Ok(Endpoint {
            components,
            pipelines: Arc::new(pipelines),
            root: ContextBag::new(),
        })
    }
}

impl std::fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("endpoint", &self.config.endpoint.name)
            .field("settings", &self.settings)
            .finish()
    }
}

fn register_core_steps(settings: &mut PipelineSettings) -> Result<(), PipelineConfigurationError> {
    settings
        .register(RegisterStep::connector::<
            TransportReceiveContext,
            IncomingPhysicalContext,
            _,
            _,
        >(
            well_known_steps::RECEIVE_PHYSICAL_MESSAGE,
            "Deduplicates the envelope and captures its outgoing operations",
            |components: &EndpointComponents| {
                DeliveryConsistencyConnector::new(components.active_outbox())
            },
        ))?
        .register(RegisterStep::behavior::<IncomingPhysicalContext, _, _>(
            well_known_steps::MUTATE_INCOMING_TRANSPORT_MESSAGE,
            "Runs the incoming transport message mutators",
            |components: &EndpointComponents| {
                MutateIncomingTransportMessageBehavior::new(components.incoming_mutators.clone())
            },
        ))?
        .register(
            RegisterStep::behavior::<IncomingPhysicalContext, _, _>(
                well_known_steps::AUDIT_PROCESSED_MESSAGE,
                "Forwards processed messages to the audit queue",
                |components: &EndpointComponents| {
                    AuditProcessedMessageBehavior::new(
                        components.config.audit.address.clone().unwrap_or_default(),
                        components.config.endpoint.name.clone(),
                    )
                },
            )
            .insert_after_if_exists(well_known_steps::MUTATE_INCOMING_TRANSPORT_MESSAGE)
            .enabled_when(CourierConfig::audit_enabled),
        )?
        .register(RegisterStep::connector::<
            IncomingPhysicalContext,
            IncomingLogicalContext,
            _,
            _,
        >(
            well_known_steps::DESERIALIZE_MESSAGES,
            "Deserializes the physical message body into logical messages",
            |components: &EndpointComponents| {
                DeserializeLogicalMessagesConnector::new(
                    Arc::clone(&components.messages),
                    Arc::clone(&components.serializers),
                    components.config.deserialization.skip_unknown_message_types,
                )
            },
        ))?
        .register(RegisterStep::connector::<IncomingLogicalContext, InvokeHandlerContext, _, _>(
            well_known_steps::LOAD_HANDLERS,
            "Runs the invoke handler stage once per registered handler",
            |components: &EndpointComponents| {
                LoadHandlersConnector::new(Arc::clone(&components.handlers))
            },
        ))?
        .register(RegisterStep::terminator::<InvokeHandlerContext, _, _>(
            well_known_steps::INVOKE_HANDLERS,
            "Calls the message handler",
            |_: &EndpointComponents| InvokeHandlerTerminator,
        ))?
        .register(RegisterStep::behavior::<OutgoingLogicalContext, _, _>(
            well_known_steps::UNICAST_ROUTING,
            "Determines the destination of outgoing messages",
            |components: &EndpointComponents| {
                UnicastRoutingBehavior::new(Arc::clone(&components.routing))
            },
        ))?
        .register(RegisterStep::connector::<
            OutgoingLogicalContext,
            OutgoingPhysicalContext,
            _,
            _,
        >(
            well_known_steps::SERIALIZE_MESSAGE,
            "Serializes outgoing messages and stamps the standard headers",
            |components: &EndpointComponents| {
                SerializeMessageConnector::new(
                    Arc::clone(components.serializers.default_serializer()),
                    &components.config.endpoint,
                )
            },
        ))?
        .register(RegisterStep::behavior::<OutgoingPhysicalContext, _, _>(
            well_known_steps::MUTATE_OUTGOING_TRANSPORT_MESSAGE,
            "Runs the outgoing transport message mutators",
            |components: &EndpointComponents| {
                MutateOutgoingTransportMessageBehavior::new(components.outgoing_mutators.clone())
            },
        ))?
        .register(
            RegisterStep::of_type::<OutgoingPhysicalContext, AttachCausationHeadersBehavior>(
                well_known_steps::ATTACH_CAUSATION_HEADERS,
                "Adds conversation and related-to headers",
            )
            .insert_after_if_exists(well_known_steps::MUTATE_OUTGOING_TRANSPORT_MESSAGE),
        )?
        .register(RegisterStep::connector::<OutgoingPhysicalContext, DispatchContext, _, _>(
            well_known_steps::ROUTING_TO_DISPATCH,
            "Captures or dispatches the outgoing transport operation",
            |_: &EndpointComponents| RoutingToDispatchConnector,
        ))?
        .register(RegisterStep::terminator::<DispatchContext, _, _>(
            well_known_steps::IMMEDIATE_DISPATCH,
            "Hands transport operations to the transport",
            |components: &EndpointComponents| {
                ImmediateDispatchTerminator::new(Arc::clone(&components.transport))
            },
        ))?;
    Ok(())
}

/// A running endpoint: assembled pipelines plus the components they use
pub struct Endpoint {
    components: EndpointComponents,
    pipelines: Arc<Pipelines>,
    root: ContextBag,
}

impl Endpoint {
    /// Run one envelope through the pipeline
    ///
    /// An error means the envelope must be redelivered; the transport's retry
    /// policy applies.
    #[instrument(skip_all, fields(message_id = %envelope.message_id))]
    pub async fn process(
        &self,
        envelope: crate::message::IncomingEnvelope,
    ) -> ProcessingResult<ProcessingOutcome> {
        let mut context =
            TransportReceiveContext::new(envelope, Arc::clone(&self.pipelines), &self.root);
        self.pipelines
            .transport_receive()
            .invoke(&mut context)
            .await?;
        Ok(context.outcome)
    }

    /// Receive and process one envelope, settling it with the transport
    ///
    /// Returns `Ok(None)` when the input queue is empty. On failure, including a
    /// failed acknowledgement, the envelope is abandoned for redelivery and the
    /// error is returned.
    pub async fn receive_once(&self) -> ProcessingResult<Option<ProcessingOutcome>> {
        let transport = &self.components.transport;
        let Some(envelope) = transport.receive().await? else {
            return Ok(None);
        };
        let message_id = envelope.message_id.clone();

        match self.process(envelope.clone()).await {
            Ok(outcome) => match transport.complete(&message_id).await {
                Ok(()) => Ok(Some(outcome)),
                Err(err) => {
                    // The outbox turns the redelivery into a replay
                    warn!(
                        message_id = %message_id,
                        error = %err,
                        "complete failed after successful processing, abandoning message"
                    );
                    if let Err(abandon_err) = transport.abandon(envelope).await {
                        warn!(
                            message_id = %message_id,
                            error = %abandon_err,
                            "abandon failed, message remains in flight"
                        );
                    }
                    Err(err.into())
                }
            },
            Err(err) => {
                warn!(message_id = %message_id, error = %err, "processing failed, abandoning message");
                if let Err(abandon_err) = transport.abandon(envelope).await {
                    warn!(message_id = %message_id, error = %abandon_err, "abandon failed");
                }
                Err(err)
            }
        }
    }

    /// Send from outside a handler; dispatches immediately
    pub async fn send<M: Message>(&self, message: M, options: SendOptions) -> ProcessingResult<String> {
        MessageOperations::send(&self.root_context(), message, options).await
    }

    pub async fn publish<M: Message>(
        &self,
        message: M,
        options: PublishOptions,
    ) -> ProcessingResult<String> {
        MessageOperations::publish(&self.root_context(), message, options).await
    }

    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    pub fn config(&self) -> &CourierConfig {
        &self.components.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.components.transport
    }

    /// Endpoint-wide extension bag; values set here are visible to every stage
    pub fn extensions(&self) -> &ContextBag {
        &self.root
    }

    fn root_context(&self) -> BehaviorContext {
        BehaviorContext::new(Arc::clone(&self.pipelines), self.root.child())
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("components", &self.components)
            .field("pipelines", &self.pipelines)
            .finish()
    }
}
