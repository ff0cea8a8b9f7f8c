//! # System Constants
//!
//! Header keys, well-known step identifiers and header values that define the
//! wire-level vocabulary shared by every pipeline stage.

/// Recognized message header keys
pub mod headers {
    pub const MESSAGE_ID: &str = "NServiceBus.MessageId";
    pub const ENCLOSED_MESSAGE_TYPES: &str = "NServiceBus.EnclosedMessageTypes";
    pub const CONTENT_TYPE: &str = "NServiceBus.ContentType";
    pub const CONVERSATION_ID: &str = "NServiceBus.ConversationId";
    pub const RELATED_TO: &str = "NServiceBus.RelatedTo";
    pub const CORRELATION_ID: &str = "NServiceBus.CorrelationId";
    pub const MESSAGE_INTENT: &str = "NServiceBus.MessageIntent";
    pub const REPLY_TO_ADDRESS: &str = "NServiceBus.ReplyToAddress";
    pub const ORIGINATING_ENDPOINT: &str = "NServiceBus.OriginatingEndpoint";
    pub const TIME_SENT: &str = "NServiceBus.TimeSent";

    // Audit headers stamped on forwarded copies
    pub const PROCESSING_ENDPOINT: &str = "NServiceBus.ProcessingEndpoint";
    pub const PROCESSING_STARTED: &str = "NServiceBus.ProcessingStarted";
    pub const PROCESSING_ENDED: &str = "NServiceBus.ProcessingEnded";

    /// Separator between tokens in the enclosed message types header
    pub const ENCLOSED_MESSAGE_TYPES_SEPARATOR: char = ';';
}

/// Identifiers of the core steps other steps can position themselves against
pub mod well_known_steps {
    pub const RECEIVE_PHYSICAL_MESSAGE: &str = "TransportReceiveToPhysicalMessageProcessingConnector";
    pub const MUTATE_INCOMING_TRANSPORT_MESSAGE: &str = "MutateIncomingTransportMessage";
    pub const AUDIT_PROCESSED_MESSAGE: &str = "AuditProcessedMessage";
    pub const DESERIALIZE_MESSAGES: &str = "DeserializeLogicalMessagesConnector";
    pub const LOAD_HANDLERS: &str = "LoadHandlersConnector";
    pub const INVOKE_HANDLERS: &str = "InvokeHandlers";
    pub const UNICAST_ROUTING: &str = "UnicastRouting";
    pub const SERIALIZE_MESSAGE: &str = "SerializeMessageConnector";
    pub const MUTATE_OUTGOING_TRANSPORT_MESSAGE: &str = "MutateOutgoingTransportMessage";
    pub const ATTACH_CAUSATION_HEADERS: &str = "AttachCausationHeaders";
    pub const ROUTING_TO_DISPATCH: &str = "RoutingToDispatchConnector";
    pub const IMMEDIATE_DISPATCH: &str = "ImmediateDispatch";
}

/// Legacy type-token marker that is never resolvable
pub const LEGACY_IMPL_TYPE_MARKER: &str = "__impl";

/// Token prefix written by old senders for scheduled task messages
pub const LEGACY_SCHEDULED_TASK_TOKEN_PREFIX: &str =
    "NServiceBus.Scheduling.Messages.ScheduledTask, NServiceBus.Core";

/// Current type token that legacy scheduled task tokens resolve to
pub const SCHEDULED_TASK_MESSAGE_TYPE: &str = "NServiceBus.ScheduledTask";

/// Default environment variable prefix for configuration overrides
pub const CONFIG_ENV_PREFIX: &str = "COURIER";
