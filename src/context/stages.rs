use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{BehaviorContext, ContextBag};
use crate::handlers::MessageHandler;
use crate::message::{AddressTag, Headers, IncomingEnvelope, LogicalMessage, MessageIntent, TransportOperation};
use crate::pipeline::{Chain, Pipelines, Stage, StageContext};

/// What the delivery consistency manager did with an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Not yet processed
    Pending,
    /// Handlers ran; `dispatched` operations were sent
    Processed { dispatched: usize },
    /// The envelope was already processed; `replayed` stored operations were re-sent
    Duplicate { replayed: usize },
}

/// Raw envelope as delivered by the transport
#[derive(Debug)]
pub struct TransportReceiveContext {
    base: BehaviorContext,
    pub message: Arc<IncomingEnvelope>,
    pub outcome: ProcessingOutcome,
}

impl TransportReceiveContext {
    /// Root context of a receive; `root` is the endpoint-level extension bag
    pub fn new(message: IncomingEnvelope, pipelines: Arc<Pipelines>, root: &ContextBag) -> Self {
        let extensions = root.child();
        let message = Arc::new(message);
        extensions.set_arc(Arc::clone(&message));
        Self {
            base: BehaviorContext::new(pipelines, extensions),
            message,
            outcome: ProcessingOutcome::Pending,
        }
    }
}

impl StageContext for TransportReceiveContext {
    const STAGE: Stage = Stage::TransportReceive;

    fn behavior_context(&self) -> &BehaviorContext {
        &self.base
    }

    fn chain(pipelines: &Pipelines) -> &Chain<Self> {
        pipelines.transport_receive()
    }
}

/// Envelope inside the delivery consistency scope; mutators may rewrite it
#[derive(Debug)]
pub struct IncomingPhysicalContext {
    base: BehaviorContext,
    pub message: IncomingEnvelope,
    pub started_at: DateTime<Utc>,
}

impl IncomingPhysicalContext {
    pub fn new(parent: &BehaviorContext, message: IncomingEnvelope) -> Self {
        Self {
            base: parent.child(),
            message,
            started_at: Utc::now(),
        }
    }
}

impl StageContext for IncomingPhysicalContext {
    const STAGE: Stage = Stage::IncomingPhysical;

    fn behavior_context(&self) -> &BehaviorContext {
        &self.base
    }

    fn chain(pipelines: &Pipelines) -> &Chain<Self> {
        pipelines.incoming_physical()
    }
}

/// One deserialized message of an envelope
#[derive(Debug)]
pub struct IncomingLogicalContext {
    base: BehaviorContext,
    pub message_id: String,
    pub headers: Headers,
    pub message: LogicalMessage,
    /// Set once at least one handler ran for this message
    pub message_handled: bool,
}

impl IncomingLogicalContext {
    pub fn new(
        parent: &BehaviorContext,
        message_id: impl Into<String>,
        headers: Headers,
        message: LogicalMessage,
    ) -> Self {
        Self {
            base: parent.child(),
            message_id: message_id.into(),
            headers,
            message,
            message_handled: false,
        }
    }
}

impl StageContext for IncomingLogicalContext {
    const STAGE: Stage = Stage::IncomingLogical;

    fn behavior_context(&self) -> &BehaviorContext {
        &self.base
    }

    fn chain(pipelines: &Pipelines) -> &Chain<Self> {
        pipelines.incoming_logical()
    }
}

/// One handler invocation for one logical message
pub struct InvokeHandlerContext {
    base: BehaviorContext,
    pub message_id: String,
    pub headers: Headers,
    pub message: LogicalMessage,
    pub handler: Arc<dyn MessageHandler>,
    /// Set by a handler to skip the remaining handlers of this message
    pub handler_invocation_aborted: bool,
}

impl InvokeHandlerContext {
    pub fn new(
        parent: &BehaviorContext,
        message_id: impl Into<String>,
        headers: Headers,
        message: LogicalMessage,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            base: parent.child(),
            message_id: message_id.into(),
            headers,
            message,
            handler,
            handler_invocation_aborted: false,
        }
    }
}

impl std::fmt::Debug for InvokeHandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeHandlerContext")
            .field("message_id", &self.message_id)
            .field("message", &self.message)
            .field("handler", &self.handler.handler_type())
            .field("handler_invocation_aborted", &self.handler_invocation_aborted)
            .finish()
    }
}

impl StageContext for InvokeHandlerContext {
    const STAGE: Stage = Stage::InvokeHandler;

    fn behavior_context(&self) -> &BehaviorContext {
        &self.base
    }

    fn chain(pipelines: &Pipelines) -> &Chain<Self> {
        pipelines.invoke_handler()
    }
}

/// A send, publish or reply issued by application code
#[derive(Debug)]
pub struct OutgoingLogicalContext {
    base: BehaviorContext,
    pub message_id: String,
    pub message: LogicalMessage,
    pub headers: Headers,
    pub intent: MessageIntent,
    /// Explicit destination requested by the sender, bypassing the routing table
    pub requested_destination: Option<String>,
    /// Filled in by routing
    pub destination: Option<AddressTag>,
    /// Dispatch right away instead of joining the incoming message's outbox record
    pub immediate_dispatch: bool,
}

impl OutgoingLogicalContext {
    pub fn new(
        parent: &BehaviorContext,
        message_id: impl Into<String>,
        message: LogicalMessage,
        intent: MessageIntent,
    ) -> Self {
        Self {
            base: parent.child(),
            message_id: message_id.into(),
            message,
            headers: Headers::new(),
            intent,
            requested_destination: None,
            destination: None,
            immediate_dispatch: false,
        }
    }
}

impl StageContext for OutgoingLogicalContext {
    const STAGE: Stage = Stage::OutgoingLogical;

    fn behavior_context(&self) -> &BehaviorContext {
        &self.base
    }

    fn chain(pipelines: &Pipelines) -> &Chain<Self> {
        pipelines.outgoing_logical()
    }
}

/// The serialized form of an outgoing message
#[derive(Debug)]
pub struct OutgoingPhysicalContext {
    base: BehaviorContext,
    pub message_id: String,
    pub message_type: &'static str,
    pub intent: MessageIntent,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub destination: AddressTag,
    pub immediate_dispatch: bool,
}

impl OutgoingPhysicalContext {
    pub fn new(
        parent: &BehaviorContext,
        message_id: impl Into<String>,
        message_type: &'static str,
        intent: MessageIntent,
        destination: AddressTag,
        body: Vec<u8>,
    ) -> Self {
        Self {
            base: parent.child(),
            message_id: message_id.into(),
            message_type,
            intent,
            headers: Headers::new(),
            body,
            destination,
            immediate_dispatch: false,
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// The operation this context describes
    pub fn to_operation(&self) -> TransportOperation {
        TransportOperation::new(
            self.message_id.clone(),
            self.destination.clone(),
            self.headers.clone(),
            self.body.clone(),
        )
    }
}

impl StageContext for OutgoingPhysicalContext {
    const STAGE: Stage = Stage::OutgoingPhysical;

    fn behavior_context(&self) -> &BehaviorContext {
        &self.base
    }

    fn chain(pipelines: &Pipelines) -> &Chain<Self> {
        pipelines.outgoing_physical()
    }
}

/// Operations handed to the transport
#[derive(Debug)]
pub struct DispatchContext {
    base: BehaviorContext,
    pub operations: Vec<TransportOperation>,
}

impl DispatchContext {
    pub fn new(parent: &BehaviorContext, operations: Vec<TransportOperation>) -> Self {
        Self {
            base: parent.child(),
            operations,
        }
    }
}

impl StageContext for DispatchContext {
    const STAGE: Stage = Stage::Dispatch;

    fn behavior_context(&self) -> &BehaviorContext {
        &self.base
    }

    fn chain(pipelines: &Pipelines) -> &Chain<Self> {
        pipelines.dispatch()
    }
}
