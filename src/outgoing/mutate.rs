use std::sync::Arc;

use async_trait::async_trait;

use crate::constants::well_known_steps;
use crate::context::OutgoingPhysicalContext;
use crate::message::{Headers, MessageIntent};
use crate::pipeline::{Behavior, HandlerError, Next, ProcessingError, ProcessingResult};

/// The parts of an outgoing physical message a mutator may rewrite
#[derive(Debug)]
pub struct OutgoingTransportMessage<'a> {
    pub message_id: &'a str,
    pub message_type: &'static str,
    pub intent: MessageIntent,
    pub headers: &'a mut Headers,
    pub body: &'a mut Vec<u8>,
}

/// Application hook run on every outgoing physical message
#[async_trait]
pub trait MutateOutgoingTransportMessage: Send + Sync + 'static {
    async fn mutate_outgoing(
        &self,
        message: &mut OutgoingTransportMessage<'_>,
    ) -> Result<(), HandlerError>;
}

pub struct MutateOutgoingTransportMessageBehavior {
    mutators: Vec<Arc<dyn MutateOutgoingTransportMessage>>,
}

impl MutateOutgoingTransportMessageBehavior {
    pub fn new(mutators: Vec<Arc<dyn MutateOutgoingTransportMessage>>) -> Self {
        Self { mutators }
    }
}

#[async_trait]
impl Behavior<OutgoingPhysicalContext> for MutateOutgoingTransportMessageBehavior {
    async fn invoke(
        &self,
        context: &mut OutgoingPhysicalContext,
        next: Next<'_, OutgoingPhysicalContext>,
    ) -> ProcessingResult<()> {
        for mutator in &self.mutators {
            let mut message = OutgoingTransportMessage {
                message_id: &context.message_id,
                message_type: context.message_type,
                intent: context.intent,
                headers: &mut context.headers,
                body: &mut context.body,
            };
            mutator
                .mutate_outgoing(&mut message)
                .await
                .map_err(|source| {
                    ProcessingError::behavior(well_known_steps::MUTATE_OUTGOING_TRANSPORT_MESSAGE, source)
                })?;
        }
        next.run(context).await
    }
}
