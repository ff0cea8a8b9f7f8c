use std::sync::Arc;

use async_trait::async_trait;

use crate::constants::headers;
use crate::context::OutgoingLogicalContext;
use crate::message::{AddressTag, MessageIntent};
use crate::pipeline::{Behavior, Next, ProcessingError, ProcessingResult, StageContext};
use crate::routing::UnicastRoutingTable;

/// Resolves the destination of an outgoing logical message
///
/// Sends use the explicit destination or the routing table, publishes are
/// multicast by message type, and replies go to the incoming reply-to address
/// with the correlation id set to the incoming message id.
pub struct UnicastRoutingBehavior {
    routing: Arc<UnicastRoutingTable>,
}

impl UnicastRoutingBehavior {
    pub fn new(routing: Arc<UnicastRoutingTable>) -> Self {
        Self { routing }
    }

    fn route(&self, context: &mut OutgoingLogicalContext) -> ProcessingResult<AddressTag> {
        let message_type = context.message.message_type();
        match context.intent {
            MessageIntent::Publish => Ok(AddressTag::multicast(message_type)),
            MessageIntent::Send => context
                .requested_destination
                .clone()
                .or_else(|| {
                    self.routing
                        .destination_for(message_type)
                        .map(str::to_string)
                })
                .map(AddressTag::unicast)
                .ok_or_else(|| ProcessingError::no_route(message_type)),
            MessageIntent::Reply => {
                let incoming = context.behavior_context().incoming_message();
                if let Some(incoming) = &incoming {
                    context
                        .headers
                        .insert(headers::CORRELATION_ID.to_string(), incoming.message_id.clone());
                }
                context
                    .requested_destination
                    .clone()
                    .or_else(|| {
                        incoming
                            .as_ref()
                            .and_then(|incoming| incoming.header(headers::REPLY_TO_ADDRESS))
                            .map(str::to_string)
                    })
                    .map(AddressTag::unicast)
                    .ok_or_else(|| ProcessingError::NoReplyAddress {
                        message_type: message_type.to_string(),
                    })
            }
        }
    }
}

#[async_trait]
impl Behavior<OutgoingLogicalContext> for UnicastRoutingBehavior {
    async fn invoke(
        &self,
        context: &mut OutgoingLogicalContext,
        next: Next<'_, OutgoingLogicalContext>,
    ) -> ProcessingResult<()> {
        let destination = self.route(context)?;
        tracing::trace!(
            message_id = %context.message_id,
            destination = %destination,
            "routed outgoing message"
        );
        context.destination = Some(destination);
        next.run(context).await
    }
}
