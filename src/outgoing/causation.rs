use async_trait::async_trait;
use uuid::Uuid;

use crate::constants::headers;
use crate::context::OutgoingPhysicalContext;
use crate::pipeline::{Behavior, Next, ProcessingResult, StageContext};

/// Stamps conversation and related-to headers on every outgoing message
///
/// The conversation id is inherited from the incoming message being processed
/// when it carries one, and freshly generated otherwise. Related-to is set only
/// when there is an incoming message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachCausationHeadersBehavior;

impl AttachCausationHeadersBehavior {
    fn apply(context: &mut OutgoingPhysicalContext) {
        let mut conversation_id = None;

        if let Some(incoming) = context.behavior_context().incoming_message() {
            context
                .headers
                .insert(headers::RELATED_TO.to_string(), incoming.message_id.clone());
            conversation_id = incoming
                .header(headers::CONVERSATION_ID)
                .map(str::to_string);
        }

        let conversation_id = conversation_id.unwrap_or_else(|| Uuid::now_v7().to_string());
        context
            .headers
            .insert(headers::CONVERSATION_ID.to_string(), conversation_id);
    }
}

#[async_trait]
impl Behavior<OutgoingPhysicalContext> for AttachCausationHeadersBehavior {
    async fn invoke(
        &self,
        context: &mut OutgoingPhysicalContext,
        next: Next<'_, OutgoingPhysicalContext>,
    ) -> ProcessingResult<()> {
        Self::apply(context);
        next.run(context).await
    }
}
