use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::EndpointConfig;
use crate::constants::headers;
use crate::context::{OutgoingLogicalContext, OutgoingPhysicalContext};
use crate::pipeline::{
    ProcessingError, ProcessingResult, StageConnector, StageContext, StageInvoker,
};
use crate::serialization::MessageSerializer;

/// Serializes an outgoing logical message and stamps the standard headers
pub struct SerializeMessageConnector {
    serializer: Arc<dyn MessageSerializer>,
    endpoint_name: String,
    local_address: String,
}

impl SerializeMessageConnector {
    pub fn new(serializer: Arc<dyn MessageSerializer>, endpoint: &EndpointConfig) -> Self {
        Self {
            serializer,
            endpoint_name: endpoint.name.clone(),
            local_address: endpoint.local_address().to_string(),
        }
    }
}

#[async_trait]
impl StageConnector<OutgoingLogicalContext, OutgoingPhysicalContext> for SerializeMessageConnector {
    async fn invoke(
        &self,
        context: &mut OutgoingLogicalContext,
        stage: StageInvoker<'_, OutgoingPhysicalContext>,
    ) -> ProcessingResult<()> {
        let message_type = context.message.message_type();
        let destination = context
            .destination
            .clone()
            .ok_or_else(|| ProcessingError::no_route(message_type))?;

        let body = self
            .serializer
            .serialize(&context.message)
            .map_err(|source| ProcessingError::Serialization {
                message_id: context.message_id.clone(),
                source,
            })?;

        let mut physical = OutgoingPhysicalContext::new(
            context.behavior_context(),
            context.message_id.clone(),
            message_type,
            context.intent,
            destination,
            body,
        );
        physical.immediate_dispatch = context.immediate_dispatch;

        let mut outgoing_headers = context.headers.clone();
        outgoing_headers
            .entry(headers::REPLY_TO_ADDRESS.to_string())
            .or_insert_with(|| self.local_address.clone());
        outgoing_headers.insert(headers::MESSAGE_ID.to_string(), context.message_id.clone());
        outgoing_headers.insert(
            headers::ENCLOSED_MESSAGE_TYPES.to_string(),
            message_type.to_string(),
        );
        outgoing_headers.insert(
            headers::CONTENT_TYPE.to_string(),
            self.serializer.content_type().to_string(),
        );
        outgoing_headers.insert(
            headers::MESSAGE_INTENT.to_string(),
            context.intent.to_string(),
        );
        outgoing_headers.insert(
            headers::ORIGINATING_ENDPOINT.to_string(),
            self.endpoint_name.clone(),
        );
        outgoing_headers.insert(headers::TIME_SENT.to_string(), Utc::now().to_rfc3339());
        physical.headers = outgoing_headers;

        stage.invoke(&mut physical).await
    }
}
