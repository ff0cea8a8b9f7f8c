use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::constants::{
    headers, LEGACY_IMPL_TYPE_MARKER, LEGACY_SCHEDULED_TASK_TOKEN_PREFIX,
    SCHEDULED_TASK_MESSAGE_TYPE,
};
use crate::context::{IncomingLogicalContext, IncomingPhysicalContext};
use crate::message::{IncomingEnvelope, LogicalMessage, MessageMetadata, MessageMetadataRegistry};
use crate::pipeline::{
    ProcessingError, ProcessingResult, StageConnector, StageContext, StageInvoker,
};
use crate::serialization::{SerializationError, SerializerResolver};

/// Splits a physical envelope into its logical messages
///
/// Messages run through the incoming logical chain one after another, in the
/// order the enclosed types header lists them.
pub struct DeserializeLogicalMessagesConnector {
    registry: Arc<MessageMetadataRegistry>,
    serializers: Arc<SerializerResolver>,
    skip_unknown: bool,
}

impl DeserializeLogicalMessagesConnector {
    pub fn new(
        registry: Arc<MessageMetadataRegistry>,
        serializers: Arc<SerializerResolver>,
        skip_unknown: bool,
    ) -> Self {
        Self {
            registry,
            serializers,
            skip_unknown,
        }
    }

    /// Metadata for every resolvable token of the enclosed types header
    fn resolve_types(
        &self,
        envelope: &IncomingEnvelope,
    ) -> Result<Vec<MessageMetadata>, SerializationError> {
        let Some(header) = envelope.header(headers::ENCLOSED_MESSAGE_TYPES) else {
            return Ok(Vec::new());
        };

        let mut resolved = Vec::new();
        for token in header
            .split(headers::ENCLOSED_MESSAGE_TYPES_SEPARATOR)
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            if token.contains(LEGACY_IMPL_TYPE_MARKER) {
                debug!(message_id = %envelope.message_id, type_token = %token, "skipping legacy type token");
                continue;
            }
            let metadata = if token.starts_with(LEGACY_SCHEDULED_TASK_TOKEN_PREFIX) {
                self.registry.resolve(SCHEDULED_TASK_MESSAGE_TYPE)
            } else {
                self.registry.resolve(token)
            };
            match metadata {
                Some(metadata) => resolved.push(metadata),
                None if self.skip_unknown => {
                    warn!(
                        message_id = %envelope.message_id,
                        type_token = %token,
                        "skipping unknown message type"
                    );
                }
                None => return Err(SerializationError::unknown_message_type(token)),
            }
        }
        Ok(resolved)
    }

    fn extract(&self, envelope: &mut IncomingEnvelope) -> ProcessingResult<Vec<LogicalMessage>> {
        let message_id = envelope.message_id.clone();
        let types = self
            .resolve_types(envelope)
            .map_err(|err| ProcessingError::deserialization(&message_id, err))?;

        if types.is_empty() && expects_resolved_types(envelope) {
            warn!(
                message_id = %message_id,
                enclosed_types = ?envelope.header(headers::ENCLOSED_MESSAGE_TYPES),
                "could not determine message type from the enclosed types header"
            );
        }

        let serializer = self
            .serializers
            .resolve(envelope.header(headers::CONTENT_TYPE))
            .map_err(|err| ProcessingError::deserialization(&message_id, err))?;
        envelope.headers.insert(
            headers::CONTENT_TYPE.to_string(),
            serializer.content_type().to_string(),
        );

        serializer
            .deserialize(&envelope.body, &types)
            .map_err(|err| ProcessingError::deserialization(&message_id, err))
    }
}

/// A header that resolved to nothing is suspicious unless the message was published
fn expects_resolved_types(envelope: &IncomingEnvelope) -> bool {
    envelope.header(headers::ENCLOSED_MESSAGE_TYPES).is_some() && !envelope.is_broadcast()
}

#[async_trait]
impl StageConnector<IncomingPhysicalContext, IncomingLogicalContext>
    for DeserializeLogicalMessagesConnector
{
    async fn invoke(
        &self,
        context: &mut IncomingPhysicalContext,
        stage: StageInvoker<'_, IncomingLogicalContext>,
    ) -> ProcessingResult<()> {
        if context.message.has_empty_body() {
            debug!(message_id = %context.message.message_id, "empty body, no logical messages");
            return Ok(());
        }

        let messages = self.extract(&mut context.message)?;
        for message in messages {
            let mut logical = IncomingLogicalContext::new(
                context.behavior_context(),
                context.message.message_id.clone(),
                context.message.headers.clone(),
                message,
            );
            stage.invoke(&mut logical).await?;
        }
        Ok(())
    }
}
