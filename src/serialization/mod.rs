//! # Message Serialization
//!
//! Converts between message bodies and typed logical messages. Serializers are
//! selected by the content type header of the envelope; the endpoint's default
//! serializer handles envelopes without one.

mod json;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::message::{LogicalMessage, MessageMetadata};

pub use json::JsonMessageSerializer;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Message type '{type_token}' is not registered with this endpoint")]
    UnknownMessageType { type_token: String },

    #[error("No serializer is registered for content type '{content_type}'")]
    UnsupportedContentType { content_type: String },

    #[error("Body contains {actual} messages but {expected} message types are enclosed")]
    MessageCountMismatch { expected: usize, actual: usize },

    #[error("Message '{message_type}' does not hold a value of its declared type")]
    InstanceTypeMismatch { message_type: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerializationError {
    pub fn unknown_message_type(type_token: impl Into<String>) -> Self {
        Self::UnknownMessageType {
            type_token: type_token.into(),
        }
    }
}

/// Body codec for one content type
pub trait MessageSerializer: Send + Sync + 'static {
    /// Value written to the content type header
    fn content_type(&self) -> &str;

    fn serialize(&self, message: &LogicalMessage) -> Result<Vec<u8>, SerializationError>;

    /// Decode `body` into one logical message per entry of `message_types`, in order
    fn deserialize(
        &self,
        body: &[u8],
        message_types: &[MessageMetadata],
    ) -> Result<Vec<LogicalMessage>, SerializationError>;
}

/// Content type negotiation
#[derive(Clone)]
pub struct SerializerResolver {
    default: Arc<dyn MessageSerializer>,
    by_content_type: HashMap<String, Arc<dyn MessageSerializer>>,
}

impl SerializerResolver {
    pub fn new(default: Arc<dyn MessageSerializer>) -> Self {
        let mut by_content_type = HashMap::new();
        by_content_type.insert(default.content_type().to_string(), Arc::clone(&default));
        Self {
            default,
            by_content_type,
        }
    }

    /// Accept bodies of an additional content type
    pub fn add(&mut self, serializer: Arc<dyn MessageSerializer>) -> &mut Self {
        self.by_content_type
            .insert(serializer.content_type().to_string(), serializer);
        self
    }

    pub fn default_serializer(&self) -> &Arc<dyn MessageSerializer> {
        &self.default
    }

    /// Serializer for an envelope's content type header; absent means the default
    pub fn resolve(
        &self,
        content_type: Option<&str>,
    ) -> Result<Arc<dyn MessageSerializer>, SerializationError> {
        match content_type.map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(Arc::clone(&self.default)),
            Some(content_type) => self
                .by_content_type
                .get(content_type)
                .cloned()
                .ok_or_else(|| SerializationError::UnsupportedContentType {
                    content_type: content_type.to_string(),
                }),
        }
    }
}

impl Default for SerializerResolver {
    fn default() -> Self {
        Self::new(Arc::new(JsonMessageSerializer))
    }
}

impl std::fmt::Debug for SerializerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerResolver")
            .field("default", &self.default.content_type())
            .field("content_types", &self.by_content_type.keys().collect::<Vec<_>>())
            .finish()
    }
}
