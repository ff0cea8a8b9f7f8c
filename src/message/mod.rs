//! # Message Model
//!
//! Statically-known message types, the metadata registry that maps wire type
//! tokens to them, and the physical envelope and transport operation shapes
//! exchanged with the transport.

mod envelope;
mod registry;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use envelope::{AddressTag, Headers, IncomingEnvelope, MessageIntent, TransportOperation};
pub use registry::MessageMetadataRegistry;

/// A message type that can travel through the pipeline
///
/// `MESSAGE_TYPE` is the token written to the enclosed message types header
/// and looked up by [`MessageMetadataRegistry::resolve`].
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const MESSAGE_TYPE: &'static str;
}

type DecodeFn = fn(serde_json::Value) -> Result<Arc<dyn Any + Send + Sync>, serde_json::Error>;
type EncodeFn = fn(&(dyn Any + Send + Sync)) -> Option<Result<serde_json::Value, serde_json::Error>>;

/// Statically-resolved description of one message type
#[derive(Clone)]
pub struct MessageMetadata {
    message_type: &'static str,
    type_id: TypeId,
    rust_type: &'static str,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl MessageMetadata {
    /// Metadata for a concrete message type
    pub fn of<M: Message>() -> Self {
        Self {
            message_type: M::MESSAGE_TYPE,
            type_id: TypeId::of::<M>(),
            rust_type: std::any::type_name::<M>(),
            decode: |value| {
                serde_json::from_value::<M>(value).map(|m| Arc::new(m) as Arc<dyn Any + Send + Sync>)
            },
            encode: |instance| instance.downcast_ref::<M>().map(serde_json::to_value),
        }
    }

    /// Wire type token
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }

    pub(crate) fn decode_json(
        &self,
        value: serde_json::Value,
    ) -> Result<Arc<dyn Any + Send + Sync>, serde_json::Error> {
        (self.decode)(value)
    }

    pub(crate) fn encode_json(
        &self,
        instance: &(dyn Any + Send + Sync),
    ) -> Option<Result<serde_json::Value, serde_json::Error>> {
        (self.encode)(instance)
    }
}

impl fmt::Debug for MessageMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageMetadata")
            .field("message_type", &self.message_type)
            .field("rust_type", &self.rust_type)
            .finish()
    }
}

impl PartialEq for MessageMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for MessageMetadata {}

/// One typed payload together with its metadata
#[derive(Clone)]
pub struct LogicalMessage {
    metadata: MessageMetadata,
    instance: Arc<dyn Any + Send + Sync>,
}

impl LogicalMessage {
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            metadata: MessageMetadata::of::<M>(),
            instance: Arc::new(message),
        }
    }

    pub(crate) fn from_parts(metadata: MessageMetadata, instance: Arc<dyn Any + Send + Sync>) -> Self {
        Self { metadata, instance }
    }

    pub fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    pub fn message_type(&self) -> &'static str {
        self.metadata.message_type
    }

    pub fn instance(&self) -> &(dyn Any + Send + Sync) {
        self.instance.as_ref()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.instance.downcast_ref::<M>()
    }

    pub fn is<M: Message>(&self) -> bool {
        self.metadata.type_id == TypeId::of::<M>()
    }
}

impl fmt::Debug for LogicalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalMessage")
            .field("message_type", &self.metadata.message_type)
            .finish_non_exhaustive()
    }
}
