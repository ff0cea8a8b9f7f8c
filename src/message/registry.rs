//! Message metadata registry
//!
//! Populated at startup from the closed set of message types the endpoint
//! knows about, then shared read-only.

use std::any::TypeId;
use std::collections::HashMap;

use super::{Message, MessageMetadata};

#[derive(Debug, Clone, Default)]
pub struct MessageMetadataRegistry {
    by_token: HashMap<&'static str, MessageMetadata>,
    by_type: HashMap<TypeId, MessageMetadata>,
}

impl MessageMetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type; registering the same type twice is a no-op
    pub fn register<M: Message>(&mut self) -> &mut Self {
        let metadata = MessageMetadata::of::<M>();
        self.by_type
            .entry(metadata.type_id())
            .or_insert_with(|| metadata.clone());
        self.by_token.entry(metadata.message_type()).or_insert(metadata);
        self
    }

    /// Resolve a wire type token
    ///
    /// Matches the token exactly first, then the portion before the first
    /// comma so that assembly-qualified tokens such as
    /// `Sales.OrderPlaced, Sales.Messages, Version=1.0.0` resolve as well.
    pub fn resolve(&self, type_token: &str) -> Option<MessageMetadata> {
        let token = type_token.trim();
        if let Some(metadata) = self.by_token.get(token) {
            return Some(metadata.clone());
        }

        let (short_name, _) = token.split_once(',')?;
        self.by_token.get(short_name.trim()).cloned()
    }

    pub fn metadata_for<M: Message>(&self) -> Option<&MessageMetadata> {
        self.by_type.get(&TypeId::of::<M>())
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
