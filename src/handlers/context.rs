use std::sync::Arc;

use crate::constants::headers;
use crate::context::{BehaviorContext, ContextBag};
use crate::message::{Headers, Message};
use crate::outbox::OutboxTransaction;
use crate::outgoing::{MessageOperations, PublishOptions, ReplyOptions, SendOptions};
use crate::pipeline::ProcessingResult;

/// What a handler sees of the message it is handling
///
/// Messages sent from here inherit the causation of the handled message and,
/// inside a delivery consistency scope, are captured until the scope commits.
#[derive(Debug)]
pub struct MessageHandlerContext {
    base: BehaviorContext,
    message_id: String,
    headers: Headers,
    dispatch_aborted: bool,
}

impl MessageHandlerContext {
    pub fn new(base: BehaviorContext, message_id: impl Into<String>, headers: Headers) -> Self {
        Self {
            base,
            message_id: message_id.into(),
            headers,
            dispatch_aborted: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.headers.get(headers::CONVERSATION_ID).map(String::as_str)
    }

    pub fn reply_to_address(&self) -> Option<&str> {
        self.headers.get(headers::REPLY_TO_ADDRESS).map(String::as_str)
    }

    pub fn extensions(&self) -> &ContextBag {
        self.base.extensions()
    }

    /// Send `message` using the routing table; returns the outgoing message id
    pub async fn send<M: Message>(&self, message: M) -> ProcessingResult<String> {
        MessageOperations::send(&self.base, message, SendOptions::default()).await
    }

    pub async fn send_with<M: Message>(
        &self,
        message: M,
        options: SendOptions,
    ) -> ProcessingResult<String> {
        MessageOperations::send(&self.base, message, options).await
    }

    pub async fn publish<M: Message>(&self, message: M) -> ProcessingResult<String> {
        MessageOperations::publish(&self.base, message, PublishOptions::default()).await
    }

    pub async fn publish_with<M: Message>(
        &self,
        message: M,
        options: PublishOptions,
    ) -> ProcessingResult<String> {
        MessageOperations::publish(&self.base, message, options).await
    }

    /// Reply to the sender of the handled message
    pub async fn reply<M: Message>(&self, message: M) -> ProcessingResult<String> {
        MessageOperations::reply(&self.base, message, ReplyOptions::default()).await
    }

    pub async fn reply_with<M: Message>(
        &self,
        message: M,
        options: ReplyOptions,
    ) -> ProcessingResult<String> {
        MessageOperations::reply(&self.base, message, options).await
    }

    /// Skip the remaining handlers for the current logical message
    pub fn do_not_continue_dispatching_current_message(&mut self) {
        self.dispatch_aborted = true;
    }

    pub fn is_dispatch_aborted(&self) -> bool {
        self.dispatch_aborted
    }

    /// The open delivery consistency transaction, when an outbox is in use
    ///
    /// Business-state changes enlisted in it commit atomically with the
    /// outgoing messages of this handler.
    pub fn outbox_transaction(&self) -> Option<Arc<dyn OutboxTransaction>> {
        self.base
            .extensions()
            .get::<Arc<dyn OutboxTransaction>>()
            .map(|transaction| Arc::clone(&*transaction))
    }
}
