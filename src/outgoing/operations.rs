//! # Message Operations
//!
//! Entry points for sending, publishing and replying. Each call builds an
//! outgoing logical context as a child of the caller's context and runs the
//! outgoing logical chain to completion.

use std::sync::Arc;

use uuid::Uuid;

use crate::context::{BehaviorContext, OutgoingLogicalContext};
use crate::message::{Headers, LogicalMessage, Message, MessageIntent};
use crate::pipeline::ProcessingResult;

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    destination: Option<String>,
    message_id: Option<String>,
    headers: Headers,
    immediate_dispatch: bool,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send to `destination` instead of the routed address
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Hand the message to the transport right away, outside the outbox record
    pub fn requires_immediate_dispatch(mut self) -> Self {
        self.immediate_dispatch = true;
        self
    }

    pub fn immediate_dispatch(&self) -> bool {
        self.immediate_dispatch
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    message_id: Option<String>,
    headers: Headers,
    immediate_dispatch: bool,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn requires_immediate_dispatch(mut self) -> Self {
        self.immediate_dispatch = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplyOptions {
    destination: Option<String>,
    message_id: Option<String>,
    headers: Headers,
}

impl ReplyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `destination` instead of the incoming reply-to address
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

pub struct MessageOperations;

impl MessageOperations {
    pub async fn send<M: Message>(
        parent: &BehaviorContext,
        message: M,
        options: SendOptions,
    ) -> ProcessingResult<String> {
        let mut context = OutgoingLogicalContext::new(
            parent,
            options.message_id.unwrap_or_else(new_message_id),
            LogicalMessage::new(message),
            MessageIntent::Send,
        );
        context.headers = options.headers;
        context.requested_destination = options.destination;
        context.immediate_dispatch = options.immediate_dispatch;
        Self::run(parent, context).await
    }

    pub async fn publish<M: Message>(
        parent: &BehaviorContext,
        message: M,
        options: PublishOptions,
    ) -> ProcessingResult<String> {
        let mut context = OutgoingLogicalContext::new(
            parent,
            options.message_id.unwrap_or_else(new_message_id),
            LogicalMessage::new(message),
            MessageIntent::Publish,
        );
        context.headers = options.headers;
        context.immediate_dispatch = options.immediate_dispatch;
        Self::run(parent, context).await
    }

    pub async fn reply<M: Message>(
        parent: &BehaviorContext,
        message: M,
        options: ReplyOptions,
    ) -> ProcessingResult<String> {
        let mut context = OutgoingLogicalContext::new(
            parent,
            options.message_id.unwrap_or_else(new_message_id),
            LogicalMessage::new(message),
            MessageIntent::Reply,
        );
        context.headers = options.headers;
        context.requested_destination = options.destination;
        Self::run(parent, context).await
    }

    async fn run(
        parent: &BehaviorContext,
        mut context: OutgoingLogicalContext,
    ) -> ProcessingResult<String> {
        let pipelines = Arc::clone(parent.pipelines());
        pipelines.outgoing_logical().invoke(&mut context).await?;
        Ok(context.message_id)
    }
}

/// Time-ordered identity for outgoing messages
fn new_message_id() -> String {
    Uuid::now_v7().to_string()
}
