//! # Transport Abstraction
//!
//! The narrow interface the pipeline needs from a queueing technology:
//! receive one envelope, settle it, and dispatch outgoing operations.
//! Retry and dead-lettering of abandoned envelopes belong to the transport.

mod in_memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{IncomingEnvelope, TransportOperation};

pub use in_memory::InMemoryTransport;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Dispatch of message '{message_id}' to {destination} failed: {reason}")]
    DispatchFailed {
        message_id: String,
        destination: String,
        reason: String,
    },

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Message '{message_id}' is not in flight")]
    NotInFlight { message_id: String },
}

impl TransportError {
    pub fn dispatch_failed(operation: &TransportOperation, reason: impl Into<String>) -> Self {
        Self::DispatchFailed {
            message_id: operation.message_id.clone(),
            destination: operation.destination.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Next envelope, or `None` when the input queue is empty
    async fn receive(&self) -> Result<Option<IncomingEnvelope>, TransportError>;

    /// Acknowledge a processed envelope
    async fn complete(&self, message_id: &str) -> Result<(), TransportError>;

    /// Return an envelope for redelivery
    async fn abandon(&self, envelope: IncomingEnvelope) -> Result<(), TransportError>;

    /// Send one operation; resending an identical operation must be tolerated
    async fn dispatch(&self, operation: &TransportOperation) -> Result<(), TransportError>;
}
