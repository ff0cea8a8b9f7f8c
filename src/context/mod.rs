//! # Stage Contexts
//!
//! Every stage processes its own context type. Each context carries a
//! [`BehaviorContext`] whose extension bag is a child of the bag of the context
//! that created it, so values set upstream (the incoming envelope, the outbox
//! transaction, the pending operation list) are visible downstream.

mod bag;
mod stages;

use std::sync::Arc;

pub use bag::ContextBag;
pub use stages::{
    DispatchContext, IncomingLogicalContext, IncomingPhysicalContext, InvokeHandlerContext,
    OutgoingLogicalContext, OutgoingPhysicalContext, ProcessingOutcome, TransportReceiveContext,
};

use crate::message::IncomingEnvelope;
use crate::pipeline::Pipelines;

/// State shared by every stage context
#[derive(Debug, Clone)]
pub struct BehaviorContext {
    extensions: ContextBag,
    pipelines: Arc<Pipelines>,
}

impl BehaviorContext {
    pub fn new(pipelines: Arc<Pipelines>, extensions: ContextBag) -> Self {
        Self {
            extensions,
            pipelines,
        }
    }

    /// Context for a downstream stage, with a child extension bag
    pub fn child(&self) -> Self {
        Self {
            extensions: self.extensions.child(),
            pipelines: Arc::clone(&self.pipelines),
        }
    }

    pub fn extensions(&self) -> &ContextBag {
        &self.extensions
    }

    pub fn pipelines(&self) -> &Arc<Pipelines> {
        &self.pipelines
    }

    /// The envelope currently being processed, if this path started from a receive
    pub fn incoming_message(&self) -> Option<Arc<IncomingEnvelope>> {
        self.extensions.get::<IncomingEnvelope>()
    }
}
