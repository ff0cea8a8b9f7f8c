use std::sync::Arc;

use async_trait::async_trait;

use crate::constants::well_known_steps;
use crate::context::IncomingPhysicalContext;
use crate::message::IncomingEnvelope;
use crate::pipeline::{
    Behavior, HandlerError, Next, ProcessingError, ProcessingResult, StageContext,
};

/// Application hook run on every incoming envelope before deserialization
#[async_trait]
pub trait MutateIncomingTransportMessage: Send + Sync + 'static {
    async fn mutate_incoming(&self, message: &mut IncomingEnvelope) -> Result<(), HandlerError>;
}

pub struct MutateIncomingTransportMessageBehavior {
    mutators: Vec<Arc<dyn MutateIncomingTransportMessage>>,
}

impl MutateIncomingTransportMessageBehavior {
    pub fn new(mutators: Vec<Arc<dyn MutateIncomingTransportMessage>>) -> Self {
        Self { mutators }
    }
}

#[async_trait]
impl Behavior<IncomingPhysicalContext> for MutateIncomingTransportMessageBehavior {
    async fn invoke(
        &self,
        context: &mut IncomingPhysicalContext,
        next: Next<'_, IncomingPhysicalContext>,
    ) -> ProcessingResult<()> {
        for mutator in &self.mutators {
            mutator
                .mutate_incoming(&mut context.message)
                .await
                .map_err(|source| {
                    ProcessingError::behavior(well_known_steps::MUTATE_INCOMING_TRANSPORT_MESSAGE, source)
                })?;
        }
        if !self.mutators.is_empty() {
            // Downstream stages and outgoing sends read the envelope from the bag
            context
                .behavior_context()
                .extensions()
                .set(context.message.clone());
        }
        next.run(context).await
    }
}
