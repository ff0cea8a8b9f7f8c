//! Assembled chains, one per stage.

use std::fmt;
use std::sync::Arc;

use super::behavior::{Behavior, Next, StageContext, Terminal};
use super::errors::ProcessingResult;
use super::step::StepKind;
use super::Stage;
use crate::context::{
    DispatchContext, IncomingLogicalContext, IncomingPhysicalContext, InvokeHandlerContext,
    OutgoingLogicalContext, OutgoingPhysicalContext, TransportReceiveContext,
};

/// A built behavior together with the step that produced it
pub struct BehaviorInstance<C: StageContext> {
    step_id: String,
    kind: StepKind,
    behavior: Arc<dyn Behavior<C>>,
}

impl<C: StageContext> BehaviorInstance<C> {
    pub(crate) fn new(step_id: String, kind: StepKind, behavior: Arc<dyn Behavior<C>>) -> Self {
        Self {
            step_id,
            kind,
            behavior,
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub(crate) fn behavior(&self) -> &dyn Behavior<C> {
        self.behavior.as_ref()
    }
}

/// Ordered behaviors of one stage followed by the stage terminal
pub struct Chain<C: StageContext> {
    behaviors: Vec<BehaviorInstance<C>>,
    terminal: Arc<dyn Terminal<C>>,
}

impl<C: StageContext> Chain<C> {
    pub(crate) fn new(behaviors: Vec<BehaviorInstance<C>>, terminal: Arc<dyn Terminal<C>>) -> Self {
        Self {
            behaviors,
            terminal,
        }
    }

    /// Run every behavior of the chain against `context`
    pub async fn invoke(&self, context: &mut C) -> ProcessingResult<()> {
        Next::new(&self.behaviors, self.terminal.as_ref())
            .run(context)
            .await
    }

    /// Step ids in execution order
    pub fn step_ids(&self) -> Vec<&str> {
        self.behaviors.iter().map(BehaviorInstance::step_id).collect()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

impl<C: StageContext> fmt::Debug for Chain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("stage", &C::STAGE)
            .field("steps", &self.step_ids())
            .finish()
    }
}

/// Every assembled chain of an endpoint
///
/// Immutable once built; shared by all concurrently processed envelopes.
#[derive(Debug)]
pub struct Pipelines {
    pub(crate) transport_receive: Chain<TransportReceiveContext>,
    pub(crate) incoming_physical: Chain<IncomingPhysicalContext>,
    pub(crate) incoming_logical: Chain<IncomingLogicalContext>,
    pub(crate) invoke_handler: Chain<InvokeHandlerContext>,
    pub(crate) outgoing_logical: Chain<OutgoingLogicalContext>,
    pub(crate) outgoing_physical: Chain<OutgoingPhysicalContext>,
    pub(crate) dispatch: Chain<DispatchContext>,
}

impl Pipelines {
    pub fn transport_receive(&self) -> &Chain<TransportReceiveContext> {
        &self.transport_receive
    }

    pub fn incoming_physical(&self) -> &Chain<IncomingPhysicalContext> {
        &self.incoming_physical
    }

    pub fn incoming_logical(&self) -> &Chain<IncomingLogicalContext> {
        &self.incoming_logical
    }

    pub fn invoke_handler(&self) -> &Chain<InvokeHandlerContext> {
        &self.invoke_handler
    }

    pub fn outgoing_logical(&self) -> &Chain<OutgoingLogicalContext> {
        &self.outgoing_logical
    }

    pub fn outgoing_physical(&self) -> &Chain<OutgoingPhysicalContext> {
        &self.outgoing_physical
    }

    pub fn dispatch(&self) -> &Chain<DispatchContext> {
        &self.dispatch
    }

    /// Step ids of the chain for `stage`, in execution order
    pub fn step_ids(&self, stage: Stage) -> Vec<&str> {
        match stage {
            Stage::TransportReceive => self.transport_receive.step_ids(),
            Stage::IncomingPhysical => self.incoming_physical.step_ids(),
            Stage::IncomingLogical => self.incoming_logical.step_ids(),
            Stage::InvokeHandler => self.invoke_handler.step_ids(),
            Stage::OutgoingLogical => self.outgoing_logical.step_ids(),
            Stage::OutgoingPhysical => self.outgoing_physical.step_ids(),
            Stage::Dispatch => self.dispatch.step_ids(),
        }
    }
}
