//! # Behaviors and Continuations
//!
//! A behavior receives the stage context together with a [`Next`] continuation
//! representing the rest of its chain. `Next` is consumed by [`Next::run`], so
//! a behavior can run the remainder of the chain at most once; not calling it
//! short-circuits the chain.
//!
//! A [`StageConnector`] terminates one chain and re-enters the chain of the
//! following stage through a [`StageInvoker`], which may be used any number of
//! times (once per logical message, once per handler).

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::chain::{BehaviorInstance, Chain, Pipelines};
use super::errors::ProcessingResult;
use super::Stage;
use crate::context::BehaviorContext;

/// A context type owned by exactly one stage
pub trait StageContext: Send + 'static {
    const STAGE: Stage;

    fn behavior_context(&self) -> &BehaviorContext;

    /// The assembled chain that processes this context type
    fn chain(pipelines: &Pipelines) -> &Chain<Self>
    where
        Self: Sized;
}

/// One step of a chain
#[async_trait]
pub trait Behavior<C: StageContext>: Send + Sync + 'static {
    async fn invoke(&self, context: &mut C, next: Next<'_, C>) -> ProcessingResult<()>;
}

/// What runs after the last behavior of a chain
#[async_trait]
pub trait Terminal<C: StageContext>: Send + Sync + 'static {
    async fn terminate(&self, context: &mut C) -> ProcessingResult<()>;
}

/// Terminal that completes immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletedTerminal;

#[async_trait]
impl<C: StageContext> Terminal<C> for CompletedTerminal {
    async fn terminate(&self, _context: &mut C) -> ProcessingResult<()> {
        Ok(())
    }
}

/// The remainder of a chain after the current behavior
pub struct Next<'a, C: StageContext> {
    remaining: &'a [BehaviorInstance<C>],
    terminal: &'a dyn Terminal<C>,
}

impl<'a, C: StageContext> Next<'a, C> {
    pub(crate) fn new(remaining: &'a [BehaviorInstance<C>], terminal: &'a dyn Terminal<C>) -> Self {
        Self {
            remaining,
            terminal,
        }
    }

    /// Run the rest of the chain
    pub async fn run(self, context: &mut C) -> ProcessingResult<()> {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                trace!(step_id = %current.step_id(), stage = %C::STAGE, "invoking behavior");
                let next = Next::new(rest, self.terminal);
                current.behavior().invoke(context, next).await
            }
            None => self.terminal.terminate(context).await,
        }
    }

    /// Number of behaviors still ahead, not counting the terminal
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

/// Bridges the chain of stage `A` into the chain of stage `B`
#[async_trait]
pub trait StageConnector<A: StageContext, B: StageContext>: Send + Sync + 'static {
    async fn invoke(&self, context: &mut A, stage: StageInvoker<'_, B>) -> ProcessingResult<()>;
}

/// Handle for running the next stage's chain from inside a connector
pub struct StageInvoker<'a, B: StageContext> {
    chain: &'a Chain<B>,
}

impl<B: StageContext> Clone for StageInvoker<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: StageContext> Copy for StageInvoker<'_, B> {}

impl<'a, B: StageContext> StageInvoker<'a, B> {
    pub(crate) fn new(chain: &'a Chain<B>) -> Self {
        Self { chain }
    }

    pub async fn invoke(&self, context: &mut B) -> ProcessingResult<()> {
        self.chain.invoke(context).await
    }

    pub fn stage(&self) -> Stage {
        B::STAGE
    }
}

/// Adapts a connector into a terminating behavior of its source stage
pub(crate) struct ConnectorBehavior<A, B, T> {
    connector: T,
    _stages: PhantomData<fn(A) -> B>,
}

impl<A, B, T> ConnectorBehavior<A, B, T> {
    pub(crate) fn new(connector: T) -> Self {
        Self {
            connector,
            _stages: PhantomData,
        }
    }
}

#[async_trait]
impl<A, B, T> Behavior<A> for ConnectorBehavior<A, B, T>
where
    A: StageContext,
    B: StageContext,
    T: StageConnector<A, B>,
{
    async fn invoke(&self, context: &mut A, _next: Next<'_, A>) -> ProcessingResult<()> {
        let pipelines = Arc::clone(context.behavior_context().pipelines());
        let stage = StageInvoker::new(B::chain(&pipelines));
        self.connector.invoke(context, stage).await
    }
}

/// Type-erased output of a step factory, downcast during assembly
pub(crate) struct BehaviorSlot<C: StageContext> {
    pub(crate) behavior: Arc<dyn Behavior<C>>,
}

impl<C: StageContext> BehaviorSlot<C> {
    pub(crate) fn new(behavior: Arc<dyn Behavior<C>>) -> Self {
        Self { behavior }
    }
}

/// Type-erased chain terminal, downcast during assembly
pub(crate) struct TerminalSlot<C: StageContext> {
    pub(crate) terminal: Arc<dyn Terminal<C>>,
}
