//! # Pipeline Engine
//!
//! Step declarations, dependency resolution, behavior chains and the
//! connectors that link one stage's chain to the next.
//!
//! ## Core Components
//!
//! - [`RegisterStep`] / [`ReplaceStep`]: declarative step registrations with
//!   before/after constraints
//! - [`PipelineSettings`]: the mutable registration set of an endpoint
//! - [`resolve_order`]: deterministic ordering of one stage's steps
//! - [`PipelineAssembler`]: builds the immutable [`Pipelines`]
//! - [`Behavior`], [`Next`], [`StageConnector`]: the execution model

pub mod assembler;
pub mod behavior;
pub mod chain;
pub mod errors;
pub mod graph;
pub mod settings;
mod stage;
pub mod step;

pub use assembler::PipelineAssembler;
pub use behavior::{
    Behavior, CompletedTerminal, Next, StageConnector, StageContext, StageInvoker, Terminal,
};
pub use chain::{BehaviorInstance, Chain, Pipelines};
pub use errors::{HandlerError, PipelineConfigurationError, ProcessingError, ProcessingResult};
pub use graph::{resolve_order, GraphNode};
pub use settings::PipelineSettings;
pub use stage::Stage;
pub use step::{Dependency, DependencyDirection, RegisterStep, ReplaceStep, StepKind};
