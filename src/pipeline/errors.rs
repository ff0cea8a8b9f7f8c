//! # Pipeline Error Types
//!
//! Configuration errors are raised while declaring and assembling chains and
//! are fatal at startup. Processing errors are raised while a single envelope
//! flows through the chains and surface to the transport's redelivery.

use thiserror::Error;

use super::step::DependencyDirection;
use super::Stage;
use crate::outbox::StorageError;
use crate::serialization::SerializationError;
use crate::transport::TransportError;

/// Error type returned by application handlers and mutators
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Step registration and assembly failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineConfigurationError {
    #[error("Step registration with id '{step_id}' is already present in the pipeline")]
    DuplicateStep { step_id: String },

    #[error("Invalid step '{step_id}': {reason}")]
    InvalidStep { step_id: String, reason: String },

    #[error("Step '{step_id}' must be registered {direction} '{dependency}', but '{dependency}' is not registered in the {stage} pipeline")]
    MissingDependency {
        step_id: String,
        dependency: String,
        direction: DependencyDirection,
        stage: Stage,
    },

    #[error("Dependency cycle detected in the {stage} pipeline between steps: {}", .step_ids.join(", "))]
    DependencyCycle { stage: Stage, step_ids: Vec<String> },

    /// A custom context type declared the stage of another context type
    #[error("Step '{step_id}' is registered for the {expected} pipeline but its behavior was built for {actual}")]
    StageMismatch {
        step_id: String,
        expected: Stage,
        actual: String,
    },

    #[error("The {stage} pipeline has more than one terminating step: {}", .step_ids.join(", "))]
    MultipleTerminatingSteps { stage: Stage, step_ids: Vec<String> },

    #[error("Cannot replace step '{step_id}' because it is not registered")]
    UnknownReplaceTarget { step_id: String },

    #[error("Cannot replace step '{step_id}' registered for {registered} with a behavior for {replacement}")]
    ReplaceStageMismatch {
        step_id: String,
        registered: Stage,
        replacement: Stage,
    },
}

impl PipelineConfigurationError {
    pub fn duplicate_step(step_id: impl Into<String>) -> Self {
        Self::DuplicateStep {
            step_id: step_id.into(),
        }
    }

    pub fn invalid_step(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStep {
            step_id: step_id.into(),
            reason: reason.into(),
        }
    }

    pub fn dependency_cycle(stage: Stage, step_ids: Vec<String>) -> Self {
        Self::DependencyCycle { stage, step_ids }
    }

    /// Step ids named by this error, for startup diagnostics
    pub fn step_ids(&self) -> Vec<&str> {
        match self {
            Self::DuplicateStep { step_id }
            | Self::InvalidStep { step_id, .. }
            | Self::StageMismatch { step_id, .. }
            | Self::UnknownReplaceTarget { step_id }
            | Self::ReplaceStageMismatch { step_id, .. } => vec![step_id.as_str()],
            Self::MissingDependency {
                step_id, dependency, ..
            } => vec![step_id.as_str(), dependency.as_str()],
            Self::DependencyCycle { step_ids, .. }
            | Self::MultipleTerminatingSteps { step_ids, .. } => {
                step_ids.iter().map(String::as_str).collect()
            }
        }
    }
}

/// Per-envelope processing failures
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The envelope could not be turned into logical messages; nothing was dispatched
    #[error("Failed to deserialize message '{message_id}': {source}")]
    Deserialization {
        message_id: String,
        #[source]
        source: SerializationError,
    },

    #[error("No handlers could be found for message type '{message_type}'")]
    NoHandlers { message_type: String },

    #[error("Handler '{handler}' failed while handling '{message_type}': {source}")]
    Handler {
        handler: String,
        message_type: String,
        #[source]
        source: HandlerError,
    },

    #[error("Step '{step_id}' failed: {source}")]
    Behavior {
        step_id: String,
        #[source]
        source: HandlerError,
    },

    #[error("No destination could be found for message type '{message_type}'")]
    NoRoute { message_type: String },

    #[error("Cannot reply with '{message_type}': no incoming message with a reply-to address")]
    NoReplyAddress { message_type: String },

    #[error("Failed to serialize outgoing message '{message_id}': {source}")]
    Serialization {
        message_id: String,
        #[source]
        source: SerializationError,
    },

    /// Business state is committed but some captured operations were not sent
    #[error("Dispatch failed after commit for incoming message '{message_id}': {source}")]
    Dispatch {
        message_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Outbox storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ProcessingError {
    pub fn deserialization(message_id: impl Into<String>, source: SerializationError) -> Self {
        Self::Deserialization {
            message_id: message_id.into(),
            source,
        }
    }

    pub fn no_handlers(message_type: impl Into<String>) -> Self {
        Self::NoHandlers {
            message_type: message_type.into(),
        }
    }

    pub fn no_route(message_type: impl Into<String>) -> Self {
        Self::NoRoute {
            message_type: message_type.into(),
        }
    }

    pub fn behavior(step_id: impl Into<String>, source: impl Into<HandlerError>) -> Self {
        Self::Behavior {
            step_id: step_id.into(),
            source: source.into(),
        }
    }

    pub fn is_deserialization(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
    }

    /// True when handler effects are already committed and only dispatch must be retried
    pub fn is_post_commit(&self) -> bool {
        matches!(self, Self::Dispatch { .. })
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
