use thiserror::Error;

use crate::config::ConfigurationError;
use crate::pipeline::{PipelineConfigurationError, ProcessingError};

/// Top-level error of the crate
#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Pipeline configuration error: {0}")]
    Pipeline(#[from] PipelineConfigurationError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),
}

impl CourierError {
    /// Startup failures that no amount of redelivery can fix
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Pipeline(_))
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;
