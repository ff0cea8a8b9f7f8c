//! # Structured Logging Module
//!
//! Console logging through the tracing ecosystem. The subscriber is installed
//! once per process; a pre-existing global subscriber (for example one set by a
//! host application or a test harness) is left in place.
//!
//! `RUST_LOG` overrides the configured level when present.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging from configuration
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(&config.level);

        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(config.with_target)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(config.with_target)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed(),
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            "Structured logging initialized"
        );
    });
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Log a pipeline event with a step id and stage
#[macro_export]
macro_rules! log_pipeline {
    ($level:ident, $operation:expr, step_id: $step_id:expr, stage: $stage:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            step_id = %$step_id,
            stage = %$stage,
            $($key = ?$value,)*
            "PIPELINE_{}", $operation
        );
    };
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            "PIPELINE_{}", $operation
        );
    };
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            "PIPELINE_{}", $operation
        );
    };
}

/// Log an outbox event keyed by incoming message id
#[macro_export]
macro_rules! log_outbox {
    ($level:ident, $operation:expr, message_id: $message_id:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            message_id = %$message_id,
            $($key = ?$value,)*
            "OUTBOX_{} (message_id: {})", $operation, $message_id
        );
    };
    ($level:ident, $operation:expr, message_id: $message_id:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            message_id = %$message_id,
            "OUTBOX_{} (message_id: {})", $operation, $message_id
        );
    };
}

/// Log a configuration event
#[macro_export]
macro_rules! log_config {
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            "CONFIG_{}", $operation
        );
    };
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            "CONFIG_{}", $operation
        );
    };
}
