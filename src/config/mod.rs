//! # Courier Configuration
//!
//! Immutable endpoint configuration assembled once at startup and passed by
//! reference into the endpoint builder. Values are layered by [`ConfigLoader`]:
//! built-in defaults, then optional TOML files, then `COURIER__*` environment
//! variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! println!("endpoint: {}", config.endpoint.name);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Endpoint identity and addressing
    pub endpoint: EndpointConfig,

    /// Exactly-once delivery (outbox) settings
    pub outbox: OutboxConfig,

    /// Forwarding of processed messages to an audit queue
    pub audit: AuditConfig,

    /// Logical message extraction policy
    pub deserialization: DeserializationConfig,

    /// Unicast routes for outgoing sends
    pub routing: RoutingConfig,

    /// Structured logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Logical endpoint name, stamped as the originating endpoint on sends
    pub name: String,
    /// Input queue address; defaults to the endpoint name
    pub local_address: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "courier-endpoint".to_string(),
            local_address: None,
        }
    }
}

impl EndpointConfig {
    /// Address replies should be sent to
    pub fn local_address(&self) -> &str {
        self.local_address.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// When false, the delivery consistency manager runs as a pass-through
    /// even if an outbox storage is supplied
    pub enabled: bool,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Audit queue; auditing is disabled when absent
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeserializationConfig {
    /// Skip enclosed type tokens the registry cannot resolve instead of failing
    pub skip_unknown_message_types: bool,
}

impl Default for DeserializationConfig {
    fn default() -> Self {
        Self {
            skip_unknown_message_types: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Message type token -> destination address
    pub routes: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

impl CourierConfig {
    /// Validate loaded values; called by the loader before returning
    pub fn validate(&self) -> ConfigResult<()> {
        if self.endpoint.name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "name",
                "endpoint",
            ));
        }

        if let Some(local_address) = &self.endpoint.local_address {
            if local_address.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "endpoint.local_address",
                    local_address.clone(),
                    "local address must not be blank when set",
                ));
            }
        }

        if let Some(address) = &self.audit.address {
            if address.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "audit.address",
                    address.clone(),
                    "audit address must not be blank when set",
                ));
            }
        }

        for (message_type, destination) in &self.routing.routes {
            if destination.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    format!("routing.routes.{message_type}"),
                    destination.clone(),
                    "destination must not be blank",
                ));
            }
        }

        Ok(())
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit.address.is_some()
    }
}
