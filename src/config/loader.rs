//! Configuration Loader
//!
//! Environment-aware layered loading. Sources are applied in order, later ones
//! overriding earlier ones:
//!
//! 1. [`CourierConfig::default`]
//! 2. `{config_dir}/courier.toml` (optional)
//! 3. `{config_dir}/courier.{environment}.toml` (optional)
//! 4. an explicit file passed to [`ConfigLoader::with_file`] (required)
//! 5. `COURIER__SECTION__KEY` environment variables

use std::path::PathBuf;

use config::{Config, Environment, File};
use tracing::debug;

use super::error::ConfigResult;
use super::CourierConfig;
use crate::constants::CONFIG_ENV_PREFIX;

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
    explicit_file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader rooted at `./config` with the environment auto-detected
    pub fn new() -> Self {
        Self {
            config_directory: PathBuf::from("config"),
            environment: Self::detect_environment(),
            explicit_file: None,
            env_prefix: CONFIG_ENV_PREFIX.to_string(),
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config_directory = directory.into();
        self
    }

    /// Use an explicit environment instead of `COURIER_ENV`; useful in tests
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Load, merge and validate the configuration
    pub fn load(&self) -> ConfigResult<CourierConfig> {
        let base_file = self.config_directory.join("courier.toml");
        let environment_file = self
            .config_directory
            .join(format!("courier.{}.toml", self.environment));

        debug!(
            environment = %self.environment,
            config_directory = %self.config_directory.display(),
            "Loading courier configuration"
        );

        let mut builder = Config::builder()
            .add_source(Config::try_from(&CourierConfig::default())?)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(environment_file).required(false));

        if let Some(explicit_file) = &self.explicit_file {
            builder = builder.add_source(File::from(explicit_file.clone()).required(true));
        }

        let config: CourierConfig = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        crate::log_config!(
            info,
            "Configuration loaded",
            environment: self.environment.clone(),
            endpoint: config.endpoint.name.clone(),
            outbox_enabled: config.outbox.enabled,
            audit_enabled: config.audit_enabled()
        );

        Ok(config)
    }

    fn detect_environment() -> String {
        std::env::var("COURIER_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
