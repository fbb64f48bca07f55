//! Application configuration.
//!
//! Layered: defaults -> YAML file -> `AUTHGATE__*` env -> CLI overrides.

use std::path::Path;

use anyhow::{Context, Result, bail};
use authgate::GatewayConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, LogFormat};

/// Prefix for environment overrides; `__` separates nesting levels.
pub const ENV_PREFIX: &str = "AUTHGATE__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset and no `-v` is given.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: LogFormat::Text,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let gateway = GatewayConfig {
            credentials_file: dirs::config_dir()
                .map(|dir| dir.join("authgate").join("session.json")),
            ..GatewayConfig::default()
        };
        Self {
            gateway,
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file (if any), then the environment.
    ///
    /// # Errors
    /// Fails if the file does not exist or any layer does not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract().context("invalid configuration")
    }

    /// Apply command-line overrides on top of the loaded layers.
    pub fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(base_url) = &cli.base_url {
            self.gateway.base_url = Some(base_url.clone());
        }
        if cli.insecure {
            self.gateway.allow_insecure_http = true;
        }
        if let Some(format) = cli.log_format {
            self.logging.format = format;
        }
    }

    /// Render as YAML for `--print-config`.
    ///
    /// # Errors
    /// Fails if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).context("failed to render configuration")
    }
}
