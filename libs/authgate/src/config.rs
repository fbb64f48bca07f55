use std::path::PathBuf;
use std::time::Duration;

use authgate_http::{DEFAULT_USER_AGENT, HttpClientConfig, TransportSecurity};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::storage::DEFAULT_STORAGE_KEY;

/// Gateway configuration.
///
/// Deserialized from YAML/env by the application; every field has a
/// default so an empty document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL relative request paths are resolved against.
    pub base_url: Option<Url>,

    /// Application route users are sent to when a session cannot be recovered.
    pub login_route: String,

    pub public_routes: PublicRoutesConfig,

    /// Path of the credential refresh endpoint, relative to `base_url`.
    pub refresh_path: String,

    /// Upper bound on a single refresh; expiry counts as a refresh failure.
    #[serde(with = "humantime_serde")]
    pub refresh_timeout: Duration,

    /// Key the credential is kept under in `credentials_file`.
    pub storage_key: String,

    /// Persistent credential slot. `None` keeps the credential in memory only.
    pub credentials_file: Option<PathBuf>,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    pub user_agent: String,

    /// Permit plain `http://` targets (local development and mock servers).
    pub allow_insecure_http: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            login_route: "/login".to_owned(),
            public_routes: PublicRoutesConfig::default(),
            refresh_path: "/auth/refresh-token".to_owned(),
            refresh_timeout: Duration::from_secs(10),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            credentials_file: None,
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            allow_insecure_http: false,
        }
    }
}

/// Routes that never engage the refresh protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicRoutesConfig {
    /// Navigation locations that never require a session.
    pub pages: Vec<String>,

    /// Request targets whose 401 is returned as-is.
    pub endpoints: Vec<String>,
}

impl Default for PublicRoutesConfig {
    fn default() -> Self {
        Self {
            pages: vec!["/login".to_owned(), "/register".to_owned()],
            endpoints: vec![
                "/auth/login".to_owned(),
                "/auth/register".to_owned(),
                "/auth/refresh-token".to_owned(),
            ],
        }
    }
}

impl GatewayConfig {
    /// Check routes, durations, and the storage key.
    ///
    /// # Errors
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_route("login_route", &self.login_route)?;
        check_route("refresh_path", &self.refresh_path)?;
        for page in &self.public_routes.pages {
            check_route("public_routes.pages", page)?;
        }
        for endpoint in &self.public_routes.endpoints {
            check_route("public_routes.endpoints", endpoint)?;
        }
        if self.refresh_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("refresh_timeout"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request_timeout"));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Empty("storage_key"));
        }
        Ok(())
    }

    /// HTTP client settings derived from this configuration.
    #[must_use]
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            user_agent: self.user_agent.clone(),
            transport: self.transport(),
            ..HttpClientConfig::default()
        }
    }

    /// HTTP client settings for the refresh endpoint.
    #[must_use]
    pub fn refresh_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.refresh_timeout,
            user_agent: self.user_agent.clone(),
            transport: self.transport(),
            ..HttpClientConfig::refresh_endpoint()
        }
    }

    fn transport(&self) -> TransportSecurity {
        if self.allow_insecure_http {
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        }
    }
}

fn check_route(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Empty(field));
    }
    if !value.starts_with('/') {
        return Err(ConfigError::RelativeRoute {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}
