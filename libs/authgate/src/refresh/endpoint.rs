use async_trait::async_trait;
use authgate_http::{HttpClient, HttpClientBuilder};
use http::header::AUTHORIZATION;
use serde::Deserialize;

use super::TokenRefresher;
use crate::config::GatewayConfig;
use crate::credential::Credential;
use crate::error::{ConfigError, RefreshError};

/// Body returned by the refresh endpoint.
#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    token: Option<String>,
}

/// [`TokenRefresher`] that POSTs to the refresh endpoint.
///
/// Uses its own plain [`HttpClient`], never a gateway client, so a 401 from
/// the refresh call cannot re-enter the refresh protocol. The stale
/// credential, when there is one, is sent as the bearer token.
pub struct HttpTokenRefresher {
    client: HttpClient,
    path: String,
}

impl HttpTokenRefresher {
    /// `path` is resolved against the client's base URL.
    #[must_use]
    pub fn new(client: HttpClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    /// Build the refresher and its dedicated client from gateway settings.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`ConfigError::Client`] if the HTTP client fails to build.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let client = HttpClientBuilder::with_config(config.refresh_client_config()).build()?;
        Ok(Self::new(client, config.refresh_path.clone()))
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, current: Option<&Credential>) -> Result<Credential, RefreshError> {
        let mut builder = self.client.post(&self.path);
        if let Some(bearer) = current.and_then(Credential::bearer_header) {
            builder = builder.header(AUTHORIZATION, bearer);
        }

        // json() turns a non-2xx status into HttpError::Status.
        let body: RefreshResponse = builder
            .send()
            .await
            .map_err(|e| RefreshError::from_http(&e))?
            .json()
            .await
            .map_err(|e| RefreshError::from_http(&e))?;

        match body.token {
            Some(token) if !token.is_empty() => Ok(Credential::new(token)),
            _ => Err(RefreshError::InvalidResponse(
                "response carries no token".to_owned(),
            )),
        }
    }
}
