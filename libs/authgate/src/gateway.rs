use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use authgate_http::{HttpClient, HttpClientBuilder, HttpClientConfig, HttpError};

use crate::builder_ext::HttpClientBuilderExt;
use crate::config::GatewayConfig;
use crate::credential::{Credential, CredentialStore, MemoryCredentialStore};
use crate::error::ConfigError;
use crate::layer::SessionLayer;
use crate::navigation::{HistoryNavigator, Navigator};
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
use crate::routes::PublicRoutes;
use crate::storage::FileCredentialStore;

/// The authenticated request gateway.
///
/// One instance per application session. It owns the credential slot, the
/// refresh coordinator, and the hooks into the host application; every
/// client built from it through [`http_client`](Self::http_client) or
/// [`HttpClientBuilderExt::with_session`] shares that state.
///
/// Cloning is cheap and yields a handle to the same gateway.
#[derive(Clone)]
pub struct AuthGateway {
    pub(crate) inner: Arc<GatewayInner>,
}

pub(crate) struct GatewayInner {
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) refresher: Arc<dyn TokenRefresher>,
    pub(crate) routes: PublicRoutes,
    pub(crate) login_route: String,
    pub(crate) coordinator: RefreshCoordinator,
}

impl AuthGateway {
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Assemble a gateway from configuration.
    ///
    /// Uses a [`FileCredentialStore`] when `credentials_file` is set and an
    /// in-memory slot otherwise, and an [`HttpTokenRefresher`] for
    /// `refresh_path`. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the configuration is invalid or the refresh
    /// client cannot be built.
    pub fn from_config(
        config: &GatewayConfig,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let credentials: Arc<dyn CredentialStore> = match &config.credentials_file {
            Some(path) => Arc::new(FileCredentialStore::with_key(path, &config.storage_key)),
            None => Arc::new(MemoryCredentialStore::new()),
        };

        let mut routes = PublicRoutes::from(&config.public_routes);
        if let Some(base) = &config.base_url {
            routes = routes.with_mount(base.path());
        }

        Self::builder()
            .credentials(credentials)
            .navigator(navigator)
            .refresher(Arc::new(HttpTokenRefresher::from_config(config)?))
            .public_routes(routes)
            .login_route(config.login_route.clone())
            .refresh_timeout(config.refresh_timeout)
            .build()
    }

    /// Build an HTTP client whose requests go through this gateway.
    ///
    /// # Errors
    /// Returns an error if the client fails to build.
    pub fn http_client(&self, config: HttpClientConfig) -> Result<HttpClient, HttpError> {
        HttpClientBuilder::with_config(config)
            .with_session(self.clone())
            .build()
    }

    /// The tower layer applying this gateway to a service.
    #[must_use]
    pub fn layer(&self) -> SessionLayer {
        SessionLayer::new(self.clone())
    }

    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.inner.credentials.load()
    }

    pub fn set_credential(&self, credential: Credential) {
        self.inner.credentials.store(credential);
    }

    pub fn clear_credential(&self) {
        self.inner.credentials.clear();
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    /// Requests currently queued behind an outstanding refresh.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.coordinator.pending_len()
    }

    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.inner.login_route
    }

    #[must_use]
    pub fn public_routes(&self) -> &PublicRoutes {
        &self.inner.routes
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }
}

impl fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGateway")
            .field("authenticated", &self.is_authenticated())
            .field("login_route", &self.inner.login_route)
            .field("routes", &self.inner.routes)
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthGateway`].
///
/// Only the refresher is required. The credential slot defaults to memory,
/// the navigator to a [`HistoryNavigator`] at `/`.
pub struct GatewayBuilder {
    credentials: Option<Arc<dyn CredentialStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    routes: PublicRoutes,
    login_route: String,
    refresh_timeout: Duration,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            credentials: None,
            navigator: None,
            refresher: None,
            routes: PublicRoutes::default(),
            login_route: defaults.login_route,
            refresh_timeout: defaults.refresh_timeout,
        }
    }
}

impl GatewayBuilder {
    #[must_use]
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    #[must_use]
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn public_routes(mut self, routes: PublicRoutes) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    #[must_use]
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// # Errors
    /// Returns [`ConfigError::Missing`] without a refresher and
    /// [`ConfigError::ZeroDuration`] for a zero refresh timeout.
    pub fn build(self) -> Result<AuthGateway, ConfigError> {
        let refresher = self.refresher.ok_or(ConfigError::Missing("refresher"))?;
        if self.refresh_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("refresh_timeout"));
        }
        if !self.login_route.starts_with('/') {
            return Err(ConfigError::RelativeRoute {
                field: "login_route",
                value: self.login_route,
            });
        }

        Ok(AuthGateway {
            inner: Arc::new(GatewayInner {
                credentials: self
                    .credentials
                    .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new())),
                navigator: self
                    .navigator
                    .unwrap_or_else(|| Arc::new(HistoryNavigator::default())),
                refresher,
                routes: self.routes,
                login_route: self.login_route,
                coordinator: RefreshCoordinator::new(self.refresh_timeout),
            }),
        })
    }
}
