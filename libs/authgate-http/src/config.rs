use std::time::Duration;
use url::Url;

/// `User-Agent` sent when the configuration does not override it.
pub const DEFAULT_USER_AGENT: &str = concat!("authgate-http/", env!("CARGO_PKG_VERSION"));

/// Where trusted root certificates come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Bundled Mozilla roots.
    #[default]
    WebPki,
    /// The operating system's trust store.
    Native,
}

/// Which URL schemes the client may connect to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// `https://` only.
    #[default]
    TlsOnly,
    /// `http://` is accepted too. For local development and mock servers.
    AllowInsecureHttp,
}

/// Connection pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections are closed after this long; `None` keeps them.
    pub idle_timeout: Option<Duration>,
    pub max_idle_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(90)),
            max_idle_per_host: 32,
        }
    }
}

/// Settings for one [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Relative targets are appended to this URL's path.
    ///
    /// With `https://api.example.com/v1`, both `"cars"` and `"/cars"` become
    /// `/v1/cars`.
    pub base_url: Option<Url>,

    /// Upper bound for one attempt, from dispatch to response headers.
    pub request_timeout: Duration,

    /// Bodies larger than this are rejected while reading.
    pub max_body_size: usize,

    pub user_agent: String,
    pub transport: TransportSecurity,
    pub tls_roots: TlsRootConfig,

    /// Requests allowed to wait for the stack at once; more fail with
    /// [`HttpError::Overloaded`](crate::HttpError::Overloaded).
    pub buffer_capacity: usize,

    pub pool: PoolConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
            buffer_capacity: 1024,
            pool: PoolConfig::default(),
        }
    }
}

impl HttpClientConfig {
    /// Client dedicated to the credential refresh call.
    ///
    /// Refresh responses are small and the call is rare, so the pool and the
    /// buffer stay small.
    #[must_use]
    pub fn refresh_endpoint() -> Self {
        Self {
            max_body_size: 64 * 1024,
            buffer_capacity: 64,
            pool: PoolConfig {
                idle_timeout: Some(Duration::from_secs(60)),
                max_idle_per_host: 2,
            },
            ..Self::default()
        }
    }

    /// Plain-HTTP client for mock servers.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool: PoolConfig {
                idle_timeout: Some(Duration::from_secs(10)),
                max_idle_per_host: 4,
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_requires_tls() {
        let config = HttpClientConfig::default();
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn refresh_endpoint_is_small_and_secure() {
        let config = HttpClientConfig::refresh_endpoint();
        assert_eq!(config.max_body_size, 64 * 1024);
        assert_eq!(config.pool.max_idle_per_host, 2);
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn testing_config_accepts_plain_http() {
        let base = Url::parse("http://127.0.0.1:8080/").unwrap();
        let config = HttpClientConfig::for_testing().with_base_url(base.clone());
        assert_eq!(config.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(config.base_url, Some(base));
    }
}
