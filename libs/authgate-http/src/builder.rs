use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

use crate::client::{BufferedService, HttpClient};
use crate::config::{HttpClientConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::DefaultHeadersLayer;
use crate::response::ResponseBody;
use crate::tls;

/// The stack below the auth layer, type-erased.
pub type InnerService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

type AuthLayerFn = Box<dyn FnOnce(InnerService) -> InnerService + Send>;

/// Builds an [`HttpClient`].
///
/// Stack, outer to inner:
/// `Buffer → [auth layer] → Timeout → DefaultHeaders → Decompression → hyper`.
#[derive(Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    auth_layer: Option<AuthLayerFn>,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            auth_layer: None,
        }
    }

    /// Wrap the stack below the buffer.
    ///
    /// The wrapper sees each request before it is sent and each response
    /// before the caller does, and may send requests again through the
    /// service it wraps. Setting it twice keeps the second.
    #[must_use]
    pub fn with_auth_layer(
        mut self,
        wrap: impl FnOnce(InnerService) -> InnerService + Send + 'static,
    ) -> Self {
        self.auth_layer = Some(Box::new(wrap));
        self
    }

    /// Must run inside a tokio runtime: the buffer spawns its worker.
    ///
    /// # Errors
    /// [`HttpError::Tls`] if the connector cannot be built,
    /// [`HttpError::InvalidHeaderValue`] for an unusable user agent.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let Self { config, auth_layer } = self;

        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                target: "authgate_http::security",
                "plain HTTP allowed; traffic to http:// targets is not encrypted"
            );
        }

        let mut stack = transport_stack(&config)?;
        if let Some(wrap) = auth_layer {
            stack = wrap(stack);
        }
        let service: BufferedService = Buffer::new(stack, config.buffer_capacity.max(1));

        Ok(HttpClient {
            service,
            base_url: config.base_url.map(Arc::new),
            transport: config.transport,
            max_body_size: config.max_body_size,
        })
    }
}

/// Everything below the auth layer.
fn transport_stack(config: &HttpClientConfig) -> Result<InnerService, HttpError> {
    let connector = tls::https_connector(config.tls_roots, config.transport)?;

    let mut pool = Client::builder(TokioExecutor::new());
    // Idle timeouts only fire with a timer installed.
    pool.pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool.max_idle_per_host)
        .pool_idle_timeout(config.pool.idle_timeout);
    let hyper_client = pool.build::<_, Full<Bytes>>(connector);

    let timeout = config.request_timeout;
    let stack = ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(DefaultHeadersLayer::try_new(&config.user_agent)?)
        .layer(DecompressionLayer::new())
        .service(hyper_client)
        .map_response(|response| {
            let (parts, body) = response.into_parts();
            let body: ResponseBody = body.map_err(Into::into).boxed();
            Response::from_parts(parts, body)
        })
        .map_err(move |e| classify(e, timeout));

    Ok(stack.boxed_clone())
}

fn classify(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(err) => *err,
        Err(other) => HttpError::Transport(other),
    }
}
