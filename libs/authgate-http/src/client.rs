use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use bytes::Bytes;
use http::{Method, Request, Response, Uri};
use http_body_util::Full;
use tower::Service;
use tower::buffer::Buffer;
use url::Url;

use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::{HttpResponse, ResponseBody};

type StackFuture = Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// The buffer at the top of the client stack.
pub type BufferedService = Buffer<Request<Full<Bytes>>, StackFuture>;

/// HTTP client over a tower stack.
///
/// Cheap to clone: clones share the buffer, the connection pool, and the
/// auth layer installed at build time.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) base_url: Option<Arc<Url>>,
    pub(crate) transport: TransportSecurity,
    pub(crate) max_body_size: usize,
}

impl HttpClient {
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_deref()
    }

    /// `target` is an absolute URL or a path appended to the base URL.
    ///
    /// A leading `/` does not discard the base path: with a base of
    /// `https://host/api`, `/cars` becomes `https://host/api/cars`.
    pub fn request(&self, method: Method, target: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, target)
    }

    pub fn get(&self, target: &str) -> RequestBuilder {
        self.request(Method::GET, target)
    }

    pub fn post(&self, target: &str) -> RequestBuilder {
        self.request(Method::POST, target)
    }

    pub fn put(&self, target: &str) -> RequestBuilder {
        self.request(Method::PUT, target)
    }

    pub fn delete(&self, target: &str) -> RequestBuilder {
        self.request(Method::DELETE, target)
    }

    /// Absolute request URI for `target`, checked against the transport policy.
    pub(crate) fn resolve(&self, target: &str) -> Result<Uri, HttpError> {
        let url = match (Url::parse(target), self.base_url.as_deref()) {
            (Ok(url), _) => url,
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => {
                Url::parse(&append_to_base(base, target))
                    .map_err(|e| HttpError::invalid_url(target, e))?
            }
            (Err(url::ParseError::RelativeUrlWithoutBase), None) => {
                return Err(HttpError::invalid_url(
                    target,
                    "relative URL and no base URL configured",
                ));
            }
            (Err(e), _) => return Err(HttpError::invalid_url(target, e)),
        };

        let plain_http_allowed = self.transport == TransportSecurity::AllowInsecureHttp;
        match url.scheme() {
            "https" => {}
            "http" if plain_http_allowed => {}
            scheme => {
                return Err(HttpError::SchemeNotAllowed {
                    scheme: scheme.to_owned(),
                });
            }
        }
        if !url.has_host() {
            return Err(HttpError::invalid_url(target, "missing host"));
        }

        url.as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| HttpError::invalid_url(target, e))
    }

    /// Push `request` through the stack. A full buffer fails immediately.
    pub(crate) async fn dispatch(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<HttpResponse, HttpError> {
        let mut service = self.service.clone();
        reserve_slot(&mut service).await?;
        let inner = service.call(request).await.map_err(from_buffer_error)?;
        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url.as_deref().map(Url::as_str))
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Append `target` to the base path with exactly one `/` between them.
fn append_to_base(base: &Url, target: &str) -> String {
    let mut prefix = base.clone();
    prefix.set_query(None);
    prefix.set_fragment(None);
    format!(
        "{}/{}",
        prefix.as_str().trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

/// Errors from inside the stack come back boxed; anything else means the
/// buffer worker is gone.
fn from_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(err) => *err,
        Err(err) => {
            tracing::error!(error = %err, "request buffer worker stopped");
            HttpError::ServiceClosed
        }
    }
}

/// Poll the buffer once for capacity instead of waiting for it.
async fn reserve_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    let ready = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match ready {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(from_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
