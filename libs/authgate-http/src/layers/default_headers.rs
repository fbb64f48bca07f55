use crate::error::HttpError;
use http::header::{ACCEPT, HeaderName, USER_AGENT};
use http::{HeaderValue, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// `Accept` value sent when the caller does not choose one.
pub const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";

/// Tower layer that fills in default request headers.
///
/// Sets `User-Agent` and `Accept` unless the request already carries them.
#[derive(Clone, Debug)]
pub struct DefaultHeadersLayer {
    defaults: Arc<[(HeaderName, HeaderValue)]>,
}

impl DefaultHeadersLayer {
    /// Create the layer with the given user agent.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the user agent string is not
    /// a valid header value.
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, HttpError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref())?;
        Ok(Self {
            defaults: Arc::from([
                (USER_AGENT, user_agent),
                (ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT)),
            ]),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            defaults: Arc::clone(&self.defaults),
        }
    }
}

/// Service created by [`DefaultHeadersLayer`].
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    defaults: Arc<[(HeaderName, HeaderValue)]>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let headers = req.headers_mut();
        for (name, value) in self.defaults.iter() {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
