//! Tower layer applying the gateway to every request.
//!
//! Request flow through [`SessionService`]:
//!
//! 1. attach the stored credential as a bearer token;
//! 2. send through the inner stack;
//! 3. on `401`, unless the request is public or was already replayed, mark
//!    it with [`RetryMarker`] and either lead a refresh or queue behind the
//!    running one;
//! 4. after a successful refresh, replay with the new credential and return
//!    the replay's outcome. A replay that is still unauthorized ends the
//!    session.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use authgate_http::{HttpError, ResponseBody};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::Full;
use tower::{Layer, Service, ServiceExt};

use crate::error::{RefreshError, SessionError};
use crate::gateway::{AuthGateway, GatewayInner};
use crate::navigation::redirect_to_login;
use crate::refresh::{Admission, LeaderGuard, PendingRequest, ReplayFuture};

/// Request extension set once a request has been handed to the refresh
/// protocol. A marked request is never refreshed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryMarker;

/// Tower layer producing [`SessionService`].
#[derive(Clone, Debug)]
pub struct SessionLayer {
    gateway: AuthGateway,
}

impl SessionLayer {
    #[must_use]
    pub fn new(gateway: AuthGateway) -> Self {
        Self { gateway }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            gateway: self.gateway.clone(),
        }
    }
}

/// Service injecting the bearer credential and recovering from expired
/// credentials. Created by [`SessionLayer`].
#[derive(Clone, Debug)]
pub struct SessionService<S> {
    inner: S,
    gateway: AuthGateway,
}

impl<S> Service<Request<Full<Bytes>>> for SessionService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Full<Bytes>>) -> Self::Future {
        let gateway = self.gateway.clone();
        gateway.inner.augment(&mut req);
        let replay = duplicate(&req);

        // Clone-swap: the instance that was polled ready serves this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(req).await?;
            gateway.inner.intercept(inner, replay, response).await
        })
    }
}

impl GatewayInner {
    /// Attach the stored credential. Never fails.
    pub(crate) fn augment<B>(&self, request: &mut Request<B>) {
        let Some(credential) = self.credentials.load() else {
            return;
        };
        match credential.bearer_header() {
            Some(header) => {
                request.headers_mut().insert(AUTHORIZATION, header);
            }
            None => tracing::warn!(
                "stored credential is not a valid header value; sending request without it"
            ),
        }
    }

    fn is_public(&self, request: &Request<Full<Bytes>>) -> bool {
        self.routes.is_public_endpoint(request.uri().path())
            || self.routes.is_public_page(&self.navigator.current_route())
    }

    /// Decide what the caller observes for `response` to `request`.
    async fn intercept<S>(
        &self,
        mut inner: S,
        mut request: Request<Full<Bytes>>,
        response: Response<ResponseBody>,
    ) -> Result<Response<ResponseBody>, HttpError>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>,
        S::Future: Send + 'static,
    {
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if self.is_public(&request) {
            tracing::debug!(
                path = %request.uri().path(),
                "401 on public route; passing through"
            );
            return Ok(response);
        }

        if request.extensions().get::<RetryMarker>().is_some() {
            return self.expire(response.status());
        }

        request.extensions_mut().insert(RetryMarker);
        drop(response);

        if let Some(current) = self.newer_credential(&request) {
            tracing::debug!(
                path = %request.uri().path(),
                "credential changed since request was sent; replaying without refresh"
            );
            let replay = issue(&mut inner, with_bearer(request, &current)).await;
            return self.conclude(replay.await);
        }

        match self.coordinator.admit(request) {
            Admission::Leader(guard, request) => self.lead_refresh(guard, inner, request).await,
            Admission::Queued(settled) => match settled.await {
                Ok(Ok(replay)) => self.conclude(replay.await),
                Ok(Err(e)) => Err(SessionError::RefreshFailed(e).into_http()),
                Err(_) => Err(SessionError::RefreshFailed(RefreshError::Aborted).into_http()),
            },
        }
    }

    /// Run one refresh cycle and settle every request queued behind it.
    async fn lead_refresh<S>(
        &self,
        guard: LeaderGuard<'_>,
        mut inner: S,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<ResponseBody>, HttpError>
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>,
        S::Future: Send + 'static,
    {
        tracing::info!(path = %request.uri().path(), "credential refresh started");

        let current = self.credentials.load();
        let outcome = self
            .coordinator
            .run(self.refresher.as_ref(), current.as_ref())
            .await
            .and_then(|credential| match credential.bearer_header() {
                Some(header) => Ok((credential, header)),
                None => Err(RefreshError::InvalidResponse(
                    "token is not a valid header value".to_owned(),
                )),
            });

        match outcome {
            Ok((credential, header)) => {
                self.credentials.store(credential);
                let pending = guard.settle();
                tracing::info!(queued = pending.len(), "credential refreshed; replaying");

                // Arrival order: the leader's own request came first.
                let own = issue(&mut inner, with_bearer(request, &header)).await;
                for PendingRequest { request, waiter } in pending {
                    tracing::debug!(path = %request.uri().path(), "replay issued");
                    waiter.resolve(issue(&mut inner, with_bearer(request, &header)).await);
                }

                self.conclude(own.await)
            }
            Err(e) => {
                // Leave the login route in place before ending the cycle, so a
                // 401 racing the settle either queues here or sees a public page.
                self.credentials.clear();
                redirect_to_login(self.navigator.as_ref(), &self.login_route);
                let pending = guard.settle();
                tracing::warn!(
                    error = %e,
                    queued = pending.len(),
                    "credential refresh failed; session cleared"
                );
                for entry in pending {
                    entry.waiter.reject(e.clone());
                }
                Err(SessionError::RefreshFailed(e).into_http())
            }
        }
    }

    /// Outcome of a replay. A replay is already marked, so a 401 is final.
    fn conclude(
        &self,
        replayed: Result<Response<ResponseBody>, HttpError>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        let response = replayed?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return self.expire(response.status());
        }
        Ok(response)
    }

    fn expire(&self, status: StatusCode) -> Result<Response<ResponseBody>, HttpError> {
        tracing::warn!("request still unauthorized after refresh; session expired");
        redirect_to_login(self.navigator.as_ref(), &self.login_route);
        Err(SessionError::SessionExpired { status }.into_http())
    }

    /// The stored credential, if it differs from the one `request` carried.
    fn newer_credential(&self, request: &Request<Full<Bytes>>) -> Option<HeaderValue> {
        if self.coordinator.is_refreshing() {
            return None;
        }
        let current = self.credentials.load()?.bearer_header()?;
        let sent = request.headers().get(AUTHORIZATION);
        (sent != Some(&current)).then_some(current)
    }
}

/// Hand `request` to `inner` and return the in-flight response future.
///
/// The future is polled once here: transport futures are lazy, and the send
/// has to start in issue order, not when each caller first awaits it. A
/// readiness failure becomes a future that fails immediately.
async fn issue<S>(inner: &mut S, request: Request<Full<Bytes>>) -> ReplayFuture
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>,
    S::Future: Send + 'static,
{
    let mut replay: ReplayFuture = match inner.ready().await {
        Ok(service) => Box::pin(service.call(request)),
        Err(e) => return Box::pin(std::future::ready(Err(e))),
    };
    match std::future::poll_fn(|cx| Poll::Ready(replay.as_mut().poll(cx))).await {
        Poll::Ready(outcome) => Box::pin(std::future::ready(outcome)),
        Poll::Pending => replay,
    }
}

fn with_bearer(mut request: Request<Full<Bytes>>, header: &HeaderValue) -> Request<Full<Bytes>> {
    request.headers_mut().insert(AUTHORIZATION, header.clone());
    request
}

/// Copy of `request` kept for a possible replay.
fn duplicate(request: &Request<Full<Bytes>>) -> Request<Full<Bytes>> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    *copy.extensions_mut() = request.extensions().clone();
    copy
}
