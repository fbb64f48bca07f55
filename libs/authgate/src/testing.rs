//! Scripted collaborators shared by unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use authgate_http::{HttpError, ResponseBody};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tower::Service;

use crate::credential::Credential;
use crate::error::RefreshError;
use crate::layer::RetryMarker;
use crate::refresh::TokenRefresher;

pub fn get(path: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .uri(path)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub fn response(status: StatusCode, body: &str) -> Response<ResponseBody> {
    let body: ResponseBody = Full::new(Bytes::from(body.to_owned()))
        .map_err(|never| match never {})
        .boxed();
    Response::builder().status(status).body(body).unwrap()
}

/// What the scripted backend saw for one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub authorization: Option<String>,
    pub sensitive: bool,
    pub marked: bool,
}

enum Script {
    Always(StatusCode),
    ByToken(Vec<(String, StatusCode)>),
    Failing,
}

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

struct Backend {
    script: Script,
    calls: Mutex<Vec<RecordedCall>>,
    sent: Mutex<Vec<String>>,
    hook: Mutex<Option<CallHook>>,
}

/// Inner service answering from a script. Records every call in the order
/// `call` was invoked and, separately, the order the futures were polled.
#[derive(Clone)]
pub struct ScriptedService {
    backend: Arc<Backend>,
}

impl ScriptedService {
    fn with_script(script: Script) -> Self {
        Self {
            backend: Arc::new(Backend {
                script,
                calls: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                hook: Mutex::new(None),
            }),
        }
    }

    pub fn always(status: StatusCode) -> Self {
        Self::with_script(Script::Always(status))
    }

    /// Status chosen by bearer token; unknown or missing tokens get 401.
    pub fn by_token(table: &[(&str, StatusCode)]) -> Self {
        Self::with_script(Script::ByToken(
            table.iter().map(|(t, s)| ((*t).to_owned(), *s)).collect(),
        ))
    }

    /// Every call fails with `HttpError::Overloaded`.
    pub fn failing() -> Self {
        Self::with_script(Script::Failing)
    }

    /// Run `hook` with the call index on every call, before answering.
    pub fn on_call(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.backend.hook.lock() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.backend.calls.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.path).collect()
    }

    /// Paths in the order their response futures were first polled.
    pub fn sent(&self) -> Vec<String> {
        self.backend.sent.lock().clone()
    }
}

impl Service<Request<Full<Bytes>>> for ScriptedService {
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let header = req.headers().get(AUTHORIZATION);
        let call = RecordedCall {
            path: req.uri().path().to_owned(),
            authorization: header.map(|h| h.to_str().unwrap().to_owned()),
            sensitive: header.is_some_and(http::HeaderValue::is_sensitive),
            marked: req.extensions().get::<RetryMarker>().is_some(),
        };
        let index = {
            let mut calls = self.backend.calls.lock();
            calls.push(call.clone());
            calls.len() - 1
        };
        if let Some(hook) = &*self.backend.hook.lock() {
            hook(index);
        }

        let outcome = match &self.backend.script {
            Script::Always(status) => Ok(response(*status, call.path.as_str())),
            Script::ByToken(table) => {
                let token = call
                    .authorization
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Bearer "));
                let status = table
                    .iter()
                    .find(|(t, _)| Some(t.as_str()) == token)
                    .map_or(StatusCode::UNAUTHORIZED, |(_, s)| *s);
                Ok(response(status, call.path.as_str()))
            }
            Script::Failing => Err(HttpError::Overloaded),
        };
        let backend = self.backend.clone();
        Box::pin(async move {
            backend.sent.lock().push(call.path);
            outcome
        })
    }
}

enum Outcome {
    Token(String),
    Error(RefreshError),
}

/// Refresher returning a fixed outcome, optionally held until released.
pub struct ScriptedRefresher {
    outcome: Outcome,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedRefresher {
    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            gate: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(token: &str) -> Self {
        Self::with_outcome(Outcome::Token(token.to_owned()))
    }

    pub fn failing(error: RefreshError) -> Self {
        Self::with_outcome(Outcome::Error(error))
    }

    /// Hold every refresh until the returned handle is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Credential passed to each refresh call.
    pub fn seen(&self) -> Vec<Option<String>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl TokenRefresher for ScriptedRefresher {
    async fn refresh(&self, current: Option<&Credential>) -> Result<Credential, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .push(current.map(|c| c.secret().expose().to_owned()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.outcome {
            Outcome::Token(token) => Ok(Credential::new(token.clone())),
            Outcome::Error(e) => Err(e.clone()),
        }
    }
}
