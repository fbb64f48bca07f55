use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use authgate_http::{HttpError, ResponseBody};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::TokenRefresher;
use crate::credential::Credential;
use crate::error::RefreshError;

/// Replay of a queued request, already handed to the inner service.
pub type ReplayFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// What a queued request receives when the refresh settles.
pub type Settlement = Result<ReplayFuture, RefreshError>;

/// A request that hit a 401 while a refresh was already running.
pub struct PendingRequest {
    pub request: Request<Full<Bytes>>,
    pub waiter: Waiter,
}

/// The suspended caller behind a [`PendingRequest`]. Settled exactly once.
pub struct Waiter(oneshot::Sender<Settlement>);

impl Waiter {
    /// Deliver the caller's replay. A closed channel means the caller went away.
    pub(crate) fn resolve(self, replay: ReplayFuture) {
        if self.0.send(Ok(replay)).is_err() {
            tracing::debug!("queued caller gone before its replay was delivered");
        }
    }

    pub(crate) fn reject(self, error: RefreshError) {
        if self.0.send(Err(error)).is_err() {
            tracing::debug!("queued caller gone before refresh settled");
        }
    }
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    pending: VecDeque<PendingRequest>,
}

/// Outcome of asking the coordinator for a refresh.
pub enum Admission<'a> {
    /// No refresh was running; the caller now drives one.
    Leader(LeaderGuard<'a>, Request<Full<Bytes>>),
    /// A refresh is running; the request was queued behind it.
    Queued(oneshot::Receiver<Settlement>),
}

/// Single-flight guard over credential refresh.
///
/// At most one refresh runs at a time. Requests that need a refresh while
/// one is running are queued in arrival order and settled together with
/// its outcome.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    refresh_timeout: Duration,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(refresh_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            refresh_timeout,
        }
    }

    /// Whether a refresh is outstanding.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of requests queued behind the outstanding refresh.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    /// Become the refresh leader, or queue `request` behind the running refresh.
    ///
    /// The check and the transition happen under one lock acquisition.
    pub(crate) fn admit(&self, request: Request<Full<Bytes>>) -> Admission<'_> {
        let mut state = self.state.lock();
        if state.refreshing {
            let (settle, settled) = oneshot::channel();
            state.pending.push_back(PendingRequest {
                request,
                waiter: Waiter(settle),
            });
            tracing::debug!(
                queued = state.pending.len(),
                "refresh in progress; request queued"
            );
            Admission::Queued(settled)
        } else {
            state.refreshing = true;
            Admission::Leader(
                LeaderGuard {
                    coordinator: self,
                    settled: false,
                },
                request,
            )
        }
    }

    /// Run the refresher once, bounded by the refresh timeout.
    pub(crate) async fn run(
        &self,
        refresher: &dyn TokenRefresher,
        current: Option<&Credential>,
    ) -> Result<Credential, RefreshError> {
        match tokio::time::timeout(self.refresh_timeout, refresher.refresh(current)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RefreshError::TimedOut(self.refresh_timeout)),
        }
    }

    /// Reset the flag and take the queue in one step.
    fn finish(&self) -> VecDeque<PendingRequest> {
        let mut state = self.state.lock();
        state.refreshing = false;
        std::mem::take(&mut state.pending)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("pending", &state.pending.len())
            .field("refresh_timeout", &self.refresh_timeout)
            .finish()
    }
}

/// Held by the task driving a refresh.
///
/// [`settle`](Self::settle) ends the cycle and hands over the queue. If the
/// guard is dropped unsettled (the leader was cancelled), the cycle still
/// ends and every queued request is rejected with [`RefreshError::Aborted`].
pub struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    /// End the refresh cycle and return the queued requests, oldest first.
    pub(crate) fn settle(mut self) -> VecDeque<PendingRequest> {
        self.settled = true;
        self.coordinator.finish()
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let pending = self.coordinator.finish();
        tracing::warn!(
            queued = pending.len(),
            "refresh abandoned before settling; rejecting queued requests"
        );
        for entry in pending {
            entry.waiter.reject(RefreshError::Aborted);
        }
    }
}
