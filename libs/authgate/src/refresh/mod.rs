//! Credential refresh: the remote exchange and the single-flight coordinator.

mod coordinator;
mod endpoint;

pub use coordinator::RefreshCoordinator;
pub use endpoint::HttpTokenRefresher;

pub(crate) use coordinator::{Admission, LeaderGuard, PendingRequest, ReplayFuture};

use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::RefreshError;

/// Exchanges a stale credential for a fresh one.
///
/// Called by the coordinator at most once per refresh cycle, however many
/// requests are waiting on the outcome.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// `current` is the credential in the slot when the cycle started, if any.
    ///
    /// # Errors
    /// Any failure ends the cycle: the slot is cleared and every waiting
    /// request is rejected.
    async fn refresh(&self, current: Option<&Credential>) -> Result<Credential, RefreshError>;
}

#[async_trait]
impl<T: TokenRefresher + ?Sized> TokenRefresher for std::sync::Arc<T> {
    async fn refresh(&self, current: Option<&Credential>) -> Result<Credential, RefreshError> {
        (**self).refresh(current).await
    }
}
