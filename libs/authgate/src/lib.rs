#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Authenticated request gateway.
//!
//! An [`AuthGateway`] owns the process-wide session state: the credential
//! slot, the refresh coordinator, the public-route table and the navigation
//! hook. Installing it on an [`authgate_http::HttpClient`] (see
//! [`HttpClientBuilderExt::with_session`]) makes that client:
//!
//! - attach `Authorization: Bearer <credential>` to every request,
//! - turn a `401` into a single shared credential refresh, queueing every
//!   request that fails while the refresh is in flight,
//! - replay each failed request exactly once with the new credential,
//! - end the session (navigate to the login route) when a replay is still
//!   unauthorized or the refresh itself fails.
//!
//! Callers keep using the client exactly like a plain one.

pub mod builder_ext;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod layer;
pub mod navigation;
pub mod refresh;
pub mod routes;
pub mod session;
pub mod storage;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod testing;

pub use builder_ext::HttpClientBuilderExt;
pub use config::{GatewayConfig, PublicRoutesConfig};
pub use credential::{Credential, CredentialStore, MemoryCredentialStore, SecretString};
pub use error::{ConfigError, RefreshError, SessionError};
pub use gateway::{AuthGateway, GatewayBuilder};
pub use layer::{RetryMarker, SessionLayer, SessionService};
pub use navigation::{HistoryNavigator, Navigator};
pub use refresh::{HttpTokenRefresher, TokenRefresher};
pub use routes::PublicRoutes;
pub use session::{SessionClient, UserProfile};
pub use storage::{DEFAULT_STORAGE_KEY, FileCredentialStore};
