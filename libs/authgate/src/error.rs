use std::time::Duration;

use authgate_http::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Why a credential refresh did not produce a new credential.
///
/// `Clone` because one refresh outcome is delivered to every request queued
/// behind it. No variant ever carries a credential value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-2xx status.
    #[error("refresh endpoint returned HTTP {status}")]
    Rejected { status: StatusCode },

    /// Transport-level failure reaching the refresh endpoint.
    #[error("refresh request failed: {0}")]
    Http(String),

    /// The refresh endpoint answered 2xx but without a usable token.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// The refresh did not settle within the configured bound.
    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),

    /// The task driving the refresh went away before it settled.
    #[error("refresh aborted before completion")]
    Aborted,
}

impl RefreshError {
    /// Classify an HTTP client error raised while calling the refresh endpoint.
    #[must_use]
    pub fn from_http(err: &HttpError) -> Self {
        match err {
            HttpError::Status { status, .. } => Self::Rejected { status: *status },
            HttpError::Json(e) => Self::InvalidResponse(e.to_string()),
            HttpError::Timeout(d) => Self::TimedOut(*d),
            other => Self::Http(other.to_string()),
        }
    }
}

/// Errors surfaced to callers of a gateway-backed client or [`SessionClient`](crate::SessionClient).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The request was refreshed and replayed and is still unauthorized.
    /// The login route has been requested.
    #[error("session expired: request still unauthorized (HTTP {status}) after credential refresh")]
    SessionExpired { status: StatusCode },

    /// The credential refresh failed; the stored credential has been cleared.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// The server issued a token that cannot be used as a bearer credential.
    #[error("server issued an unusable credential")]
    InvalidCredential,

    /// Any other HTTP failure.
    #[error(transparent)]
    Http(HttpError),
}

impl From<HttpError> for SessionError {
    /// Session failures raised inside the HTTP stack come back out typed.
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Auth(source) => match source.downcast::<Self>() {
                Ok(session) => *session,
                Err(other) => Self::Http(HttpError::Auth(other)),
            },
            other => Self::Http(other),
        }
    }
}

impl SessionError {
    /// Recover the session error carried inside [`HttpError::Auth`].
    ///
    /// Returns `None` for every other kind of HTTP error.
    #[must_use]
    pub fn from_http(err: &HttpError) -> Option<&Self> {
        match err {
            HttpError::Auth(source) => source.downcast_ref::<Self>(),
            _ => None,
        }
    }

    pub(crate) fn into_http(self) -> HttpError {
        match self {
            Self::Http(inner) => inner,
            other => HttpError::Auth(Box::new(other)),
        }
    }
}

/// Invalid gateway configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A route or endpoint is not an absolute path.
    #[error("{field} must be an absolute path starting with '/', got '{value}'")]
    RelativeRoute { field: &'static str, value: String },

    /// A duration that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A required string is empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// A required component was not provided to the builder.
    #[error("gateway builder is missing {0}")]
    Missing(&'static str),

    /// The HTTP client for the refresh endpoint could not be built.
    #[error("failed to build refresh client: {0}")]
    Client(#[from] HttpError),
}
