use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from building, sending, or reading an HTTP request.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The target could not be turned into an absolute URL with a host.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The scheme is not allowed by the configured transport security.
    #[error("URL scheme '{scheme}' is not allowed")]
    SchemeNotAllowed { scheme: String },

    /// One attempt exceeded the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] BoxError),

    /// Raised by the auth layer installed with
    /// [`HttpClientBuilder::with_auth_layer`](crate::HttpClientBuilder::with_auth_layer).
    /// The source is the layer's own error type.
    #[error("authentication failed: {0}")]
    Auth(#[source] BoxError),

    /// A checked body read found a non-2xx status.
    #[error("HTTP {status}: {body_preview}")]
    Status {
        status: StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    #[error("response body exceeds {limit} bytes (read {actual})")]
    BodyTooLarge { limit: usize, actual: usize },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The request buffer is full.
    #[error("client overloaded: request buffer full")]
    Overloaded,

    /// The buffer worker is gone.
    #[error("client unavailable: request buffer closed")]
    ServiceClosed,
}

impl HttpError {
    /// Status code of a [`HttpError::Status`].
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidUrl {
            url: url.to_owned(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug, Error)]
    #[error("session expired")]
    struct Expired;

    #[test]
    fn auth_error_can_be_downcast() {
        let err = HttpError::Auth(Box::new(Expired));
        assert_eq!(err.to_string(), "authentication failed: session expired");
        assert!(err.source().unwrap().downcast_ref::<Expired>().is_some());
    }

    #[test]
    fn status_only_for_status_errors() {
        let err = HttpError::Status {
            status: StatusCode::NOT_FOUND,
            body_preview: "gone".to_owned(),
            content_type: None,
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.to_string(), "HTTP 404 Not Found: gone");
        assert_eq!(HttpError::Overloaded.status(), None);
    }
}
