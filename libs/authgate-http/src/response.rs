use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::error::HttpError;

/// Bytes of a non-2xx body kept in [`HttpError::Status`].
const STATUS_PREVIEW_LIMIT: usize = 8 * 1024;

/// Boxed response body as it leaves the client stack.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// A response whose status has not been judged yet.
///
/// [`bytes`](Self::bytes) reads the body whatever the status;
/// [`text`](Self::text) and [`json`](Self::json) turn a non-2xx status into
/// [`HttpError::Status`]. Every read stops at the client's body limit.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// # Errors
    /// `BodyTooLarge` past the limit, `Transport` if the body stream fails.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        collect(self.inner, self.max_body_size).await
    }

    /// Body as lossy UTF-8, for 2xx responses only.
    ///
    /// # Errors
    /// `Status` for a non-2xx response, otherwise as [`bytes`](Self::bytes).
    pub async fn text(self) -> Result<String, HttpError> {
        let body = self.success_body().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Body parsed as JSON, for 2xx responses only.
    ///
    /// # Errors
    /// `Status` for a non-2xx response, `Json` if parsing fails, otherwise as
    /// [`bytes`](Self::bytes).
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = self.success_body().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn success_body(self) -> Result<Bytes, HttpError> {
        let status = self.inner.status();
        if status.is_success() {
            return collect(self.inner, self.max_body_size).await;
        }

        let content_type = self
            .inner
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let limit = self.max_body_size.min(STATUS_PREVIEW_LIMIT);
        let body_preview = match collect(self.inner, limit).await {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            // The status is the error worth reporting.
            Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
            Err(e) => return Err(e),
        };

        Err(HttpError::Status {
            status,
            body_preview,
            content_type,
        })
    }
}

/// Read the whole body, failing as soon as it grows past `limit` bytes.
async fn collect(response: Response<ResponseBody>, limit: usize) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut buf = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        let Some(chunk) = frame.data_ref() else {
            continue;
        };
        let actual = buf.len() + chunk.len();
        if actual > limit {
            return Err(HttpError::BodyTooLarge { limit, actual });
        }
        buf.extend_from_slice(chunk);
    }

    Ok(Bytes::from(buf))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn response(status: StatusCode, body: &'static str) -> HttpResponse {
        let body: ResponseBody = Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|never| match never {})
            .boxed();
        HttpResponse {
            inner: Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
            max_body_size: 16,
        }
    }

    #[tokio::test]
    async fn json_reads_success_body() {
        let value: serde_json::Value = response(StatusCode::OK, r#"{"ok":true}"#)
            .json()
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn text_reports_status_with_preview() {
        let err = response(StatusCode::NOT_FOUND, "missing")
            .text()
            .await
            .unwrap_err();
        let HttpError::Status {
            status,
            body_preview,
            content_type,
        } = err
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body_preview, "missing");
        assert_eq!(content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn oversized_preview_keeps_status() {
        let err = response(StatusCode::BAD_GATEWAY, "an upstream page far too long")
            .json::<serde_json::Value>()
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn bytes_ignores_status_but_enforces_limit() {
        let body = response(StatusCode::UNAUTHORIZED, "denied")
            .bytes()
            .await
            .unwrap();
        assert_eq!(&body[..], b"denied");

        let err = response(StatusCode::OK, "this body is longer than sixteen bytes")
            .bytes()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 16, .. }));
    }
}
