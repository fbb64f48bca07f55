use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, Method, Request};
use http_body_util::Full;
use serde::Serialize;

use crate::client::HttpClient;
use crate::error::HttpError;
use crate::response::HttpResponse;

/// One request under construction. Created by [`HttpClient::get`] and
/// friends; nothing is sent until [`send`](Self::send).
///
/// ```ignore
/// let offer: Offer = client
///     .post("/offers")
///     .json(&NewOffer { car_id: 7, amount: 125_000 })?
///     .send()
///     .await?
///     .json()
///     .await?;
/// ```
#[must_use = "a request does nothing until .send() is called"]
pub struct RequestBuilder {
    client: HttpClient,
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Option<Payload>,
}

struct Payload {
    bytes: Bytes,
    content_type: HeaderValue,
}

impl RequestBuilder {
    pub(crate) fn new(client: HttpClient, method: Method, target: &str) -> Self {
        Self {
            client,
            method,
            target: target.to_owned(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Set a header, replacing any earlier value for `name`.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON payload.
    ///
    /// `Content-Type: application/json` is sent unless a content type header
    /// was set explicitly.
    ///
    /// # Errors
    /// Returns [`HttpError::Json`] if `body` does not serialize.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        self.body = Some(Payload {
            bytes: Bytes::from(serde_json::to_vec(body)?),
            content_type: HeaderValue::from_static("application/json"),
        });
        Ok(self)
    }

    /// Send through the client stack.
    ///
    /// Every HTTP status the stack lets through is `Ok`; judge it with
    /// [`HttpResponse::status`] or the checked readers.
    ///
    /// # Errors
    /// URL and scheme validation failures, transport failures and timeouts,
    /// [`HttpError::Overloaded`] when the buffer is full, and
    /// [`HttpError::Auth`] when the auth layer fails the request.
    pub async fn send(self) -> Result<HttpResponse, HttpError> {
        let Self {
            client,
            method,
            target,
            mut headers,
            body,
        } = self;

        let uri = client.resolve(&target)?;
        let bytes = match body {
            Some(Payload {
                bytes,
                content_type,
            }) => {
                headers.entry(CONTENT_TYPE).or_insert(content_type);
                bytes
            }
            None => Bytes::new(),
        };

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(bytes))?;
        *request.headers_mut() = headers;

        client.dispatch(request).await
    }
}
