use tower::ServiceExt;

use crate::gateway::AuthGateway;
use crate::layer::SessionLayer;

/// Extension trait installing an [`AuthGateway`] on an
/// [`authgate_http::HttpClientBuilder`].
///
/// # Example
///
/// ```ignore
/// use authgate::HttpClientBuilderExt;
///
/// let client = HttpClientBuilder::with_config(config.http_client_config())
///     .with_session(gateway.clone())
///     .build()?;
/// ```
pub trait HttpClientBuilderExt {
    /// Route every request of the client through `gateway`.
    #[must_use]
    fn with_session(self, gateway: AuthGateway) -> Self;
}

impl HttpClientBuilderExt for authgate_http::HttpClientBuilder {
    fn with_session(self, gateway: AuthGateway) -> Self {
        let layer = SessionLayer::new(gateway);
        self.with_auth_layer(move |svc| {
            tower::ServiceBuilder::new()
                .layer(layer)
                .service(svc)
                .boxed_clone()
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Arc;

    use authgate_http::{HttpClientBuilder, HttpClientConfig};
    use httpmock::prelude::*;
    use url::Url;

    use crate::credential::{Credential, MemoryCredentialStore};
    use crate::testing::ScriptedRefresher;

    #[tokio::test]
    async fn client_sends_bearer_from_gateway() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/cars")
                .header("authorization", "Bearer tok1");
            then.status(200).body("[]");
        });

        let gateway = AuthGateway::builder()
            .credentials(Arc::new(MemoryCredentialStore::with_credential(
                Credential::new("tok1"),
            )))
            .refresher(Arc::new(ScriptedRefresher::succeeding("tok2")))
            .build()
            .unwrap();

        let base = Url::parse(&server.base_url()).unwrap();
        let client = HttpClientBuilder::with_config(HttpClientConfig::for_testing().with_base_url(base))
            .with_session(gateway)
            .build()
            .unwrap();

        let body = client.get("/api/cars").send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "[]");
        mock.assert();
    }
}
