#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end refresh flows against a mock API.
//!
//! Wires up: gateway from config → gateway client → mock resource API and
//! mock refresh endpoint → verifies what the caller observes, how often the
//! refresh endpoint is hit, and where the application is navigated.

use std::sync::Arc;
use std::time::Duration;

use authgate::{
    AuthGateway, Credential, CredentialStore, FileCredentialStore, GatewayConfig,
    HistoryNavigator, Navigator, RefreshError, SessionError,
};
use authgate_http::HttpClient;
use http::StatusCode;
use httpmock::prelude::*;
use url::Url;

struct App {
    gateway: AuthGateway,
    client: HttpClient,
    navigator: Arc<HistoryNavigator>,
}

fn config(server: &MockServer) -> GatewayConfig {
    GatewayConfig {
        base_url: Some(Url::parse(&server.base_url()).unwrap()),
        allow_insecure_http: true,
        refresh_timeout: Duration::from_secs(5),
        ..GatewayConfig::default()
    }
}

fn app(config: &GatewayConfig, token: Option<&str>) -> App {
    let navigator = Arc::new(HistoryNavigator::new("/garage"));
    let gateway = AuthGateway::from_config(config, navigator.clone()).unwrap();
    if let Some(token) = token {
        gateway.set_credential(Credential::new(token));
    }
    let client = gateway.http_client(config.http_client_config()).unwrap();
    App {
        gateway,
        client,
        navigator,
    }
}

fn refresh_ok<'a>(server: &'a MockServer, token: &str, delay: Duration) -> httpmock::Mock<'a> {
    let body = format!(r#"{{"token":"{token}"}}"#);
    server.mock(move |when, then| {
        when.method(POST).path("/auth/refresh-token");
        then.status(200)
            .header("content-type", "application/json")
            .delay(delay)
            .body(body);
    })
}

fn resource<'a>(
    server: &'a MockServer,
    path: &str,
    token: &str,
    status: u16,
) -> httpmock::Mock<'a> {
    let path = path.to_owned();
    let bearer = format!("Bearer {token}");
    server.mock(move |when, then| {
        when.method(GET).path(path).header("authorization", bearer);
        then.status(status).body(format!("status {status}"));
    })
}

/// One request, one refresh, one transparent replay.
#[tokio::test]
async fn expired_credential_is_refreshed_and_request_replayed() {
    let server = MockServer::start();
    let stale = resource(&server, "/cars", "tok1", 401);
    let fresh = resource(&server, "/cars", "tok2", 200);
    let refresh = refresh_ok(&server, "tok2", Duration::ZERO);

    let app = app(&config(&server), Some("tok1"));

    let response = app.client.get("/cars").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "status 200");

    stale.assert_calls(1);
    fresh.assert_calls(1);
    refresh.assert_calls(1);
    assert_eq!(app.gateway.credential(), Some(Credential::new("tok2")));
    assert!(app.navigator.history().is_empty());
}

/// Three simultaneous 401s share a single refresh.
#[tokio::test]
async fn simultaneous_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start();
    let mut stale = Vec::new();
    let mut fresh = Vec::new();
    for path in ["/cars", "/offers", "/messages"] {
        stale.push(resource(&server, path, "tok1", 401));
        fresh.push(resource(&server, path, "tok2", 200));
    }
    let refresh = refresh_ok(&server, "tok2", Duration::from_millis(300));

    let app = app(&config(&server), Some("tok1"));

    let (a, b, c) = tokio::join!(
        app.client.get("/cars").send(),
        app.client.get("/offers").send(),
        app.client.get("/messages").send(),
    );
    for response in [a, b, c] {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }

    refresh.assert_calls(1);
    for mock in &fresh {
        mock.assert_calls(1);
    }
    assert!(!app.gateway.is_refreshing());
}

/// The replay is still unauthorized; the session ends.
#[tokio::test]
async fn replay_still_unauthorized_redirects_without_second_refresh() {
    let server = MockServer::start();
    let stale = resource(&server, "/cars", "tok1", 401);
    let still = resource(&server, "/cars", "tok2", 401);
    let refresh = refresh_ok(&server, "tok2", Duration::ZERO);

    let app = app(&config(&server), Some("tok1"));

    let err = app.client.get("/cars").send().await.unwrap_err();
    assert!(matches!(
        SessionError::from(err),
        SessionError::SessionExpired { .. }
    ));

    stale.assert_calls(1);
    still.assert_calls(1);
    refresh.assert_calls(1);
    assert_eq!(app.navigator.history(), vec!["/login"]);
}

/// The refresh endpoint fails; every waiter is rejected and the
/// login redirect happens once.
#[tokio::test]
async fn refresh_failure_clears_session_and_redirects_once() {
    let server = MockServer::start();
    for path in ["/cars", "/offers", "/messages"] {
        resource(&server, path, "tok1", 401);
    }
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh-token");
        then.status(500).delay(Duration::from_millis(300)).body("down");
    });

    let app = app(&config(&server), Some("tok1"));

    let (a, b, c) = tokio::join!(
        app.client.get("/cars").send(),
        app.client.get("/offers").send(),
        app.client.get("/messages").send(),
    );
    for outcome in [a, b, c] {
        let err = SessionError::from(outcome.unwrap_err());
        assert!(
            matches!(
                err,
                SessionError::RefreshFailed(RefreshError::Rejected {
                    status: StatusCode::INTERNAL_SERVER_ERROR
                })
            ),
            "unexpected error: {err}"
        );
    }

    refresh.assert_calls(1);
    assert_eq!(app.gateway.credential(), None);
    assert_eq!(app.navigator.visits("/login"), 1);
    assert_eq!(app.navigator.current_route(), "/login");
}

#[tokio::test]
async fn unauthorized_from_login_endpoint_is_returned_as_is() {
    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(401).body("bad credentials");
    });
    let refresh = refresh_ok(&server, "tok2", Duration::ZERO);

    let app = app(&config(&server), None);

    let response = app.client.post("/auth/login").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login.assert_calls(1);
    refresh.assert_calls(0);
    assert!(app.navigator.history().is_empty());
}

#[tokio::test]
async fn refreshed_credential_is_persisted() {
    let server = MockServer::start();
    resource(&server, "/cars", "tok1", 401);
    resource(&server, "/cars", "tok2", 200);
    refresh_ok(&server, "tok2", Duration::ZERO);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, r#"{"token":"tok1","locale":"en"}"#).unwrap();

    let config = GatewayConfig {
        credentials_file: Some(path.clone()),
        ..config(&server)
    };
    let app = app(&config, None);
    assert_eq!(app.gateway.credential(), Some(Credential::new("tok1")));

    app.client.get("/cars").send().await.unwrap();

    let reopened = FileCredentialStore::open(&path);
    assert_eq!(reopened.load(), Some(Credential::new("tok2")));
    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["locale"], "en");
}

#[tokio::test]
async fn refresh_timeout_fails_the_session() {
    let server = MockServer::start();
    resource(&server, "/cars", "tok1", 401);
    refresh_ok(&server, "tok2", Duration::from_secs(3));

    let config = GatewayConfig {
        refresh_timeout: Duration::from_millis(200),
        ..config(&server)
    };
    let app = app(&config, Some("tok1"));

    let err = SessionError::from(app.client.get("/cars").send().await.unwrap_err());
    assert!(matches!(
        err,
        SessionError::RefreshFailed(RefreshError::TimedOut(_))
    ));
    assert_eq!(app.gateway.credential(), None);
}

/// API mounted under `/api`: resources, the refresh endpoint and the public
/// login endpoint all resolve below the mount.
#[tokio::test]
async fn api_mounted_under_a_path_prefix() {
    let server = MockServer::start();
    let stale = resource(&server, "/api/cars", "tok1", 401);
    let fresh = resource(&server, "/api/cars", "tok2", 200);
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/api/auth/refresh-token");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"token":"tok2"}"#);
    });
    let unmounted_refresh = refresh_ok(&server, "wrong", Duration::ZERO);
    let login = server.mock(|when, then| {
        when.method(POST).path("/api/auth/login");
        then.status(401).body("bad credentials");
    });

    let config = GatewayConfig {
        base_url: Some(Url::parse(&server.url("/api")).unwrap()),
        ..config(&server)
    };
    let app = app(&config, Some("tok1"));

    let response = app.client.get("/cars").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    stale.assert_calls(1);
    fresh.assert_calls(1);
    refresh.assert_calls(1);
    unmounted_refresh.assert_calls(0);
    assert_eq!(app.gateway.credential(), Some(Credential::new("tok2")));

    let response = app.client.post("/auth/login").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    login.assert_calls(1);
    refresh.assert_calls(1);
    assert!(app.navigator.history().is_empty());
}
