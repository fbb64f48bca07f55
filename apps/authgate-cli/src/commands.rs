//! Subcommand handlers.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use authgate::{AuthGateway, HistoryNavigator, SessionClient, UserProfile};

use crate::config::AppConfig;

/// Route the CLI pretends to be on while running a command.
const START_ROUTE: &str = "/";

/// A gateway-backed session for one CLI invocation.
pub struct Session {
    client: SessionClient,
}

impl Session {
    /// Wire the gateway, its HTTP client, and a navigator that reports
    /// forced redirects to the login route.
    ///
    /// # Errors
    /// Fails if no base URL is configured or the gateway cannot be built.
    pub fn open(config: &AppConfig) -> Result<Self> {
        if config.gateway.base_url.is_none() {
            bail!("no API base URL configured; set gateway.base_url or pass --base-url");
        }

        let login_route = config.gateway.login_route.clone();
        let navigator = Arc::new(HistoryNavigator::new(START_ROUTE).on_navigate(
            move |route| {
                if route == login_route {
                    tracing::warn!("session ended; run `authgate login` to sign in again");
                }
            },
        ));

        let gateway = AuthGateway::from_config(&config.gateway, navigator)
            .context("invalid gateway configuration")?;
        let http = gateway
            .http_client(config.gateway.http_client_config())
            .context("failed to build HTTP client")?;

        Ok(Self {
            client: SessionClient::new(http, gateway),
        })
    }

    fn gateway(&self) -> &AuthGateway {
        self.client.gateway()
    }
}

pub fn check(config: &AppConfig) -> Result<()> {
    config
        .gateway
        .validate()
        .context("invalid gateway configuration")?;
    tracing::info!("configuration checked");
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}

pub fn status(session: &Session) {
    if session.gateway().is_authenticated() {
        println!("signed in");
    } else {
        println!("not signed in");
    }
}

pub async fn login(session: &Session, email: &str, password: &str) -> Result<()> {
    let user = session
        .client
        .login(email, password)
        .await
        .context("login failed")?;
    println!("signed in{}", describe(user.as_ref()));
    Ok(())
}

pub async fn register(session: &Session, name: &str, email: &str, password: &str) -> Result<()> {
    let user = session
        .client
        .register(name, email, password)
        .await
        .context("registration failed")?;
    if session.gateway().is_authenticated() {
        println!("registered and signed in{}", describe(user.as_ref()));
    } else {
        println!("registered{}; run `authgate login` to sign in", describe(user.as_ref()));
    }
    Ok(())
}

pub async fn logout(session: &Session) {
    session.client.logout().await;
    println!("signed out");
}

pub async fn whoami(session: &Session) -> Result<()> {
    let user = session
        .client
        .current_user()
        .await
        .context("failed to fetch current user")?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

/// GET `path` through the gateway and print the body.
pub async fn get(session: &Session, path: &str) -> Result<()> {
    let response = session
        .client
        .client()
        .get(path)
        .send()
        .await
        .with_context(|| format!("GET {path} failed"))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("GET {path} returned {status}"))?;
    println!("{body}");
    Ok(())
}

fn describe(user: Option<&UserProfile>) -> String {
    match user {
        Some(UserProfile {
            name: Some(name), ..
        }) => format!(" as {name}"),
        Some(UserProfile {
            email: Some(email), ..
        }) => format!(" as {email}"),
        _ => String::new(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_name_over_email() {
        let user: UserProfile =
            serde_json::from_value(serde_json::json!({"name": "Ada", "email": "ada@example.com"}))
                .unwrap();
        assert_eq!(describe(Some(&user)), " as Ada");

        let user: UserProfile =
            serde_json::from_value(serde_json::json!({"email": "ada@example.com"})).unwrap();
        assert_eq!(describe(Some(&user)), " as ada@example.com");

        assert_eq!(describe(None), "");
    }

    #[test]
    fn session_requires_base_url() {
        let mut config = AppConfig::default();
        config.gateway.base_url = None;
        let err = Session::open(&config).err().unwrap();
        assert!(err.to_string().contains("base URL"));
    }
}
