//! Login, registration, and logout on top of a gateway client.
//!
//! These are the calls that create and end the credential lifecycle. The
//! login and register endpoints are public routes, so a 401 from them is a
//! plain rejection and never engages refresh.

use authgate_http::HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::credential::Credential;
use crate::error::SessionError;
use crate::gateway::AuthGateway;
use crate::navigation::redirect_to_login;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const CURRENT_USER_PATH: &str = "/auth/me";

/// Account as returned by the auth endpoints.
///
/// Only the common fields are typed; everything else is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileResponse {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

/// Session operations against the auth API.
#[derive(Clone)]
pub struct SessionClient {
    client: HttpClient,
    gateway: AuthGateway,
}

impl SessionClient {
    /// `client` should be built from `gateway` (see
    /// [`AuthGateway::http_client`]).
    #[must_use]
    pub fn new(client: HttpClient, gateway: AuthGateway) -> Self {
        Self { client, gateway }
    }

    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    #[must_use]
    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    /// Exchange email and password for a credential and store it.
    ///
    /// # Errors
    /// [`SessionError::Http`] if the server rejects the login,
    /// [`SessionError::InvalidCredential`] if it answers without a usable token.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserProfile>, SessionError> {
        let response: AuthResponse = self
            .client
            .post(LOGIN_PATH)
            .json(&LoginRequest { email, password })?
            .send()
            .await?
            .json()
            .await?;

        let credential = usable_credential(response.token).ok_or(SessionError::InvalidCredential)?;
        self.gateway.set_credential(credential);
        tracing::info!("logged in");
        Ok(response.user)
    }

    /// Create an account. Stores the credential when the server issues one.
    ///
    /// # Errors
    /// [`SessionError::Http`] if the server rejects the registration.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<UserProfile>, SessionError> {
        let response: AuthResponse = self
            .client
            .post(REGISTER_PATH)
            .json(&RegisterRequest {
                name,
                email,
                password,
            })?
            .send()
            .await?
            .json()
            .await?;

        match response.token {
            Some(token) => {
                let credential =
                    usable_credential(Some(token)).ok_or(SessionError::InvalidCredential)?;
                self.gateway.set_credential(credential);
                tracing::info!("registered and logged in");
            }
            None => tracing::info!("registered"),
        }
        Ok(response.user)
    }

    /// End the session.
    ///
    /// Notifies the server when possible, then always clears the credential
    /// and sends the application to the login route.
    pub async fn logout(&self) {
        if self.gateway.is_authenticated() {
            match self.client.post(LOGOUT_PATH).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!("server acknowledged logout");
                }
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "server rejected logout");
                }
                Err(e) => tracing::debug!(error = %e, "logout request failed"),
            }
        }

        self.gateway.clear_credential();
        redirect_to_login(
            self.gateway.navigator().as_ref(),
            self.gateway.login_route(),
        );
        tracing::info!("logged out");
    }

    /// Fetch the profile of the signed-in user.
    ///
    /// # Errors
    /// Any HTTP or session failure of the underlying request.
    pub async fn current_user(&self) -> Result<UserProfile, SessionError> {
        let response: ProfileResponse = self
            .client
            .get(CURRENT_USER_PATH)
            .send()
            .await?
            .json()
            .await?;

        Ok(match response {
            ProfileResponse::Wrapped { user } | ProfileResponse::Bare(user) => user,
        })
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

fn usable_credential(token: Option<String>) -> Option<Credential> {
    let credential = Credential::new(token.filter(|t| !t.is_empty())?);
    credential.bearer_header().map(|_| credential)
}
