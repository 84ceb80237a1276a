use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;
use crate::gateway::Gateway;
use crate::idle::ServerLogout;
use crate::surface::Notice;
use crate::types::{Credential, Identity};

/// Credentials for `POST /login`.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// Emails are sent trimmed and lowercased.
    #[must_use]
    pub fn new(email: &str, password: impl Into<String>) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Account details for `POST /register`.
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: &str,
        password: impl Into<String>,
        password_confirmation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.trim().to_lowercase(),
            password: password.into(),
            password_confirmation: password_confirmation.into(),
        }
    }
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Body returned by the login and registration endpoints.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<Identity>,
    #[serde(default)]
    pub token: Option<Credential>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Serialize)]
struct ChangePassword<'a> {
    new_password: &'a str,
    new_password_confirmation: &'a str,
}

/// Sign-in, sign-out and account calls on top of a [`Gateway`].
#[derive(Debug, Clone)]
pub struct AuthClient {
    gateway: Gateway,
}

impl AuthClient {
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Signs in and stores the returned identity, credential and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] if the backend declines the credentials,
    /// or any gateway error (validation failures arrive as [`Error::Api`]
    /// with status 422).
    pub async fn login(&self, request: &LoginRequest) -> Result<Identity, Error> {
        let response: AuthResponse = self.gateway.post_json("/login", request).await?;
        self.establish(response)
    }

    /// Creates an account and signs in with it.
    ///
    /// # Errors
    ///
    /// As [`AuthClient::login`].
    pub async fn register(&self, request: &RegisterRequest) -> Result<Identity, Error> {
        let response: AuthResponse = self.gateway.post_json("/register", request).await?;
        self.establish(response)
    }

    /// Re-fetches the identity from `GET /user`.
    ///
    /// Returns `Ok(None)` without a request if signed out, and discards
    /// the result if the session changed while the request was in flight.
    ///
    /// # Errors
    ///
    /// Any gateway error.
    pub async fn refresh_identity(&self) -> Result<Option<Identity>, Error> {
        let store = self.gateway.store();
        let Some(credential) = store.credential() else {
            return Ok(None);
        };

        let envelope: DataEnvelope<Identity> = self.gateway.get_json("/user").await?;

        if store.credential().as_ref() != Some(&credential) {
            tracing::debug!("Session changed during identity refresh, discarding result");
            return Ok(None);
        }

        store.set_identity(Some(envelope.data.clone()));
        Ok(Some(envelope.data))
    }

    /// Changes the signed-in user's password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] without an identity, otherwise any
    /// gateway error.
    pub async fn change_password(
        &self,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), Error> {
        let id = self
            .gateway
            .store()
            .identity()
            .and_then(|identity| identity.id())
            .ok_or(Error::Unauthenticated)?;

        let path = format!("/users/{}/change-password", urlencoding::encode(&id));
        let body = ChangePassword {
            new_password,
            new_password_confirmation: confirmation,
        };
        self.gateway.patch(&path, &body).await?;

        self.gateway
            .surface()
            .notify(Notice::Info("Password Updated!".into()));
        Ok(())
    }

    /// Signs out: tells the backend if it can, then always clears the
    /// local session and redirects to the login path.
    pub async fn logout(&self) {
        if let Err(e) = self.gateway.notify_server_logout().await {
            tracing::debug!(error = %e, "Server logout failed, continuing");
        }
        self.gateway.store().logout();
        self.gateway
            .surface()
            .redirect(self.gateway.config().login_path());
    }

    fn establish(&self, response: AuthResponse) -> Result<Identity, Error> {
        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| Notice::Unexpected.to_string());
            self.gateway
                .surface()
                .notify(Notice::Message(message.clone()));
            return Err(Error::Rejected(message));
        }

        let credential = response
            .token
            .ok_or_else(|| Error::Rejected("response carried no token".into()))?;
        let identity = response.user.unwrap_or_default();

        self.gateway
            .store()
            .login(identity.clone(), credential, response.expires_at);
        Ok(identity)
    }
}

impl ServerLogout for AuthClient {
    async fn notify_server_logout(&self) -> Result<(), Error> {
        self.gateway.notify_server_logout().await
    }
}
