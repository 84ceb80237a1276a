use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{ApiError, Error, ErrorBody};
use crate::idle::ServerLogout;
use crate::store::SessionStore;
use crate::surface::{Notice, Surface};
use crate::types::Credential;

/// HTTP client for every backend call.
///
/// Before sending, a request to a non-public endpoint is stopped if the
/// stored credential has expired; otherwise the credential is attached as a
/// bearer token. Failure responses are turned into exactly one [`Notice`]
/// and then returned to the caller unchanged as an [`Error`]. Expiry and
/// `401` additionally clear the session and redirect to the login path
/// after a short delay.
#[derive(Clone)]
pub struct Gateway {
    http: reqwest::Client,
    config: Arc<Config>,
    store: SessionStore,
    surface: Arc<dyn Surface>,
}

impl Gateway {
    #[must_use]
    pub fn new(config: Config, store: SessionStore, surface: impl Surface) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
            store,
            surface: Arc::new(surface),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// # Errors
    ///
    /// See [`Gateway::send`].
    pub async fn get(&self, path: &str) -> Result<Response, Error> {
        self.execute(Method::GET, path, |req| req).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`].
    pub async fn delete(&self, path: &str) -> Result<Response, Error> {
        self.execute(Method::DELETE, path, |req| req).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`].
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, Error> {
        self.execute(Method::POST, path, |req| req.json(body)).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`].
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, Error> {
        self.execute(Method::PUT, path, |req| req.json(body)).await
    }

    /// # Errors
    ///
    /// See [`Gateway::send`].
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, Error> {
        self.execute(Method::PATCH, path, |req| req.json(body)).await
    }

    /// Sends `method` to `path` (relative to the API base) with an optional JSON body.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionExpired`] if the credential expired before sending.
    /// - [`Error::Http`] if no response was received.
    /// - [`Error::Api`] for any non-success status.
    /// - [`Error::Config`] if `path` does not form a valid URL.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, Error> {
        self.execute(method, path, |req| match body {
            Some(body) => req.json(body),
            None => req,
        })
        .await
    }

    /// GET and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// As [`Gateway::send`], plus [`Error::Http`] if the body does not decode.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self.get(path).await?;
        self.decode(response, &Method::GET, path).await
    }

    /// POST a JSON body and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// As [`Gateway::send`], plus [`Error::Http`] if the body does not decode.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(path, body).await?;
        self.decode(response, &Method::POST, path).await
    }

    /// Decodes a success body; a body that does not match `T` is a failure
    /// like any other and gets its notice here.
    async fn decode<T: DeserializeOwned>(
        &self,
        response: Response,
        method: &Method,
        path: &str,
    ) -> Result<T, Error> {
        match response.json::<T>().await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(error = %e, %method, path, "Undecodable response body");
                self.surface.notify(Notice::Unexpected);
                Err(e.into())
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, Error> {
        let credential = self.preflight(path)?;
        let url = self.config.endpoint(path)?;

        let mut request = body(self.http.request(method.clone(), url));
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, %method, path, "No response from backend");
                self.surface.notify(Notice::Connectivity);
                return Err(e.into());
            }
        };

        if response.status().is_success() {
            return Ok(response);
        }
        Err(self.on_failure(response, &method, path).await)
    }

    /// Credential to attach, or [`Error::SessionExpired`] if the request
    /// must not leave the client.
    fn preflight(&self, path: &str) -> Result<Option<Credential>, Error> {
        if self.config.is_public_endpoint(path) {
            return Ok(None);
        }

        let session = self.store.snapshot();
        if session.is_expired_at(self.store.now()) {
            tracing::warn!(path, "Credential expired, request not sent");
            self.surface.notify(Notice::SessionExpired);
            self.schedule_logout(self.config.expiry_notice_delay);
            return Err(Error::SessionExpired);
        }

        Ok(session.credential().cloned())
    }

    async fn on_failure(&self, response: Response, method: &Method, path: &str) -> Error {
        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(bytes) => ErrorBody::parse(&bytes),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read error body");
                ErrorBody::default()
            }
        };

        tracing::warn!(status, %method, path, "Request failed");
        self.surface.notify(classify_failure(status, &body));

        if status == 401 {
            self.schedule_logout(self.config.unauthorized_notice_delay);
        }

        Error::Api(ApiError::new(status, body))
    }

    /// Clears the session and redirects to login once `delay` has passed,
    /// leaving time for the notice to render.
    ///
    /// Skipped if the credential changed meanwhile: a sign-in that landed
    /// during the delay is not the session that failed.
    fn schedule_logout(&self, delay: Duration) {
        let store = self.store.clone();
        let surface = Arc::clone(&self.surface);
        let login_path = self.config.login_path.clone();
        let failed = store.credential();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if store.credential() != failed {
                tracing::debug!("Session changed before forced logout, skipping");
                return;
            }
            store.logout();
            surface.redirect(&login_path);
            tracing::warn!("Signed out after session expiry");
        });
    }
}

/// `GET /logout` with whatever credential is held, expired or not.
///
/// The caller signs out locally no matter what, so this skips the expiry
/// check and raises no notices; failures are only returned.
impl ServerLogout for Gateway {
    async fn notify_server_logout(&self) -> Result<(), Error> {
        let mut request = self.http.get(self.config.endpoint("/logout")?);
        if let Some(credential) = self.store.credential() {
            request = request.bearer_auth(credential.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.map(|b| ErrorBody::parse(&b)).unwrap_or_default();
        Err(Error::Api(ApiError::new(status.as_u16(), body)))
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.config.base_url().as_str())
            .finish_non_exhaustive()
    }
}

/// Notice shown for a failure response.
#[must_use]
pub fn classify_failure(status: u16, body: &ErrorBody) -> Notice {
    match status {
        401 => Notice::SessionExpired,
        403 => Notice::Forbidden,
        404 => Notice::NotFound,
        s if s >= 500 => Notice::Server,
        _ => match &body.message {
            Some(message) if !message.is_empty() => Notice::Message(message.clone()),
            _ => Notice::Unexpected,
        },
    }
}
