use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::storage::FileStorage;
use crate::types::RoleName;

/// Session lifecycle configuration.
///
/// Required values are constructor parameters; everything else has a
/// default that can be overridden with `with_*` methods.
///
/// ```rust,ignore
/// use portal_session::Config;
///
/// let config = Config::new("https", "backend.example.com")?
///     .with_idle_timeout(std::time::Duration::from_secs(30 * 60));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub(crate) base_url: Url,
    pub(crate) public_endpoints: Vec<String>,
    pub(crate) login_path: String,
    pub(crate) not_found_path: String,
    pub(crate) super_role: RoleName,
    pub(crate) expiry_notice_delay: Duration,
    pub(crate) unauthorized_notice_delay: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) server_logout_timeout: Duration,
    pub(crate) state_dir: PathBuf,
    pub(crate) storage_name: String,
}

impl Config {
    /// API prefix appended to every backend host.
    pub const API_PREFIX: &'static str = "/api";

    /// Configuration for API calls to `{scheme}://{backend_host}/api`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the composed URL is invalid.
    pub fn new(scheme: &str, backend_host: &str) -> Result<Self, Error> {
        let scheme = scheme.trim_end_matches(':');
        let base_url: Url = format!("{scheme}://{backend_host}{}", Self::API_PREFIX)
            .parse()
            .map_err(|e| Error::Config(format!("backend URL: {e}")))?;

        Ok(Self {
            base_url,
            public_endpoints: ["/login", "/register", "/verify-otp", "/resend-otp"]
                .into_iter()
                .map(String::from)
                .collect(),
            login_path: "/guest/login".into(),
            not_found_path: "/not-found".into(),
            super_role: RoleName::from("super-admin"),
            expiry_notice_delay: Duration::from_millis(100),
            unauthorized_notice_delay: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(60 * 60),
            server_logout_timeout: Duration::from_secs(5),
            state_dir: default_state_dir(),
            storage_name: "user-storage".into(),
        })
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `PORTAL_BACKEND`: backend host, optionally with port
    ///
    /// # Optional env vars
    /// - `PORTAL_SCHEME`: `http` (default) or `https`
    /// - `PORTAL_LOGIN_PATH`: unauthenticated landing path
    /// - `PORTAL_NOT_FOUND_PATH`: not-found path
    /// - `PORTAL_IDLE_TIMEOUT_SECS`: idle logout timeout in seconds
    /// - `PORTAL_STATE_DIR`: directory holding the persisted session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        let backend = std::env::var("PORTAL_BACKEND")
            .map_err(|_| Error::Config("PORTAL_BACKEND is required".into()))?;
        let scheme = std::env::var("PORTAL_SCHEME").unwrap_or_else(|_| "http".into());

        let mut config = Self::new(&scheme, &backend)?;

        if let Ok(path) = std::env::var("PORTAL_LOGIN_PATH") {
            config = config.with_login_path(path);
        }
        if let Ok(path) = std::env::var("PORTAL_NOT_FOUND_PATH") {
            config = config.with_not_found_path(path);
        }
        if let Ok(secs) = std::env::var("PORTAL_IDLE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("PORTAL_IDLE_TIMEOUT_SECS: {e}")))?;
            config = config.with_idle_timeout(Duration::from_secs(secs));
        }
        if let Ok(dir) = std::env::var("PORTAL_STATE_DIR") {
            config = config.with_state_dir(dir);
        }

        Ok(config)
    }

    /// Replace the endpoints exempt from credential and expiry checks.
    #[must_use]
    pub fn with_public_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.public_endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_not_found_path(mut self, path: impl Into<String>) -> Self {
        self.not_found_path = path.into();
        self
    }

    /// Role that passes every route guard (default: `super-admin`).
    #[must_use]
    pub fn with_super_role(mut self, role: impl Into<RoleName>) -> Self {
        self.super_role = role.into();
        self
    }

    /// Delay between the notice and the logout when a request is
    /// stopped for an expired credential (default: 100 ms).
    #[must_use]
    pub fn with_expiry_notice_delay(mut self, delay: Duration) -> Self {
        self.expiry_notice_delay = delay;
        self
    }

    /// Delay between the notice and the logout after a 401 (default: 3 s).
    #[must_use]
    pub fn with_unauthorized_notice_delay(mut self, delay: Duration) -> Self {
        self.unauthorized_notice_delay = delay;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Upper bound on the best-effort server logout call (default: 5 s).
    #[must_use]
    pub fn with_server_logout_timeout(mut self, timeout: Duration) -> Self {
        self.server_logout_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = name.into();
        self
    }

    /// API base URL, e.g. `http://backend.example.com/api`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn public_endpoints(&self) -> &[String] {
        &self.public_endpoints
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn not_found_path(&self) -> &str {
        &self.not_found_path
    }

    #[must_use]
    pub fn super_role(&self) -> &RoleName {
        &self.super_role
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// True if `path` contains any public endpoint.
    #[must_use]
    pub fn is_public_endpoint(&self, path: &str) -> bool {
        self.public_endpoints.iter().any(|ep| path.contains(ep.as_str()))
    }

    /// Absolute URL for an API path such as `/users/1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
            .parse()
            .map_err(|e| Error::Config(format!("endpoint {path}: {e}")))
    }

    /// File storage for the persisted session record.
    #[must_use]
    pub fn file_storage(&self) -> FileStorage {
        FileStorage::new(&self.state_dir, &self.storage_name)
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("portal-session")
}
