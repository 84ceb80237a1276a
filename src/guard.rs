use crate::config::Config;
use crate::session::Session;
use crate::types::RoleName;

/// Outcome of a route guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Render the destination.
    Granted,
    /// Render nothing. The caller is already redirecting a signed-out user.
    Withheld,
    /// Navigate elsewhere instead of rendering.
    Redirect(String),
}

/// Role-based authorization for UI destinations.
///
/// Holds no session state; every check reads the session it is given.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    super_role: RoleName,
    not_found_path: String,
}

impl RouteGuard {
    #[must_use]
    pub fn new(super_role: impl Into<RoleName>, not_found_path: impl Into<String>) -> Self {
        Self {
            super_role: super_role.into(),
            not_found_path: not_found_path.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.super_role().clone(), config.not_found_path())
    }

    /// Decides whether `session` may view a destination open to `required`.
    ///
    /// `None` and an empty list both admit any signed-in identity.
    /// A denial redirects to the not-found path, so the destination's
    /// existence is not revealed.
    #[must_use]
    pub fn check(&self, session: &Session, required: Option<&[RoleName]>) -> Access {
        let Some(identity) = session.identity() else {
            return Access::Withheld;
        };

        let roles = identity.roles();
        if roles.contains(&self.super_role) {
            return Access::Granted;
        }

        match required {
            Some(required) if !required.is_empty() && !roles.intersects(required) => {
                tracing::debug!(?required, "Route denied");
                Access::Redirect(self.not_found_path.clone())
            }
            _ => Access::Granted,
        }
    }
}
