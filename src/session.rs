use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{Credential, Identity};

/// Current session state.
///
/// Fields are only written through [`SessionStore`](crate::SessionStore);
/// readers get a cloned snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub(crate) identity: Option<Identity>,
    pub(crate) credential: Option<Credential>,
    pub(crate) credential_expires_at: Option<OffsetDateTime>,
}

impl Session {
    /// The signed-in identity. Without a credential there is no identity,
    /// whatever is stored, and an attribute-less record counts as absent.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.credential.as_ref()?;
        self.identity.as_ref().filter(|i| !i.is_empty())
    }

    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    #[must_use]
    pub fn credential_expires_at(&self) -> Option<OffsetDateTime> {
        self.credential_expires_at
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// True if an expiry is recorded and lies strictly before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.credential_expires_at.is_some_and(|at| at < now)
    }

    /// Credential usable for a request at `now`; expired counts as none.
    #[must_use]
    pub fn active_credential(&self, now: OffsetDateTime) -> Option<&Credential> {
        if self.is_expired_at(now) {
            None
        } else {
            self.credential.as_ref()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identity.is_none() && self.credential.is_none() && self.credential_expires_at.is_none()
    }

    pub(crate) fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            identity: self.identity.clone(),
            credential: self.credential.clone(),
            credential_expires_at: self.credential_expires_at,
        }
    }
}

/// The persisted subset of a [`Session`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub credential: Option<Credential>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub credential_expires_at: Option<OffsetDateTime>,
}

impl PersistedSession {
    /// Rebuilds a session from storage. A record without a credential
    /// yields an empty session.
    #[must_use]
    pub fn into_session(self) -> Option<Session> {
        self.credential.as_ref()?;
        Some(Session {
            identity: self.identity,
            credential: self.credential,
            credential_expires_at: self.credential_expires_at,
        })
    }
}
