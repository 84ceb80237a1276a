use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::session::Session;
use crate::storage::SessionStorage;
use crate::types::{Credential, Identity};

/// Single owner of the [`Session`] record.
///
/// All writes go through the named mutators below. Each mutation runs under
/// an exclusive lock, rewrites the persisted snapshot, then publishes the
/// new state to subscribers before returning. Cloning is cheap and shares
/// the same record.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: Mutex<Session>,
    storage: Box<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    tx: watch::Sender<Session>,
}

impl SessionStore {
    /// Opens the store, restoring any persisted session.
    ///
    /// A malformed or incomplete record is treated as no session.
    #[must_use]
    pub fn open(storage: impl SessionStorage) -> Self {
        Self::open_with_clock(storage, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn open_with_clock(storage: impl SessionStorage, clock: Arc<dyn Clock>) -> Self {
        let session = match storage.load() {
            Ok(Some(persisted)) => persisted.into_session().unwrap_or_else(|| {
                tracing::warn!("Persisted session has no credential, starting signed out");
                Session::default()
            }),
            Ok(None) => Session::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Persisted session unreadable, starting signed out");
                Session::default()
            }
        };

        let (tx, _) = watch::channel(session.clone());
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(session),
                storage: Box::new(storage),
                clock,
                tx,
            }),
        }
    }

    /// Cloned view of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.state.lock().clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.lock().identity().cloned()
    }

    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.inner.state.lock().credential.clone()
    }

    #[must_use]
    pub fn credential_expires_at(&self) -> Option<OffsetDateTime> {
        self.inner.state.lock().credential_expires_at
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.inner.state.lock().has_credential()
    }

    /// Current time on the store's clock.
    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.inner.clock.now()
    }

    /// Receiver notified after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.tx.subscribe()
    }

    pub fn set_identity(&self, identity: Option<Identity>) {
        self.mutate(|s| s.identity = identity);
    }

    pub fn set_credential(&self, credential: Option<Credential>) {
        self.mutate(|s| s.credential = credential);
    }

    pub fn set_credential_expiry(&self, expires_at: Option<OffsetDateTime>) {
        self.mutate(|s| s.credential_expires_at = expires_at);
    }

    /// Records a successful sign-in in one mutation.
    pub fn login(
        &self,
        identity: Identity,
        credential: Credential,
        expires_at: Option<OffsetDateTime>,
    ) {
        self.mutate(|s| {
            s.identity = Some(identity);
            s.credential = Some(credential);
            s.credential_expires_at = expires_at;
        });
        tracing::info!(expires_at = ?expires_at, "Session established");
    }

    /// Clears every field and erases the persisted record.
    ///
    /// Idempotent; safe with no session present.
    pub fn logout(&self) {
        let mut state = self.inner.state.lock();
        let was_signed_in = state.has_credential();
        *state = Session::default();
        if let Err(e) = self.inner.storage.erase() {
            tracing::error!(error = %e, "Failed to erase persisted session");
        }
        self.inner.tx.send_replace(state.clone());
        drop(state);

        if was_signed_in {
            tracing::info!("Session cleared");
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut Session)) {
        let mut state = self.inner.state.lock();
        f(&mut state);
        self.persist(&state);
        self.inner.tx.send_replace(state.clone());
    }

    fn persist(&self, session: &Session) {
        let result = if session.is_empty() {
            self.inner.storage.erase()
        } else {
            self.inner.storage.save(&session.to_persisted())
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to persist session");
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}
