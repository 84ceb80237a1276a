use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::Error;
use crate::store::SessionStore;
use crate::surface::Surface;

/// Tells the backend the user is signing out.
///
/// Called on a best-effort basis: failures and timeouts are logged and
/// never hold back the client-side logout.
pub trait ServerLogout: Send + Sync + 'static {
    fn notify_server_logout(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// User input that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    PointerMove,
    KeyPress,
}

/// Signs the user out after a period without input.
///
/// Armed only while the store holds a credential. Every recorded
/// [`Activity`] pushes the deadline back by the full idle timeout. The
/// background task stops when the monitor is dropped.
pub struct IdleMonitor {
    activity: Arc<Notify>,
    deadline: watch::Receiver<Option<Instant>>,
    task: JoinHandle<()>,
}

impl IdleMonitor {
    /// Spawns the monitor on the current tokio runtime.
    #[must_use]
    pub fn spawn<L: ServerLogout>(
        store: SessionStore,
        server: L,
        surface: Arc<dyn Surface>,
        config: &Config,
    ) -> Self {
        let activity = Arc::new(Notify::new());
        let (deadline_tx, deadline) = watch::channel(None);

        let task = IdleTask {
            store,
            server,
            surface,
            activity: Arc::clone(&activity),
            deadline_tx,
            timeout: config.idle_timeout,
            server_logout_timeout: config.server_logout_timeout,
            login_path: config.login_path.clone(),
        };

        Self {
            activity,
            deadline,
            task: tokio::spawn(task.run()),
        }
    }

    /// Monitor wired to a gateway's store, surface and `/logout` call.
    #[cfg(feature = "gateway")]
    #[must_use]
    pub fn for_gateway(gateway: &crate::gateway::Gateway) -> Self {
        Self::spawn(
            gateway.store().clone(),
            gateway.clone(),
            Arc::clone(gateway.surface()),
            gateway.config(),
        )
    }

    /// Restarts the idle countdown. Cheap enough to call on every pointer event.
    pub fn record_activity(&self, _activity: Activity) {
        self.activity.notify_one();
    }

    /// When the user will be signed out absent further activity.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.borrow()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline().is_some()
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct IdleTask<L> {
    store: SessionStore,
    server: L,
    surface: Arc<dyn Surface>,
    activity: Arc<Notify>,
    deadline_tx: watch::Sender<Option<Instant>>,
    timeout: Duration,
    server_logout_timeout: Duration,
    login_path: String,
}

impl<L: ServerLogout> IdleTask<L> {
    async fn run(self) {
        let mut sessions = self.store.subscribe();
        let mut deadline: Option<Instant> = None;

        loop {
            if !sessions.borrow_and_update().has_credential() {
                if deadline.take().is_some() {
                    tracing::debug!("Idle timer disarmed");
                }
                self.publish(None);
                if sessions.changed().await.is_err() {
                    return;
                }
                continue;
            }

            let at = *deadline.get_or_insert_with(|| Instant::now() + self.timeout);
            self.publish(Some(at));

            tokio::select! {
                () = self.activity.notified() => {
                    deadline = Some(Instant::now() + self.timeout);
                }
                changed = sessions.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = tokio::time::sleep_until(at) => {
                    self.expire().await;
                    deadline = None;
                }
            }
        }
    }

    fn publish(&self, deadline: Option<Instant>) {
        self.deadline_tx.send_if_modified(|current| {
            let changed = *current != deadline;
            *current = deadline;
            changed
        });
    }

    async fn expire(&self) {
        tracing::info!(timeout_secs = self.timeout.as_secs(), "Idle timeout reached, signing out");

        match tokio::time::timeout(self.server_logout_timeout, self.server.notify_server_logout())
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Server logout failed, continuing"),
            Err(_) => tracing::debug!("Server logout timed out, continuing"),
        }

        self.store.logout();
        self.surface.redirect(&self.login_path);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::surface::{ChannelSurface, SurfaceEvent};
    use crate::test_support::{drain, settle};
    use crate::types::{Credential, Identity};

    const HOUR: Duration = Duration::from_secs(60 * 60);
    const MINUTE: Duration = Duration::from_secs(60);

    #[derive(Clone, Default)]
    struct CountingLogout {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ServerLogout for CountingLogout {
        async fn notify_server_logout(&self) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Rejected("backend down".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Never answers; the monitor must time out and sign out anyway.
    struct HangingLogout;

    impl ServerLogout for HangingLogout {
        async fn notify_server_logout(&self) -> Result<(), Error> {
            std::future::pending().await
        }
    }

    fn config() -> Config {
        Config::new("http", "localhost").unwrap()
    }

    fn signed_in_store() -> SessionStore {
        let store = SessionStore::open(MemoryStorage::new());
        store.login(Identity::with_id("u1"), Credential::new("abc"), None);
        store
    }

    fn monitor<L: ServerLogout>(
        store: &SessionStore,
        server: L,
    ) -> (IdleMonitor, tokio::sync::mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (surface, events) = ChannelSurface::new();
        let monitor = IdleMonitor::spawn(store.clone(), server, Arc::new(surface), &config());
        (monitor, events)
    }

    #[tokio::test(start_paused = true)]
    async fn signs_out_once_after_full_idle_window() {
        let store = signed_in_store();
        let server = CountingLogout::default();
        let (monitor, mut events) = monitor(&store, server.clone());
        settle().await;
        assert!(monitor.is_armed());

        tokio::time::advance(HOUR).await;
        settle().await;

        assert!(store.snapshot().is_empty());
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut events),
            vec![SurfaceEvent::Redirect("/guest/login".into())]
        );
        assert!(!monitor.is_armed());

        tokio::time::advance(HOUR * 3).await;
        settle().await;
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_restarts_the_countdown() {
        let store = signed_in_store();
        let server = CountingLogout::default();
        let (monitor, _events) = monitor(&store, server.clone());
        settle().await;

        tokio::time::advance(MINUTE * 59).await;
        settle().await;
        monitor.record_activity(Activity::PointerMove);
        settle().await;

        tokio::time::advance(MINUTE + Duration::from_secs(1)).await;
        settle().await;
        assert!(store.has_credential(), "first deadline must not fire");

        tokio::time::advance(MINUTE * 58).await;
        settle().await;
        assert!(store.has_credential());

        tokio::time::advance(MINUTE).await;
        settle().await;
        assert!(!store.has_credential());
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dormant_without_credential() {
        let store = SessionStore::open(MemoryStorage::new());
        let server = CountingLogout::default();
        let (monitor, _events) = monitor(&store, server.clone());
        settle().await;
        assert!(!monitor.is_armed());

        monitor.record_activity(Activity::KeyPress);
        tokio::time::advance(HOUR * 2).await;
        settle().await;
        assert_eq!(server.calls.load(Ordering::SeqCst), 0);

        store.login(Identity::with_id("u1"), Credential::new("abc"), None);
        settle().await;
        assert!(monitor.is_armed());

        store.logout();
        settle().await;
        assert!(!monitor.is_armed());

        tokio::time::advance(HOUR * 2).await;
        settle().await;
        assert_eq!(server.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn server_failure_does_not_block_logout() {
        let store = signed_in_store();
        let server = CountingLogout {
            fail: true,
            ..CountingLogout::default()
        };
        let (_monitor, mut events) = monitor(&store, server.clone());
        settle().await;

        tokio::time::advance(HOUR).await;
        settle().await;

        assert!(!store.has_credential());
        assert_eq!(
            drain(&mut events),
            vec![SurfaceEvent::Redirect("/guest/login".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_server_is_abandoned_after_timeout() {
        let store = signed_in_store();
        let (_monitor, _events) = monitor(&store, HangingLogout);
        settle().await;

        tokio::time::advance(HOUR).await;
        settle().await;
        assert!(store.has_credential(), "still waiting on the server");

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert!(!store.has_credential());
    }

    #[tokio::test(start_paused = true)]
    async fn identity_refresh_keeps_deadline() {
        let store = signed_in_store();
        let (monitor, _events) = monitor(&store, CountingLogout::default());
        settle().await;
        let armed_at = monitor.deadline().unwrap();

        tokio::time::advance(MINUTE * 10).await;
        store.set_identity(Some(Identity::with_id("u1").with_attribute("name", "Ada".into())));
        settle().await;

        assert_eq!(monitor.deadline(), Some(armed_at));
    }

    #[cfg(feature = "gateway")]
    #[tokio::test(start_paused = true)]
    async fn activity_does_not_cancel_forced_logout() {
        let mut h = crate::test_support::Harness::unreachable();
        h.sign_in_expiring_in(time::Duration::minutes(-1));
        let monitor = IdleMonitor::for_gateway(&h.gateway);
        settle().await;
        assert!(monitor.is_armed());

        assert!(matches!(h.gateway.get("/users").await, Err(Error::SessionExpired)));
        tokio::time::advance(Duration::from_millis(50)).await;
        monitor.record_activity(Activity::KeyPress);
        settle().await;
        assert!(h.store.has_credential());

        tokio::time::advance(Duration::from_millis(50)).await;
        settle().await;

        assert!(!h.store.has_credential());
        assert!(!monitor.is_armed());
        assert_eq!(
            drain(&mut h.events),
            vec![
                SurfaceEvent::Notice(crate::surface::Notice::SessionExpired),
                SurfaceEvent::Redirect("/guest/login".into()),
            ]
        );
    }
}
