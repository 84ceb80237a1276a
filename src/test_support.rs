#[cfg(feature = "gateway")]
use std::net::SocketAddr;
#[cfg(feature = "gateway")]
use std::sync::Arc;

#[cfg(feature = "gateway")]
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::surface::SurfaceEvent;
#[cfg(feature = "gateway")]
use crate::{
    clock::{Clock, ManualClock},
    config::Config,
    gateway::Gateway,
    storage::MemoryStorage,
    store::SessionStore,
    surface::ChannelSurface,
    types::{Credential, Identity, RoleSet},
};

#[cfg(feature = "gateway")]
pub(crate) struct Harness {
    pub(crate) gateway: Gateway,
    pub(crate) store: SessionStore,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) events: UnboundedReceiver<SurfaceEvent>,
}

#[cfg(feature = "gateway")]
impl Harness {
    /// Gateway pointed at `addr`, with config tweaks applied.
    pub(crate) fn against(addr: SocketAddr, tweak: impl FnOnce(Config) -> Config) -> Self {
        let config = tweak(Config::new("http", &addr.to_string()).unwrap());
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let store =
            SessionStore::open_with_clock(MemoryStorage::new(), Arc::clone(&clock) as Arc<dyn Clock>);
        let (surface, events) = ChannelSurface::new();
        let gateway = Gateway::new(config, store.clone(), surface);

        Self {
            gateway,
            store,
            clock,
            events,
        }
    }

    /// Gateway whose backend never answers; for tests that send nothing.
    pub(crate) fn unreachable() -> Self {
        Self::against(SocketAddr::from(([127, 0, 0, 1], 9)), |c| c)
    }

    pub(crate) fn sign_in_expiring_in(&self, ttl: time::Duration) {
        let roles: RoleSet = ["admin"].into_iter().collect();
        self.store.login(
            Identity::with_id("u1").with_roles(roles),
            Credential::new("abc"),
            Some(self.clock.now() + ttl),
        );
    }
}

#[cfg(feature = "gateway")]
pub(crate) async fn spawn_backend(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Address nothing listens on.
#[cfg(feature = "gateway")]
pub(crate) async fn unreachable_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub(crate) fn drain(events: &mut UnboundedReceiver<SurfaceEvent>) -> Vec<SurfaceEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Lets spawned tasks run to their next suspension point.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
