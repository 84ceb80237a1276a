#![doc = include_str!("../README.md")]

#[cfg(feature = "gateway")]
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
#[cfg(feature = "gateway")]
pub mod gateway;
pub mod guard;
pub mod idle;
pub mod session;
pub mod storage;
pub mod store;
pub mod surface;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
#[cfg(feature = "gateway")]
pub use auth::{AuthClient, AuthResponse, LoginRequest, RegisterRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{ApiError, Error, ErrorBody};
#[cfg(feature = "gateway")]
pub use gateway::{Gateway, classify_failure};
pub use guard::{Access, RouteGuard};
pub use idle::{Activity, IdleMonitor, ServerLogout};
pub use session::{PersistedSession, Session};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
pub use store::SessionStore;
pub use surface::{ChannelSurface, Notice, NoticeLevel, Surface, SurfaceEvent, TracingSurface};
pub use types::{Credential, Identity, RoleName, RoleSet};
