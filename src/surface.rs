//! Boundary to the view layer: transient notices and navigation.

use derive_more::Display;
use tokio::sync::mpsc;

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// User-visible transient notice.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[non_exhaustive]
pub enum Notice {
    /// Credential expired or rejected; a forced logout follows.
    #[display("Session expired, logging out...")]
    SessionExpired,
    /// No response was received.
    #[display("Network error. Please check your connection.")]
    Connectivity,
    #[display("You don't have permission.")]
    Forbidden,
    #[display("Resource not found.")]
    NotFound,
    #[display("Server error. Please try again later.")]
    Server,
    /// Failure with no usable message in the body.
    #[display("An unexpected error occurred.")]
    Unexpected,
    /// Failure message supplied by the server.
    #[display("{_0}")]
    Message(String),
    #[display("{_0}")]
    Info(String),
}

impl Notice {
    #[must_use]
    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::SessionExpired | Self::Info(_) => NoticeLevel::Info,
            _ => NoticeLevel::Error,
        }
    }
}

/// Receives notices and redirects on behalf of the UI.
///
/// Both calls must return promptly; implementations hand the event to the
/// UI loop rather than render inline.
pub trait Surface: Send + Sync + 'static {
    fn notify(&self, notice: Notice);

    /// Full-page navigation to `path`.
    fn redirect(&self, path: &str);
}

/// Surface that only logs. Useful for headless clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSurface;

impl Surface for TracingSurface {
    fn notify(&self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Info => tracing::info!(notice = %notice, "Notice"),
            NoticeLevel::Error => tracing::warn!(notice = %notice, "Notice"),
        }
    }

    fn redirect(&self, path: &str) {
        tracing::info!(path, "Redirect");
    }
}

/// Event forwarded by [`ChannelSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Notice(Notice),
    Redirect(String),
}

/// Forwards every notice and redirect over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
}

impl ChannelSurface {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SurfaceEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Surface receiver dropped");
        }
    }
}

impl Surface for ChannelSurface {
    fn notify(&self, notice: Notice) {
        self.send(SurfaceEvent::Notice(notice));
    }

    fn redirect(&self, path: &str) {
        self.send(SurfaceEvent::Redirect(path.to_owned()));
    }
}
