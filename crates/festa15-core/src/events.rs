//! Events the engine broadcasts to presentation layers.

use crate::chat::ChatMessage;
use crate::types::{ThemeConfig, UserProfile};

/// Severity of a transient notice banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
        }
    }
}

/// Broadcast after engine state changes.
///
/// Subscribers get their own receiver from
/// [`FestaEngine::subscribe_events`](crate::engine::FestaEngine::subscribe_events);
/// slow ones lag rather than block the engine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A profile finished materializing and the session is live.
    SessionStarted { profile: UserProfile },

    /// Logout completed; all session state is gone.
    SessionEnded,

    /// A chat message arrived (from anyone, including this guest).
    MessageReceived { message: ChatMessage },

    /// The admin restyled the page.
    ThemeChanged { theme: ThemeConfig },

    /// Transient feedback for the guest.
    Notice { kind: NoticeKind, text: String },
}

impl SessionEvent {
    pub fn success(text: impl Into<String>) -> Self {
        SessionEvent::Notice {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        SessionEvent::Notice {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }

    /// Variant label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::SessionEnded => "session_ended",
            SessionEvent::MessageReceived { .. } => "message_received",
            SessionEvent::ThemeChanged { .. } => "theme_changed",
            SessionEvent::Notice { .. } => "notice",
        }
    }
}
