//! Festa15 Core Library
//!
//! Invite-gated guest app engine for a quinceañera, backed by a hosted
//! backend-as-a-service.
//!
//! ## Overview
//!
//! Guests receive a printed invite code (`G15-J07`, `G15-A02`), redeem it
//! to get a session, and land on a single page of cards: event details,
//! RSVP, photo gallery and a live message wall. The host redeems a
//! sentinel code plus password for an extra admin card with invite
//! generation, photo moderation, table assignments and page theming.
//!
//! All persistence, auth, storage and realtime delivery are delegated to
//! the hosted backend through one [`Backend`] trait. When no backend is
//! configured the engine runs against a pre-seeded in-memory mock, so the
//! whole app works at the kitchen table before the project has any
//! infrastructure.
//!
//! ## Core Principles
//!
//! - **One client, one trait**: every backend touch goes through
//!   [`Backend`]; nothing else in the crate knows about HTTP
//! - **Optimistic by default**: writes land in local state immediately
//!   and roll back if the backend refuses them
//! - **No failure is fatal**: errors become guest-facing notices and the
//!   session keeps going
//!
//! ## Quick Start
//!
//! ```ignore
//! use festa15_core::{FestaEngine, RedeemOutcome, RsvpStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     festa15_core::logging::install("./diagnostics")?;
//!     let engine = FestaEngine::from_env()?;
//!
//!     if let RedeemOutcome::SignedIn(profile) = engine.redeem_code("G15-J01").await? {
//!         println!("bem-vindo, {}", profile.display_label());
//!
//!         engine
//!             .set_rsvp(RsvpStatus::Confirmed, Some("sem glúten".into()))
//!             .await?;
//!         engine.send_chat_message("Contando os dias! 🎉").await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backend;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod invite;
pub mod logging;
pub mod session;
pub mod types;

// Re-exports
pub use auth::{AuthStage, RedeemOutcome, ValidatedInvite};
pub use backend::{
    from_row, to_row, AuthSession, Backend, ChangeFeed, ChangeKind, Filter, HttpBackend,
    MockBackend, Order, Row, SelectQuery, Table,
};
pub use chat::{ChatFeed, ChatMessage, CHAT_HISTORY_LIMIT};
pub use config::{BackendConfig, Mode};
pub use engine::{FestaEngine, MAGIC_LINK_REDIRECT, PHOTO_BUCKET};
pub use error::{FestaError, FestaResult};
pub use events::{NoticeKind, SessionEvent};
pub use invite::{InviteCode, ADMIN_CODE};
pub use session::SessionState;
pub use types::*;
