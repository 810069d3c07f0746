//! Guest chat: the message model and the ordered feed behind the mural.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      presentation                      │
//! └───────────────▲────────────────────────▲───────────────┘
//!                 │ messages()             │ MessageReceived
//! ┌───────────────┴────────────────────────┴───────────────┐
//! │  ChatFeed: ordered by sent_at, deduplicated by id      │
//! └───────▲───────────────────▲────────────────────▲───────┘
//!         │ history (last 50) │ live inserts        │ staged
//! ┌───────┴───────────────────┴────────┐   ┌────────┴───────┐
//! │            backend rows            │   │  local sends   │
//! └────────────────────────────────────┘   └────────────────┘
//! ```
//!
//! The same feed absorbs the login-time history fetch, rows arriving on
//! the live subscription, and locally staged sends awaiting confirmation.
//! Id-based deduplication is what makes those three sources safe to mix.

pub mod feed;
pub mod message;

pub use feed::ChatFeed;
pub use message::ChatMessage;

/// How many messages the login-time history fetch brings in.
pub const CHAT_HISTORY_LIMIT: usize = 50;
