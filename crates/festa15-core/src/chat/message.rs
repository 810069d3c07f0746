//! A single chat message.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::{Segment, UserId, UserProfile};

/// A row of the `messages` table plus the denormalized sender profile.
///
/// The backend stores only `sender` as an id; `sender_name` and
/// `sender_segment` are attached when history is loaded or a live row
/// arrives. Locally staged messages carry negative ids so they can never
/// collide with rows the backend numbered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender: UserId,
    pub content: String,

    /// Unix millis.
    pub sent_at: i64,

    #[serde(default)]
    pub sender_name: Option<String>,

    #[serde(default)]
    pub sender_segment: Option<Segment>,
}

impl ChatMessage {
    pub fn new(id: i64, sender: UserId, content: impl Into<String>, sent_at: i64) -> Self {
        Self {
            id,
            sender,
            content: content.into(),
            sent_at,
            sender_name: None,
            sender_segment: None,
        }
    }

    /// A locally staged message awaiting backend confirmation.
    pub fn provisional(id: i64, profile: &UserProfile, content: impl Into<String>) -> Self {
        debug_assert!(id < 0, "provisional ids must be negative");
        Self {
            id,
            sender: profile.user_id.clone(),
            content: content.into(),
            sent_at: Utc::now().timestamp_millis(),
            sender_name: Some(profile.display_label()),
            sender_segment: Some(profile.segment),
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id < 0
    }

    /// Attach the resolved sender profile.
    pub fn with_sender(mut self, profile: &UserProfile) -> Self {
        self.sender_name = Some(profile.display_label());
        self.sender_segment = Some(profile.segment);
        self
    }

    /// Name to show next to the bubble, falling back to a shortened id
    /// when the sender's profile was never resolved.
    pub fn display_sender(&self) -> String {
        self.sender_name
            .clone()
            .unwrap_or_else(|| format!("Convidado {}", self.sender.short()))
    }

    /// Columns for insertion. The backend assigns `id`; the denormalized
    /// sender fields never leave this process.
    pub fn to_insert_row(&self) -> serde_json::Value {
        json!({
            "sender": self.sender,
            "content": self.content,
            "sent_at": self.sent_at,
        })
    }
}
