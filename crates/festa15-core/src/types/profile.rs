//! Guest profile rows, one per signed-in identity.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Segment, UserId};

/// A row of the `profiles` table, keyed by the backend identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,

    /// Name the guest chose. Empty until they fill it in.
    pub display_name: String,

    pub segment: Segment,

    /// Dietary restriction flag collected alongside the RSVP.
    #[serde(default)]
    pub dietary: bool,

    /// Seat assignment made by the admin, if any.
    #[serde(default)]
    pub table_number: Option<u32>,

    /// Unix millis at creation.
    pub created_at: i64,
}

impl UserProfile {
    pub fn new(user_id: UserId, display_name: impl Into<String>, segment: Segment) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            segment,
            dietary: false,
            table_number: None,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Name shown in chat and guest lists, falling back to a shortened id.
    pub fn display_label(&self) -> String {
        if self.display_name.trim().is_empty() {
            format!("Convidado {}", self.user_id.short())
        } else {
            self.display_name.clone()
        }
    }

    pub fn is_admin(&self) -> bool {
        self.segment.is_admin()
    }
}
