//! RSVP state, one row per guest.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::UserId;

/// Attendance answer. Absence of a row means the guest has not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RsvpStatus {
    Confirmed,
    Declined,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Confirmed => "CONFIRMED",
            RsvpStatus::Declined => "DECLINED",
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, RsvpStatus::Confirmed)
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of the `rsvps` table, keyed by `user_id`. Re-answering replaces
/// the row, so one guest never holds two answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rsvp {
    pub user_id: UserId,
    pub status: RsvpStatus,

    /// Free-form note for the hosts, e.g. a dietary detail.
    #[serde(default)]
    pub note: Option<String>,

    /// Unix millis of the latest answer.
    pub updated_at: i64,
}

impl Rsvp {
    pub fn new(user_id: UserId, status: RsvpStatus, note: Option<String>) -> Self {
        Self {
            user_id,
            status,
            note: note.filter(|n| !n.trim().is_empty()),
            updated_at: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_stored_form() {
        assert_eq!(
            serde_json::to_string(&RsvpStatus::Confirmed).unwrap(),
            "\"CONFIRMED\""
        );
        let back: RsvpStatus = serde_json::from_str("\"DECLINED\"").unwrap();
        assert_eq!(back, RsvpStatus::Declined);
        assert!(!back.is_confirmed());
    }

    #[test]
    fn test_blank_note_is_dropped() {
        let rsvp = Rsvp::new(UserId::new("u-1"), RsvpStatus::Confirmed, Some("  ".into()));
        assert_eq!(rsvp.note, None);

        let rsvp = Rsvp::new(
            UserId::new("u-1"),
            RsvpStatus::Confirmed,
            Some("sem glúten".into()),
        );
        assert_eq!(rsvp.note.as_deref(), Some("sem glúten"));
    }

    #[test]
    fn test_row_roundtrip() {
        let rsvp = Rsvp::new(UserId::new("u-9"), RsvpStatus::Declined, None);
        let row = serde_json::to_value(&rsvp).unwrap();
        assert_eq!(row["status"], "DECLINED");
        let back: Rsvp = serde_json::from_value(row).unwrap();
        assert_eq!(back, rsvp);
    }
}
