//! Core domain types shared across the engine.

pub mod cards;
pub mod event;
pub mod photo;
pub mod profile;
pub mod rsvp;

pub use cards::{CardKind, CardSpec};
pub use event::{EventConfig, PaletteSpec, ThemeConfig, ThemePalette};
pub use photo::{sanitize_filename, ModerationStatus, Photo};
pub use profile::UserProfile;
pub use rsvp::{Rsvp, RsvpStatus};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend-assigned identity of a signed-in guest.
///
/// Opaque to the engine; the hosted service issues UUIDs but nothing here
/// depends on that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs and fallback display names.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Guest segment, fixed when the invite is generated.
///
/// Stored uppercase in backend rows. `Admin` exists only through the
/// sentinel code path and never has invites of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Segment {
    Young,
    Adult,
    Admin,
}

impl Segment {
    /// Stored form, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Young => "YOUNG",
            Segment::Adult => "ADULT",
            Segment::Admin => "ADMIN",
        }
    }

    /// Invite code prefix for this segment, if it has one.
    pub fn invite_prefix(&self) -> Option<&'static str> {
        match self {
            Segment::Young => Some("G15-J"),
            Segment::Adult => Some("G15-A"),
            Segment::Admin => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Segment::Admin)
    }

    /// Case-insensitive parse of the stored form.
    pub fn parse(value: &str) -> Option<Segment> {
        match value.trim().to_uppercase().as_str() {
            "YOUNG" => Some(Segment::Young),
            "ADULT" => Some(Segment::Adult),
            "ADMIN" => Some(Segment::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_short() {
        let id = UserId::new("0b9fcbbc-5b2e-4d41-9f2a-000000000000");
        assert_eq!(id.short(), "0b9fcbbc");

        let tiny = UserId::new("abc");
        assert_eq!(tiny.short(), "abc");
    }

    #[test]
    fn test_user_id_serde_is_transparent() {
        let id = UserId::new("u-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"u-1\"");

        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_segment_stored_form() {
        assert_eq!(Segment::Young.as_str(), "YOUNG");
        assert_eq!(
            serde_json::to_string(&Segment::Adult).unwrap(),
            "\"ADULT\""
        );
        let back: Segment = serde_json::from_str("\"ADMIN\"").unwrap();
        assert_eq!(back, Segment::Admin);
    }

    #[test]
    fn test_segment_parse_is_case_insensitive() {
        assert_eq!(Segment::parse("young"), Some(Segment::Young));
        assert_eq!(Segment::parse(" Adult "), Some(Segment::Adult));
        assert_eq!(Segment::parse("guest"), None);
    }

    #[test]
    fn test_invite_prefixes() {
        assert_eq!(Segment::Young.invite_prefix(), Some("G15-J"));
        assert_eq!(Segment::Adult.invite_prefix(), Some("G15-A"));
        assert_eq!(Segment::Admin.invite_prefix(), None);
    }
}
