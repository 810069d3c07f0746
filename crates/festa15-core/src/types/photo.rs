//! Gallery photos and their moderation lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::UserId;

/// Moderation state of an uploaded photo.
///
/// Uploads land as `Pending` and only the admin moves them on. Guests see
/// `Approved` photos; `Rejected` ones stay in storage but never render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "PENDING",
            ModerationStatus::Approved => "APPROVED",
            ModerationStatus::Rejected => "REJECTED",
        }
    }

    /// True for the two states an admin can assign.
    pub fn is_verdict(&self) -> bool {
        !matches!(self, ModerationStatus::Pending)
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of the `photos` table. The image bytes live in object storage
/// under `storage_path`; the row only carries metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub owner: UserId,
    pub storage_path: String,
    pub status: ModerationStatus,

    /// Highlighted in the gallery. At most one photo at a time.
    #[serde(default)]
    pub featured: bool,

    /// Unix millis at upload.
    pub created_at: i64,
}

impl Photo {
    /// Whether the photo renders in the guest gallery.
    pub fn is_visible(&self) -> bool {
        matches!(self.status, ModerationStatus::Approved)
    }
}

/// Strip everything but ASCII alphanumerics from an upload filename,
/// preserving the extension. Empty results fall back to `foto`.
pub fn sanitize_filename(name: &str) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    let clean_stem: String = stem.chars().filter(char::is_ascii_alphanumeric).collect();
    let stem = if clean_stem.is_empty() {
        "foto".to_string()
    } else {
        clean_stem
    };

    match ext {
        Some(ext) => {
            let clean_ext: String = ext.chars().filter(char::is_ascii_alphanumeric).collect();
            if clean_ext.is_empty() {
                stem
            } else {
                format!("{stem}.{clean_ext}")
            }
        }
        None => stem,
    }
}
