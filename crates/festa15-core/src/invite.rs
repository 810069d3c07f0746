//! Invite codes: normalization, formatting, and sequential allocation.
//!
//! Codes follow `<prefix><NN>`: a segment prefix (`G15-J` young, `G15-A`
//! adult) followed by a zero-padded sequence number, e.g. `G15-J07`.
//! `G15-ADMIN` is a sentinel that opens the admin sign-in path and never
//! exists as a row. Allocation is numeric max plus one per prefix, so
//! codes stay short enough to read over the phone and gaps from deleted
//! rows are never reused.

use serde::{Deserialize, Serialize};

use crate::error::{FestaError, FestaResult};
use crate::types::{Segment, UserId};

/// Sentinel code for the admin path. Checked before any backend lookup.
pub const ADMIN_CODE: &str = "G15-ADMIN";

/// Minimum digits in the sequence number.
pub const CODE_NUMBER_WIDTH: usize = 2;

/// A row of the `invites` table.
///
/// `used` flips exactly once, at redemption, and `redeemed_by` records the
/// identity that consumed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    pub segment: Segment,

    #[serde(default)]
    pub used: bool,

    #[serde(default)]
    pub redeemed_by: Option<UserId>,
}

impl InviteCode {
    pub fn new(code: impl Into<String>, segment: Segment) -> Self {
        Self {
            code: code.into(),
            segment,
            used: false,
            redeemed_by: None,
        }
    }

    pub fn is_redeemable(&self) -> bool {
        !self.used
    }
}

/// Uppercase and trim guest input before lookup, so `g15-j01 ` matches.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Render `prefix` plus a zero-padded `number`, e.g. `G15-J07`.
///
/// Numbers past the padding width keep all their digits.
pub fn format_code(prefix: &str, number: u32) -> String {
    format!("{prefix}{number:0width$}", width = CODE_NUMBER_WIDTH)
}

/// Sequence number of `code` under `prefix`, if the suffix is all digits.
pub fn code_number(code: &str, prefix: &str) -> Option<u32> {
    let digits = code.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Next free sequence number: numeric max over `existing` plus one, or 1
/// when no code under `prefix` exists yet. Codes that do not parse under
/// this prefix are ignored.
pub fn next_number<'a>(existing: impl IntoIterator<Item = &'a str>, prefix: &str) -> u32 {
    existing
        .into_iter()
        .filter_map(|code| code_number(code, prefix))
        .max()
        .map_or(1, |n| n + 1)
}

/// Allocate `count` fresh codes for `segment` on top of `existing`.
///
/// Pure: the caller inserts the codes and retries on a uniqueness
/// conflict with a refreshed view.
pub fn allocate_codes(existing: &[String], segment: Segment, count: u32) -> FestaResult<Vec<String>> {
    let prefix = segment.invite_prefix().ok_or_else(|| {
        FestaError::InvalidOperation(format!("segment {segment} has no invite prefix"))
    })?;
    let start = next_number(existing.iter().map(String::as_str), prefix);
    Ok((start..start + count)
        .map(|number| format_code(prefix, number))
        .collect())
}
