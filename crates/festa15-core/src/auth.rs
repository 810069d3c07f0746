//! Invite redemption and the sign-in state machine.
//!
//! ```text
//! AwaitingCode ─validate─► CodeValidated ─┬─ anonymous ────────► ProfileReady
//!                                         ├─ anonymous off ───► EmailRequired
//!                                         │                         │ send link
//!                                         │                         ▼
//!                                         │                    MagicLinkSent
//!                                         │                         │ opened
//!                                         │                         ▼
//!                                         │                    ProfileReady
//!                                         └─ sentinel ─password─► ProfileReady
//! ```
//!
//! Validation never consumes a code. Consumption happens after an identity
//! exists, profile row first and invite flip second, so a crash between
//! the two writes is repaired by simply redeeming again.

use std::fmt;

use serde_json::json;
use tracing::warn;

use crate::backend::{from_row, to_row, AuthSession, Backend, Filter, SelectQuery, Table};
use crate::error::{FestaError, FestaResult};
use crate::invite::{normalize_code, InviteCode, ADMIN_CODE};
use crate::types::{Segment, UserId, UserProfile};

/// A code that passed validation but has not produced a profile yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInvite {
    pub code: String,
    pub segment: Segment,
    /// True for the admin sentinel, which has no backing row.
    pub sentinel: bool,
}

impl ValidatedInvite {
    pub(crate) fn sentinel() -> Self {
        Self {
            code: ADMIN_CODE.to_string(),
            segment: Segment::Admin,
            sentinel: true,
        }
    }

    pub(crate) fn from_invite(invite: InviteCode) -> Self {
        Self {
            code: invite.code,
            segment: invite.segment,
            sentinel: false,
        }
    }
}

/// Where the guest stands between first paint and a live session.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthStage {
    /// No code entered yet.
    #[default]
    AwaitingCode,
    /// Code checked out; an identity is still needed.
    CodeValidated { invite: ValidatedInvite },
    /// Anonymous sign-in is off; the guest must hand over an email.
    EmailRequired { invite: ValidatedInvite },
    /// The magic link is out; waiting for the guest to open it.
    MagicLinkSent { invite: ValidatedInvite, email: String },
    /// Signed in with a profile; the session is live.
    ProfileReady,
}

impl AuthStage {
    pub fn name(&self) -> &'static str {
        match self {
            AuthStage::AwaitingCode => "awaiting_code",
            AuthStage::CodeValidated { .. } => "code_validated",
            AuthStage::EmailRequired { .. } => "email_required",
            AuthStage::MagicLinkSent { .. } => "magic_link_sent",
            AuthStage::ProfileReady => "profile_ready",
        }
    }

    /// The invite the intermediate stages are holding on to.
    pub fn pending_invite(&self) -> Option<&ValidatedInvite> {
        match self {
            AuthStage::CodeValidated { invite }
            | AuthStage::EmailRequired { invite }
            | AuthStage::MagicLinkSent { invite, .. } => Some(invite),
            AuthStage::AwaitingCode | AuthStage::ProfileReady => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AuthStage::ProfileReady)
    }
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What redeeming a code produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    /// Signed in; the session is loaded.
    SignedIn(UserProfile),
    /// Anonymous sign-in is off. Submit an email to continue.
    EmailRequired,
    /// The admin sentinel. Sign in with the admin password to continue.
    AdminPasswordRequired,
}

/// Check `raw` against the invites table.
///
/// The admin sentinel short-circuits before any lookup, so it works even
/// when the table is empty or unreachable.
pub(crate) async fn validate_code(
    backend: &dyn Backend,
    raw: &str,
) -> FestaResult<ValidatedInvite> {
    let code = normalize_code(raw);
    if code.is_empty() {
        return Err(FestaError::InvalidCode(code));
    }
    if code == ADMIN_CODE {
        return Ok(ValidatedInvite::sentinel());
    }

    let row = backend
        .select_optional(Table::Invites, SelectQuery::new().eq("code", code.as_str()))
        .await?
        .ok_or_else(|| FestaError::InvalidCode(code.clone()))?;
    let invite: InviteCode = from_row(row)?;
    if !invite.is_redeemable() {
        return Err(FestaError::AlreadyUsed(invite.code));
    }
    Ok(ValidatedInvite::from_invite(invite))
}

/// Ensure a profile row exists for `session`, then consume the invite.
///
/// Looks up by user id first, so re-running after a partial failure lands
/// on the same profile instead of minting a second one.
pub(crate) async fn materialize_profile(
    backend: &dyn Backend,
    invite: &ValidatedInvite,
    session: &AuthSession,
    display_name: &str,
) -> FestaResult<UserProfile> {
    let existing = backend
        .select_optional(
            Table::Profiles,
            SelectQuery::new().eq("user_id", session.user_id.as_str()),
        )
        .await?;

    let profile = match existing {
        Some(row) => from_row(row)?,
        None => {
            let profile = UserProfile::new(session.user_id.clone(), display_name, invite.segment);
            let stored = backend.insert(Table::Profiles, to_row(&profile)?).await?;
            from_row(stored)?
        }
    };

    if !invite.sentinel {
        consume_invite(backend, &invite.code, &session.user_id).await?;
    }
    Ok(profile)
}

/// Flip the invite to used and record who took it.
///
/// A row that vanished underneath (deleted mid-flight) is tolerated with a
/// warning: the profile already exists, and failing here would strand it.
async fn consume_invite(backend: &dyn Backend, code: &str, user: &UserId) -> FestaResult<()> {
    let updated = backend
        .update(
            Table::Invites,
            json!({ "used": true, "redeemed_by": user }),
            Filter::new().eq("code", code),
        )
        .await?;
    if updated.is_empty() {
        warn!(code, "invite row vanished before it could be consumed");
    }
    Ok(())
}
