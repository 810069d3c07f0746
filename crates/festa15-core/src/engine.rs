//! Main FestaEngine - the primary entry point for the festa15 core.
//!
//! FestaEngine coordinates the backend client, the sign-in state machine
//! and the per-session state for:
//! - Invite-code redemption and the auth fallback chain
//! - Loading a guest's session (profile, RSVP, chat history, gallery)
//! - Optimistic writes with rollback on failure
//! - Live chat and theme delivery through backend subscriptions
//! - The admin surface: invite generation, moderation, tables, theming
//!
//! # Example
//!
//! ```ignore
//! use festa15_core::{FestaEngine, RedeemOutcome};
//!
//! let engine = FestaEngine::from_env()?;
//! let mut events = engine.subscribe_events();
//!
//! match engine.redeem_code("G15-J01").await? {
//!     RedeemOutcome::SignedIn(profile) => {
//!         println!("bem-vindo, {}", profile.display_label());
//!     }
//!     RedeemOutcome::EmailRequired => {
//!         engine.continue_with_email("ana@example.com").await?;
//!     }
//!     RedeemOutcome::AdminPasswordRequired => {
//!         // prompt for the admin password, then
//!         // engine.continue_with_admin_password(email, password)
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{
    materialize_profile, validate_code, AuthStage, RedeemOutcome, ValidatedInvite,
};
use crate::backend::{
    from_row, to_row, Backend, ChangeFeed, ChangeKind, Filter, HttpBackend, MockBackend, Order,
    Row, SelectQuery, Table,
};
use crate::chat::{ChatMessage, CHAT_HISTORY_LIMIT};
use crate::config::{BackendConfig, Mode};
use crate::error::{FestaError, FestaResult};
use crate::events::SessionEvent;
use crate::invite::{allocate_codes, InviteCode};
use crate::session::SessionState;
use crate::types::{
    sanitize_filename, CardKind, EventConfig, ModerationStatus, Photo, Rsvp, RsvpStatus, Segment,
    ThemeConfig, ThemePalette, UserId, UserProfile,
};

/// Default capacity for the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Storage bucket holding uploaded photos.
pub const PHOTO_BUCKET: &str = "event-photos";

/// Where the magic link lands the guest after e-mail confirmation.
pub const MAGIC_LINK_REDIRECT: &str = "https://festa15.app/";

/// Refetch attempts when invite allocation races a concurrent generator.
const GENERATE_ATTEMPTS: u32 = 3;

/// Upper bound on a single invite generation request.
const MAX_GENERATE_COUNT: u32 = 100;

/// Everything `load_session` fetches before a session goes live.
struct LoadedSession {
    rsvp: Option<Rsvp>,
    messages: Vec<ChatMessage>,
    photos: Vec<Photo>,
    event: Option<EventConfig>,
    theme: ThemeConfig,
}

/// The application core a single-page UI drives.
///
/// One engine value serves one device. All session state lives behind it;
/// presentation layers read snapshots and react to
/// [`SessionEvent`]s from [`subscribe_events`](Self::subscribe_events).
pub struct FestaEngine {
    /// Hosted service or the in-memory mock, chosen once at construction.
    backend: Arc<dyn Backend>,
    mode: Mode,
    /// Sign-in state machine, advanced only by the flow operations.
    stage: RwLock<AuthStage>,
    /// Shared with the feed delivery tasks.
    state: Arc<RwLock<SessionState>>,
    event_tx: broadcast::Sender<SessionEvent>,
    /// Live feed delivery tasks, aborted on logout.
    feed_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Counter for locally staged row ids, always negative.
    next_provisional: AtomicI64,
}

impl FestaEngine {
    // ═══════════════════════════════════════════════════════════════════════
    // Construction
    // ═══════════════════════════════════════════════════════════════════════

    /// Build from `FESTA_BACKEND_URL` / `FESTA_BACKEND_KEY`.
    pub fn from_env() -> FestaResult<Self> {
        Self::new(BackendConfig::from_env())
    }

    /// Build from an explicit configuration, applying the mode gate once:
    /// unusable credentials select the pre-seeded in-memory mock.
    pub fn new(config: BackendConfig) -> FestaResult<Self> {
        let mode = config.mode();
        let backend: Arc<dyn Backend> = match mode {
            Mode::Mock => {
                info!("backend credentials absent or unusable, running against the in-memory mock");
                Arc::new(MockBackend::with_event_defaults())
            }
            Mode::Online => Arc::new(HttpBackend::from_config(&config)?),
        };
        Ok(Self::with_backend(backend, mode))
    }

    /// Inject a backend directly, bypassing the mode gate. Used by tests.
    pub fn with_backend(backend: Arc<dyn Backend>, mode: Mode) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        info!(%mode, backend = backend.name(), "festa engine ready");

        Self {
            backend,
            mode,
            stage: RwLock::new(AuthStage::AwaitingCode),
            state: Arc::new(RwLock::new(SessionState::new())),
            event_tx,
            feed_tasks: Mutex::new(Vec::new()),
            next_provisional: AtomicI64::new(-1),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Views & Events
    // ═══════════════════════════════════════════════════════════════════════

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Name of the backend actually in use (`"mock"` or `"http"`).
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn auth_stage(&self) -> AuthStage {
        self.stage.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.read().is_active()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state.read().profile().cloned()
    }

    /// Full copy of the session state for rendering.
    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn theme(&self) -> ThemeConfig {
        self.state.read().theme().clone()
    }

    /// The card deck the signed-in guest sees, in page order. Empty while
    /// signed out.
    pub fn visible_cards(&self) -> Vec<CardKind> {
        let segment = self.state.read().profile().map(|p| p.segment);
        match segment {
            Some(segment) => CardKind::for_segment(segment),
            None => Vec::new(),
        }
    }

    /// Subscribe to session events.
    ///
    /// Returns a receiver that will receive events when:
    /// - A session starts or ends
    /// - A chat message arrives (from anyone, including this guest)
    /// - The admin changes the theme
    /// - An operation wants to show a transient notice
    ///
    /// Multiple subscribers can exist; events are broadcast to all, and a
    /// slow subscriber lags rather than blocking the engine.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut events = engine.subscribe_events();
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         match event {
    ///             SessionEvent::MessageReceived { message } => {
    ///                 println!("{}: {}", message.display_sender(), message.content);
    ///             }
    ///             SessionEvent::ThemeChanged { theme } => {
    ///                 apply_palette(theme.palette.spec());
    ///             }
    ///             _ => {}
    ///         }
    ///     }
    /// });
    /// ```
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Invite Redemption & Sign-in
    // ═══════════════════════════════════════════════════════════════════════

    /// Redeem an invite code, the entry point of the whole flow.
    ///
    /// Validates the code, resolves an identity (reusing a persisted
    /// backend session before minting an anonymous one) and materializes
    /// the profile. When anonymous sign-in is disabled on the backend the
    /// flow pauses at [`RedeemOutcome::EmailRequired`]; the admin sentinel
    /// pauses at [`RedeemOutcome::AdminPasswordRequired`]. Entering a new
    /// code restarts the machine from any signed-out stage.
    pub async fn redeem_code(&self, raw: &str) -> FestaResult<RedeemOutcome> {
        let active = self.state.read().profile().cloned();
        if let Some(profile) = active {
            debug!("redeem requested with a live session, returning it");
            return Ok(RedeemOutcome::SignedIn(profile));
        }

        let invite = validate_code(self.backend.as_ref(), raw)
            .await
            .map_err(|err| self.notify_err(err))?;
        info!(code = %invite.code, segment = %invite.segment, "invite code validated");

        if invite.sentinel {
            *self.stage.write() = AuthStage::CodeValidated { invite };
            return Ok(RedeemOutcome::AdminPasswordRequired);
        }

        let session = self
            .backend
            .session()
            .await
            .map_err(|err| self.notify_err(err))?;
        let session = match session {
            Some(session) => session,
            None => match self.backend.sign_in_anonymously().await {
                Ok(session) => session,
                Err(FestaError::AnonymousDisabled) => {
                    debug!("anonymous sign-in disabled, asking for an email");
                    *self.stage.write() = AuthStage::EmailRequired { invite };
                    return Ok(RedeemOutcome::EmailRequired);
                }
                Err(err) => return Err(self.notify_err(err)),
            },
        };

        let profile = self.finish_sign_in(&invite, session.user_id.clone()).await?;
        Ok(RedeemOutcome::SignedIn(profile))
    }

    /// Send the magic link for the email fallback. Valid from
    /// `EmailRequired`, and from `MagicLinkSent` to resend.
    pub async fn continue_with_email(&self, email: &str) -> FestaResult<()> {
        let stage = self.stage.read().clone();
        let invite = match stage {
            AuthStage::EmailRequired { invite } | AuthStage::MagicLinkSent { invite, .. } => invite,
            stage => {
                return Err(self.notify_err(FestaError::InvalidOperation(format!(
                    "no email pending in stage {stage}"
                ))))
            }
        };

        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(self.notify_err(FestaError::InvalidOperation(format!(
                "not an email address: {email:?}"
            ))));
        }

        self.backend
            .send_magic_link(&email, MAGIC_LINK_REDIRECT)
            .await
            .map_err(|err| self.notify_err(err))?;
        info!(email, "magic link sent");
        *self.stage.write() = AuthStage::MagicLinkSent { invite, email };
        self.emit(SessionEvent::success(
            "Link de acesso enviado! Verifique seu e-mail.",
        ));
        Ok(())
    }

    /// Finish the email path once the opened magic link established a
    /// backend session.
    pub async fn complete_sign_in(&self) -> FestaResult<UserProfile> {
        let stage = self.stage.read().clone();
        let invite = match stage {
            AuthStage::MagicLinkSent { invite, .. } | AuthStage::EmailRequired { invite } => invite,
            stage => {
                return Err(self.notify_err(FestaError::InvalidOperation(format!(
                    "no sign-in pending in stage {stage}"
                ))))
            }
        };

        let session = self
            .backend
            .session()
            .await
            .map_err(|err| self.notify_err(err))?
            .ok_or_else(|| self.notify_err(FestaError::NotSignedIn))?;
        self.finish_sign_in(&invite, session.user_id).await
    }

    /// Sign in behind the admin sentinel.
    ///
    /// On the first run the admin account does not exist yet, so a
    /// rejected password sign-in falls back to sign-up exactly once.
    pub async fn continue_with_admin_password(
        &self,
        email: &str,
        password: &str,
    ) -> FestaResult<UserProfile> {
        let stage = self.stage.read().clone();
        let invite = match stage {
            AuthStage::CodeValidated { invite } if invite.sentinel => invite,
            stage => {
                return Err(self.notify_err(FestaError::InvalidOperation(format!(
                    "no admin sign-in pending in stage {stage}"
                ))))
            }
        };

        let session = match self.backend.sign_in_with_password(email, password).await {
            Ok(session) => session,
            Err(FestaError::AuthRejected(reason)) => {
                debug!(reason, "password sign-in rejected, trying first-run sign-up");
                match self.backend.sign_up(email, password).await {
                    Ok(session) => session,
                    Err(err) => return Err(self.notify_err(err)),
                }
            }
            Err(err) => return Err(self.notify_err(err)),
        };

        self.finish_sign_in(&invite, session.user_id).await
    }

    /// Resume a persisted backend session at startup, if one exists and
    /// already has a profile. Without a profile the guest still goes
    /// through the code gate, which reuses the same identity.
    pub async fn restore_session(&self) -> FestaResult<Option<UserProfile>> {
        let active = self.state.read().profile().cloned();
        if let Some(profile) = active {
            return Ok(Some(profile));
        }

        let session = self
            .backend
            .session()
            .await
            .map_err(|err| self.notify_err(err))?;
        let Some(session) = session else {
            debug!("no persisted session to restore");
            return Ok(None);
        };

        let row = self
            .backend
            .select_optional(
                Table::Profiles,
                SelectQuery::new().eq("user_id", session.user_id.as_str()),
            )
            .await
            .map_err(|err| self.notify_err(err))?;
        let Some(row) = row else {
            debug!(user = %session.user_id.short(), "identity has no profile yet");
            return Ok(None);
        };

        let profile: UserProfile = from_row(row).map_err(|err| self.notify_err(err))?;
        self.start_session(profile.clone()).await?;
        Ok(Some(profile))
    }

    /// End the session: stop feeds, sign out of the backend, clear state.
    ///
    /// A failed backend sign-out is logged and the local session is
    /// cleared anyway; logout never strands the guest.
    pub async fn logout(&self) -> FestaResult<()> {
        self.close_live_feeds();
        if let Err(err) = self.backend.sign_out().await {
            warn!(error = %err, "backend sign-out failed, clearing local session anyway");
        }
        self.state.write().logout();
        *self.stage.write() = AuthStage::AwaitingCode;
        info!("session ended");
        self.emit(SessionEvent::SessionEnded);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Guest Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Answer (or re-answer) the RSVP. Upserted by owner, so one guest
    /// never holds two answers.
    pub async fn set_rsvp(&self, status: RsvpStatus, note: Option<String>) -> FestaResult<Rsvp> {
        let profile = self.require_profile()?;
        if !CardKind::Rsvp.visible_to(profile.segment) {
            return Err(self.notify_err(FestaError::NotAuthorized));
        }

        let rsvp = Rsvp::new(profile.user_id.clone(), status, note);
        let row = to_row(&rsvp)?;
        let previous = self.state.write().stage_rsvp(rsvp.clone());

        match self.backend.upsert(Table::Rsvps, row, "user_id").await {
            Ok(stored) => {
                let confirmed = match from_row(stored) {
                    Ok(confirmed) => confirmed,
                    Err(err) => {
                        debug!(error = %err, "unparseable rsvp confirmation, keeping staged value");
                        rsvp
                    }
                };
                self.state.write().commit_rsvp(confirmed.clone());
                self.emit(SessionEvent::success(if status.is_confirmed() {
                    "Presença confirmada!"
                } else {
                    "Resposta registrada."
                }));
                Ok(confirmed)
            }
            Err(err) => {
                self.state.write().rollback_rsvp(previous);
                Err(self.notify_err(err))
            }
        }
    }

    /// Update the guest's own display name and dietary flag.
    pub async fn update_profile(
        &self,
        display_name: &str,
        dietary: bool,
    ) -> FestaResult<UserProfile> {
        let profile = self.require_profile()?;
        let mut next = profile.clone();
        next.display_name = display_name.trim().to_string();
        next.dietary = dietary;

        let previous = self.state.write().stage_profile(next.clone());
        let patch = json!({ "display_name": next.display_name, "dietary": dietary });
        let filter = Filter::new().eq("user_id", profile.user_id.as_str());

        match self.backend.update(Table::Profiles, patch, filter).await {
            Ok(rows) => {
                let confirmed = rows
                    .into_iter()
                    .next()
                    .and_then(|row| from_row(row).ok())
                    .unwrap_or(next);
                self.state.write().commit_profile(confirmed.clone());
                self.emit(SessionEvent::success("Perfil atualizado!"));
                Ok(confirmed)
            }
            Err(err) => {
                self.state.write().rollback_profile(previous);
                Err(self.notify_err(err))
            }
        }
    }

    /// Post to the mural. The message appears immediately as a staged row
    /// and is swapped for the backend's copy on confirmation.
    pub async fn send_chat_message(&self, text: &str) -> FestaResult<ChatMessage> {
        let profile = self.require_profile()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(self.notify_err(FestaError::InvalidOperation(
                "empty chat message".into(),
            )));
        }

        let provisional = ChatMessage::provisional(self.next_provisional_id(), &profile, text);
        let row = provisional.to_insert_row();
        self.state.write().stage_message(provisional.clone());

        match self.backend.insert(Table::Messages, row).await {
            Ok(stored) => {
                let confirmed = match from_row::<ChatMessage>(stored) {
                    Ok(message) => message.with_sender(&profile),
                    Err(err) => {
                        debug!(error = %err, "unparseable message confirmation, keeping staged copy");
                        provisional.clone()
                    }
                };
                self.state
                    .write()
                    .commit_message(provisional.id, confirmed.clone());
                Ok(confirmed)
            }
            Err(err) => {
                self.state.write().rollback_message(provisional.id);
                Err(self.notify_err(err))
            }
        }
    }

    /// Upload a photo: bytes to storage, then a `Pending` row awaiting
    /// moderation. The guest sees their own pending upload right away.
    pub async fn upload_photo(&self, filename: &str, bytes: Bytes) -> FestaResult<Photo> {
        let profile = self.require_profile()?;
        if bytes.is_empty() {
            return Err(self.notify_err(FestaError::InvalidOperation(
                "empty photo upload".into(),
            )));
        }

        let name = sanitize_filename(filename);
        let now = Utc::now().timestamp_millis();
        let path = format!("{}/{}_{}", profile.user_id, now, name);

        self.backend
            .upload(PHOTO_BUCKET, &path, bytes)
            .await
            .map_err(|err| self.notify_err(err))?;
        debug!(path, "photo bytes stored");

        let staged = Photo {
            id: self.next_provisional_id(),
            owner: profile.user_id.clone(),
            storage_path: path,
            status: ModerationStatus::Pending,
            featured: false,
            created_at: now,
        };
        let row = json!({
            "owner": staged.owner,
            "storage_path": staged.storage_path,
            "status": staged.status,
            "featured": false,
            "created_at": staged.created_at,
        });
        self.state.write().stage_photo(staged.clone());

        match self.backend.insert(Table::Photos, row).await {
            Ok(stored) => {
                let confirmed = match from_row(stored) {
                    Ok(confirmed) => confirmed,
                    Err(err) => {
                        debug!(error = %err, "unparseable photo confirmation, keeping staged copy");
                        staged.clone()
                    }
                };
                self.state.write().commit_photo(staged.id, confirmed.clone());
                self.emit(SessionEvent::success("Foto enviada! Aguardando aprovação."));
                Ok(confirmed)
            }
            Err(err) => {
                // the stored object stays orphaned; rows are the source of truth
                self.state.write().rollback_photo(staged.id);
                Err(self.notify_err(err))
            }
        }
    }

    /// Public URL for a stored photo.
    pub fn photo_url(&self, photo: &Photo) -> String {
        self.backend.public_url(PHOTO_BUCKET, &photo.storage_path)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Admin Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Generate `count` fresh invite codes for a guest segment.
    ///
    /// Allocation is numeric max plus one over the codes visible at fetch
    /// time. A uniqueness conflict means another generator raced us, so
    /// the remainder is retried against a refreshed view, bounded at
    /// [`GENERATE_ATTEMPTS`] refetches.
    pub async fn generate_invites(
        &self,
        segment: Segment,
        count: u32,
    ) -> FestaResult<Vec<InviteCode>> {
        self.require_admin()?;
        if count == 0 || count > MAX_GENERATE_COUNT {
            return Err(self.notify_err(FestaError::InvalidOperation(format!(
                "invite count must be between 1 and {MAX_GENERATE_COUNT}, got {count}"
            ))));
        }

        let mut created: Vec<InviteCode> = Vec::with_capacity(count as usize);
        let mut attempts = 0;
        while created.len() < count as usize {
            attempts += 1;
            if attempts > GENERATE_ATTEMPTS {
                return Err(self.notify_err(FestaError::Conflict(format!(
                    "invite allocation kept racing after {GENERATE_ATTEMPTS} attempts"
                ))));
            }

            let existing = self.invite_codes().await.map_err(|err| self.notify_err(err))?;
            let remainder = (count as usize - created.len()) as u32;
            let codes = allocate_codes(&existing, segment, remainder)
                .map_err(|err| self.notify_err(err))?;

            for code in codes {
                let invite = InviteCode::new(code, segment);
                match self.backend.insert(Table::Invites, to_row(&invite)?).await {
                    Ok(row) => created.push(match from_row(row) {
                        Ok(stored) => stored,
                        Err(_) => invite,
                    }),
                    Err(FestaError::Conflict(_)) => {
                        warn!(attempts, "invite code raced with a concurrent generator");
                        break;
                    }
                    Err(err) => return Err(self.notify_err(err)),
                }
            }
        }

        info!(%segment, count = created.len(), "invites generated");
        self.emit(SessionEvent::success(format!(
            "{} convites gerados!",
            created.len()
        )));
        Ok(created)
    }

    /// Every invite row, ordered by code.
    pub async fn list_invites(&self) -> FestaResult<Vec<InviteCode>> {
        self.require_admin()?;
        let rows = self
            .backend
            .select(
                Table::Invites,
                SelectQuery::new().order_by("code", Order::Ascending),
            )
            .await
            .map_err(|err| self.notify_err(err))?;
        Ok(parse_rows(rows, Table::Invites))
    }

    /// Every guest profile, oldest first.
    pub async fn list_guests(&self) -> FestaResult<Vec<UserProfile>> {
        self.require_admin()?;
        let rows = self
            .backend
            .select(
                Table::Profiles,
                SelectQuery::new().order_by("created_at", Order::Ascending),
            )
            .await
            .map_err(|err| self.notify_err(err))?;
        Ok(parse_rows(rows, Table::Profiles))
    }

    /// Assign (or clear, with `None`) a guest's table.
    pub async fn assign_table(
        &self,
        user: &UserId,
        table: Option<u32>,
    ) -> FestaResult<UserProfile> {
        self.require_admin()?;
        let rows = self
            .backend
            .update(
                Table::Profiles,
                json!({ "table_number": table }),
                Filter::new().eq("user_id", user.as_str()),
            )
            .await
            .map_err(|err| self.notify_err(err))?;
        let row = rows.into_iter().next().ok_or_else(|| {
            self.notify_err(FestaError::RowNotFound {
                table: Table::Profiles.as_str(),
            })
        })?;

        let profile: UserProfile = from_row(row).map_err(|err| self.notify_err(err))?;
        info!(user = %user.short(), table = ?table, "table assignment updated");
        self.emit(SessionEvent::success("Mesa atualizada!"));
        Ok(profile)
    }

    /// Uploads awaiting a verdict, oldest first.
    pub async fn list_pending_photos(&self) -> FestaResult<Vec<Photo>> {
        self.require_admin()?;
        let rows = self
            .backend
            .select(
                Table::Photos,
                SelectQuery::new()
                    .eq("status", ModerationStatus::Pending.as_str())
                    .order_by("created_at", Order::Ascending),
            )
            .await
            .map_err(|err| self.notify_err(err))?;
        Ok(parse_rows(rows, Table::Photos))
    }

    /// Approve or reject an upload. The transition is direct and
    /// repeatable; the last verdict wins.
    pub async fn moderate_photo(
        &self,
        photo_id: i64,
        verdict: ModerationStatus,
    ) -> FestaResult<Photo> {
        self.require_admin()?;
        if !verdict.is_verdict() {
            return Err(self.notify_err(FestaError::InvalidOperation(
                "moderation verdict must be APPROVED or REJECTED".into(),
            )));
        }

        let rows = self
            .backend
            .update(
                Table::Photos,
                json!({ "status": verdict }),
                Filter::new().eq("id", photo_id),
            )
            .await
            .map_err(|err| self.notify_err(err))?;
        let row = rows.into_iter().next().ok_or_else(|| {
            self.notify_err(FestaError::RowNotFound {
                table: Table::Photos.as_str(),
            })
        })?;

        let photo: Photo = from_row(row).map_err(|err| self.notify_err(err))?;
        self.state.write().apply_moderation(&photo);
        info!(photo = photo.id, %verdict, "photo moderated");
        self.emit(SessionEvent::success(match verdict {
            ModerationStatus::Approved => "Foto aprovada!",
            _ => "Foto rejeitada.",
        }));
        Ok(photo)
    }

    /// Highlight one approved photo, or remove the highlight.
    ///
    /// At most one photo is featured: featuring clears the previous
    /// highlight first.
    pub async fn set_featured_photo(&self, photo_id: i64, featured: bool) -> FestaResult<Photo> {
        self.require_admin()?;

        let row = self
            .backend
            .select_one(Table::Photos, SelectQuery::new().eq("id", photo_id))
            .await
            .map_err(|err| self.notify_err(err))?;
        let photo: Photo = from_row(row).map_err(|err| self.notify_err(err))?;
        if featured && !photo.is_visible() {
            return Err(self.notify_err(FestaError::InvalidOperation(
                "only approved photos can be featured".into(),
            )));
        }

        if featured {
            self.backend
                .update(
                    Table::Photos,
                    json!({ "featured": false }),
                    Filter::new().eq("featured", true),
                )
                .await
                .map_err(|err| self.notify_err(err))?;
            self.state.write().clear_featured();
        }

        let rows = self
            .backend
            .update(
                Table::Photos,
                json!({ "featured": featured }),
                Filter::new().eq("id", photo_id),
            )
            .await
            .map_err(|err| self.notify_err(err))?;
        let confirmed = match rows.into_iter().next().map(from_row::<Photo>) {
            Some(Ok(confirmed)) => confirmed,
            _ => Photo { featured, ..photo },
        };

        self.state.write().apply_moderation(&confirmed);
        info!(photo = confirmed.id, featured, "featured photo updated");
        self.emit(SessionEvent::success(if featured {
            "Foto destacada!"
        } else {
            "Destaque removido."
        }));
        Ok(confirmed)
    }

    /// Restyle the page for every open session.
    pub async fn set_theme(&self, palette: ThemePalette) -> FestaResult<ThemeConfig> {
        self.require_admin()?;

        let theme = ThemeConfig::new(palette);
        let previous = self.state.read().theme().clone();
        if self.state.write().apply_theme(theme.clone()) {
            self.emit(SessionEvent::ThemeChanged {
                theme: theme.clone(),
            });
        }

        match self.backend.upsert(Table::ThemeConfig, to_row(&theme)?, "id").await {
            Ok(row) => {
                let confirmed = match from_row(row) {
                    Ok(confirmed) => confirmed,
                    Err(err) => {
                        debug!(error = %err, "unparseable theme confirmation, keeping staged value");
                        theme
                    }
                };
                self.state.write().apply_theme(confirmed.clone());
                info!(%palette, "theme updated");
                Ok(confirmed)
            }
            Err(err) => {
                if self.state.write().apply_theme(previous.clone()) {
                    self.emit(SessionEvent::ThemeChanged { theme: previous });
                }
                Err(self.notify_err(err))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Graceful teardown: sign out if a session is live, stop all feeds.
    pub async fn shutdown(self) -> FestaResult<()> {
        info!("shutting down festa engine");
        let active = self.state.read().is_active();
        if active {
            self.logout().await?;
        } else {
            self.close_live_feeds();
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    /// Materialize the profile for a resolved identity and start the
    /// session. Shared tail of every sign-in path.
    async fn finish_sign_in(
        &self,
        invite: &ValidatedInvite,
        user_id: UserId,
    ) -> FestaResult<UserProfile> {
        let session = self
            .backend
            .session()
            .await
            .map_err(|err| self.notify_err(err))?
            .filter(|session| session.user_id == user_id)
            .ok_or_else(|| self.notify_err(FestaError::NotSignedIn))?;

        // guests name themselves later; the sentinel gets a fixed name
        let display_name = if invite.sentinel { "Administrador" } else { "" };
        let profile = materialize_profile(self.backend.as_ref(), invite, &session, display_name)
            .await
            .map_err(|err| self.notify_err(err))?;

        self.start_session(profile.clone()).await?;
        Ok(profile)
    }

    /// Load everything the session shows and flip the engine to
    /// `ProfileReady`.
    async fn start_session(&self, profile: UserProfile) -> FestaResult<()> {
        let loaded = self
            .load_session(&profile)
            .await
            .map_err(|err| self.notify_err(err))?;

        {
            let mut state = self.state.write();
            state.login(
                profile.clone(),
                loaded.rsvp,
                loaded.messages,
                loaded.photos,
                loaded.event,
                loaded.theme,
            );
        }
        *self.stage.write() = AuthStage::ProfileReady;

        if let Err(err) = self.open_live_feeds().await {
            warn!(error = %err, "live feeds unavailable, continuing without realtime");
        }

        info!(user = %profile.user_id.short(), segment = %profile.segment, "session started");
        self.emit(SessionEvent::SessionStarted { profile });
        Ok(())
    }

    /// One round of reads for everything a fresh session renders.
    async fn load_session(&self, profile: &UserProfile) -> FestaResult<LoadedSession> {
        let rsvp = match self
            .backend
            .select_optional(
                Table::Rsvps,
                SelectQuery::new().eq("user_id", profile.user_id.as_str()),
            )
            .await?
        {
            Some(row) => Some(from_row(row)?),
            None => None,
        };

        // newest 50; the feed reorders them ascending for display
        let message_rows = self
            .backend
            .select(
                Table::Messages,
                SelectQuery::new()
                    .order_by("sent_at", Order::Descending)
                    .limit(CHAT_HISTORY_LIMIT),
            )
            .await?;
        let messages = self
            .resolve_senders(parse_rows(message_rows, Table::Messages))
            .await;

        let mut photos: Vec<Photo> = parse_rows(
            self.backend
                .select(
                    Table::Photos,
                    SelectQuery::new()
                        .eq("status", ModerationStatus::Approved.as_str())
                        .order_by("created_at", Order::Ascending),
                )
                .await?,
            Table::Photos,
        );
        let own: Vec<Photo> = parse_rows(
            self.backend
                .select(
                    Table::Photos,
                    SelectQuery::new().eq("owner", profile.user_id.as_str()),
                )
                .await?,
            Table::Photos,
        );
        for photo in own {
            if matches!(photo.status, ModerationStatus::Pending) {
                photos.push(photo);
            }
        }

        let event = match self
            .backend
            .select_optional(Table::EventConfig, SelectQuery::new().eq("id", 1))
            .await?
        {
            Some(row) => Some(from_row(row)?),
            None => None,
        };

        let theme = match self
            .backend
            .select_optional(Table::ThemeConfig, SelectQuery::new().eq("id", 1))
            .await?
        {
            Some(row) => from_row(row)?,
            None => ThemeConfig::default(),
        };

        Ok(LoadedSession {
            rsvp,
            messages,
            photos,
            event,
            theme,
        })
    }

    /// Attach sender profiles to a batch of history messages, one lookup
    /// per distinct sender.
    async fn resolve_senders(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut profiles: HashMap<UserId, Option<UserProfile>> = HashMap::new();
        let mut resolved = Vec::with_capacity(messages.len());
        for message in messages {
            if !profiles.contains_key(&message.sender) {
                let profile = lookup_profile(self.backend.as_ref(), &message.sender).await;
                profiles.insert(message.sender.clone(), profile);
            }
            resolved.push(match profiles.get(&message.sender).and_then(Option::as_ref) {
                Some(profile) => message.with_sender(profile),
                None => message,
            });
        }
        resolved
    }

    /// Start the chat and theme delivery tasks for the current session.
    async fn open_live_feeds(&self) -> FestaResult<()> {
        self.close_live_feeds();

        let messages = self
            .backend
            .subscribe(Table::Messages, ChangeKind::Insert)
            .await?;
        let themes = self
            .backend
            .subscribe(Table::ThemeConfig, ChangeKind::Update)
            .await?;

        let mut tasks = self.feed_tasks.lock();
        tasks.push(tokio::spawn(run_message_feed(
            messages,
            Arc::clone(&self.backend),
            Arc::clone(&self.state),
            self.event_tx.clone(),
        )));
        tasks.push(tokio::spawn(run_theme_feed(
            themes,
            Arc::clone(&self.state),
            self.event_tx.clone(),
        )));
        Ok(())
    }

    /// Abort the delivery tasks. Dropping a task's feed aborts the
    /// producer behind it, so nothing keeps polling after this returns.
    fn close_live_feeds(&self) {
        let mut tasks = self.feed_tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    fn require_profile(&self) -> FestaResult<UserProfile> {
        let profile = self.state.read().profile().cloned();
        profile.ok_or_else(|| self.notify_err(FestaError::NotSignedIn))
    }

    fn require_admin(&self) -> FestaResult<UserProfile> {
        let profile = self.require_profile()?;
        if !profile.is_admin() {
            return Err(self.notify_err(FestaError::NotAuthorized));
        }
        Ok(profile)
    }

    /// All invite code strings currently visible in the backend.
    async fn invite_codes(&self) -> FestaResult<Vec<String>> {
        let rows = self.backend.select(Table::Invites, SelectQuery::new()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("code").and_then(Row::as_str).map(String::from))
            .collect())
    }

    fn next_provisional_id(&self) -> i64 {
        self.next_provisional.fetch_sub(1, Ordering::Relaxed)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Emit the guest-facing notice for a failure and pass it through.
    fn notify_err(&self, err: FestaError) -> FestaError {
        debug!(error = %err, "operation failed");
        self.emit(SessionEvent::error(err.user_message()));
        err
    }
}

impl Drop for FestaEngine {
    fn drop(&mut self) {
        self.close_live_feeds();
    }
}

/// Parse rows into domain values, dropping and logging any that do not
/// fit. A malformed row never takes the whole read down.
fn parse_rows<T: DeserializeOwned>(rows: Vec<Row>, table: Table) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match from_row(row) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%table, error = %err, "dropping unparseable row");
                None
            }
        })
        .collect()
}

/// Fetch the profile behind `user`, tolerating absence and read failures.
async fn lookup_profile(backend: &dyn Backend, user: &UserId) -> Option<UserProfile> {
    let query = SelectQuery::new().eq("user_id", user.as_str());
    match backend.select_optional(Table::Profiles, query).await {
        Ok(Some(row)) => match from_row(row) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(user = %user.short(), error = %err, "unparseable profile row");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!(user = %user.short(), error = %err, "profile lookup failed");
            None
        }
    }
}

/// Deliver live chat rows into the session until the feed closes.
async fn run_message_feed(
    mut feed: ChangeFeed,
    backend: Arc<dyn Backend>,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
) {
    let mut senders: HashMap<UserId, Option<UserProfile>> = HashMap::new();
    while let Some(row) = feed.next().await {
        let message: ChatMessage = match from_row(row) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping unparseable chat row");
                continue;
            }
        };

        if !senders.contains_key(&message.sender) {
            let profile = lookup_profile(backend.as_ref(), &message.sender).await;
            senders.insert(message.sender.clone(), profile);
        }
        let message = match senders.get(&message.sender).and_then(Option::as_ref) {
            Some(profile) => message.with_sender(profile),
            None => message,
        };

        let fresh = state.write().receive_message(message.clone());
        if fresh {
            let _ = events.send(SessionEvent::MessageReceived { message });
        }
    }
    debug!("message feed closed");
}

/// Apply live theme rows until the feed closes.
async fn run_theme_feed(
    mut feed: ChangeFeed,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
) {
    while let Some(row) = feed.next().await {
        match from_row::<ThemeConfig>(row) {
            Ok(theme) => {
                let changed = state.write().apply_theme(theme.clone());
                if changed {
                    let _ = events.send(SessionEvent::ThemeChanged { theme });
                }
            }
            Err(err) => warn!(error = %err, "dropping unparseable theme row"),
        }
    }
    debug!("theme feed closed");
}
