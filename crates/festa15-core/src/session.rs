//! Per-login session state.
//!
//! Fields are private: presentation code reads through the accessor
//! methods and every mutation is a named transition called from the
//! engine. That keeps the set of possible state changes enumerable by
//! reading this file alone, and it is where optimistic writes get their
//! stage, commit and rollback steps.

use crate::chat::{ChatFeed, ChatMessage};
use crate::types::{EventConfig, ModerationStatus, Photo, Rsvp, ThemeConfig, UserProfile};

/// Everything one signed-in guest sees, assembled at login and torn down
/// at logout.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    profile: Option<UserProfile>,
    rsvp: Option<Rsvp>,
    chat: ChatFeed,
    /// Approved photos plus this guest's own not-yet-approved uploads.
    photos: Vec<Photo>,
    event: Option<EventConfig>,
    theme: ThemeConfig,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── read-only views ─────────────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.profile.is_some()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn rsvp(&self) -> Option<&Rsvp> {
        self.rsvp.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.chat.messages()
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    /// The highlighted photo, if an approved one is flagged.
    pub fn featured_photo(&self) -> Option<&Photo> {
        self.photos.iter().find(|p| p.featured && p.is_visible())
    }

    pub fn event(&self) -> Option<&EventConfig> {
        self.event.as_ref()
    }

    pub fn theme(&self) -> &ThemeConfig {
        &self.theme
    }

    // ── named transitions ───────────────────────────────────────────────

    pub(crate) fn login(
        &mut self,
        profile: UserProfile,
        rsvp: Option<Rsvp>,
        history: Vec<ChatMessage>,
        photos: Vec<Photo>,
        event: Option<EventConfig>,
        theme: ThemeConfig,
    ) {
        self.profile = Some(profile);
        self.rsvp = rsvp;
        self.chat = ChatFeed::from_history(history);
        self.photos = photos;
        self.event = event;
        self.theme = theme;
    }

    pub(crate) fn logout(&mut self) {
        *self = Self::default();
    }

    /// A live chat row arrived. Returns `false` for a duplicate.
    pub(crate) fn receive_message(&mut self, message: ChatMessage) -> bool {
        self.chat.push(message)
    }

    /// A theme row arrived. Returns `false` when nothing changed.
    pub(crate) fn apply_theme(&mut self, theme: ThemeConfig) -> bool {
        if self.theme == theme {
            return false;
        }
        self.theme = theme;
        true
    }

    /// Fold a moderation verdict into the gallery.
    pub(crate) fn apply_moderation(&mut self, photo: &Photo) {
        match photo.status {
            ModerationStatus::Approved => {
                if let Some(slot) = self.photos.iter_mut().find(|p| p.id == photo.id) {
                    *slot = photo.clone();
                } else {
                    self.photos.push(photo.clone());
                }
            }
            _ => self.photos.retain(|p| p.id != photo.id),
        }
    }

    pub(crate) fn clear_featured(&mut self) {
        for photo in &mut self.photos {
            photo.featured = false;
        }
    }

    // ── optimistic reconciliation ───────────────────────────────────────
    //
    // stage_* applies the hoped-for value and returns what to restore,
    // commit_* settles on the backend's representation, rollback_*
    // restores the snapshot after a failed write.

    pub(crate) fn stage_rsvp(&mut self, next: Rsvp) -> Option<Rsvp> {
        self.rsvp.replace(next)
    }

    pub(crate) fn commit_rsvp(&mut self, confirmed: Rsvp) {
        self.rsvp = Some(confirmed);
    }

    pub(crate) fn rollback_rsvp(&mut self, previous: Option<Rsvp>) {
        self.rsvp = previous;
    }

    pub(crate) fn stage_profile(&mut self, next: UserProfile) -> Option<UserProfile> {
        self.profile.replace(next)
    }

    pub(crate) fn commit_profile(&mut self, confirmed: UserProfile) {
        self.profile = Some(confirmed);
    }

    pub(crate) fn rollback_profile(&mut self, previous: Option<UserProfile>) {
        self.profile = previous;
    }

    pub(crate) fn stage_message(&mut self, provisional: ChatMessage) {
        self.chat.push(provisional);
    }

    pub(crate) fn commit_message(&mut self, provisional_id: i64, confirmed: ChatMessage) {
        self.chat.confirm(provisional_id, confirmed);
    }

    pub(crate) fn rollback_message(&mut self, provisional_id: i64) {
        self.chat.remove(provisional_id);
    }

    pub(crate) fn stage_photo(&mut self, provisional: Photo) {
        self.photos.push(provisional);
    }

    pub(crate) fn commit_photo(&mut self, provisional_id: i64, confirmed: Photo) {
        if let Some(slot) = self.photos.iter_mut().find(|p| p.id == provisional_id) {
            *slot = confirmed;
        } else {
            self.photos.push(confirmed);
        }
    }

    pub(crate) fn rollback_photo(&mut self, provisional_id: i64) {
        self.photos.retain(|p| p.id != provisional_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RsvpStatus, Segment, UserId};

    fn profile() -> UserProfile {
        UserProfile::new(UserId::new("u-1"), "Ana", Segment::Young)
    }

    fn photo(id: i64, status: ModerationStatus, featured: bool) -> Photo {
        Photo {
            id,
            owner: UserId::new("u-1"),
            storage_path: format!("u-1/{id}.jpg"),
            status,
            featured,
            created_at: id,
        }
    }

    #[test]
    fn test_login_then_logout_round_trip() {
        let mut state = SessionState::new();
        assert!(!state.is_active());

        state.login(
            profile(),
            Some(Rsvp::new(UserId::new("u-1"), RsvpStatus::Confirmed, None)),
            vec![ChatMessage::new(1, UserId::new("u-2"), "oi", 10)],
            vec![photo(1, ModerationStatus::Approved, false)],
            None,
            ThemeConfig::default(),
        );
        assert!(state.is_active());
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.photos().len(), 1);

        state.logout();
        assert!(!state.is_active());
        assert!(state.messages().is_empty());
        assert!(state.photos().is_empty());
        assert_eq!(state.rsvp(), None);
    }

    #[test]
    fn test_rsvp_stage_commit_rollback() {
        let mut state = SessionState::new();
        let first = Rsvp::new(UserId::new("u-1"), RsvpStatus::Confirmed, None);
        let second = Rsvp::new(UserId::new("u-1"), RsvpStatus::Declined, None);

        assert_eq!(state.stage_rsvp(first.clone()), None);
        state.commit_rsvp(first.clone());

        let snapshot = state.stage_rsvp(second);
        assert_eq!(snapshot.as_ref(), Some(&first));

        state.rollback_rsvp(snapshot);
        assert_eq!(state.rsvp().unwrap().status, RsvpStatus::Confirmed);
    }

    #[test]
    fn test_message_reconciliation() {
        let mut state = SessionState::new();
        state.stage_message(ChatMessage::new(-1, UserId::new("u-1"), "oi", 10));
        state.commit_message(-1, ChatMessage::new(5, UserId::new("u-1"), "oi", 10));

        let ids: Vec<i64> = state.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5]);

        state.stage_message(ChatMessage::new(-2, UserId::new("u-1"), "x", 20));
        state.rollback_message(-2);
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_moderation_updates_gallery() {
        let mut state = SessionState::new();
        state.stage_photo(photo(1, ModerationStatus::Pending, false));

        // approval keeps (and refreshes) the row
        state.apply_moderation(&photo(1, ModerationStatus::Approved, false));
        assert!(state.photos()[0].is_visible());

        // rejection removes it
        state.apply_moderation(&photo(1, ModerationStatus::Rejected, false));
        assert!(state.photos().is_empty());

        // approving an unseen photo adds it
        state.apply_moderation(&photo(2, ModerationStatus::Approved, true));
        assert_eq!(state.featured_photo().map(|p| p.id), Some(2));
    }

    #[test]
    fn test_clear_featured() {
        let mut state = SessionState::new();
        state.stage_photo(photo(1, ModerationStatus::Approved, true));
        state.stage_photo(photo(2, ModerationStatus::Approved, false));
        state.clear_featured();
        assert_eq!(state.featured_photo(), None);
    }

    #[test]
    fn test_theme_dedup() {
        let mut state = SessionState::new();
        let theme = ThemeConfig::default();
        assert!(!state.apply_theme(theme.clone()));

        let changed = ThemeConfig::new(crate::types::ThemePalette::Neon);
        assert!(state.apply_theme(changed.clone()));
        assert!(!state.apply_theme(changed));
    }
}
