//! The admin surface end to end: invite generation, photo moderation,
//! table assignments and theming.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use festa15_core::{
    AuthSession, Backend, ChangeFeed, ChangeKind, FestaEngine, FestaResult, Filter, MockBackend,
    Mode, ModerationStatus, RedeemOutcome, Row, Segment, SelectQuery, Table, ThemePalette,
};

async fn admin_engine(backend: Arc<dyn Backend>) -> FestaEngine {
    let engine = FestaEngine::with_backend(backend, Mode::Mock);
    assert_eq!(
        engine.redeem_code("G15-ADMIN").await.unwrap(),
        RedeemOutcome::AdminPasswordRequired
    );
    engine
        .continue_with_admin_password("host@festa15.app", "s3cret")
        .await
        .unwrap();
    engine
}

async fn guest_engine(mock: Arc<MockBackend>, code: &str) -> FestaEngine {
    let engine = FestaEngine::with_backend(mock, Mode::Mock);
    match engine.redeem_code(code).await.unwrap() {
        RedeemOutcome::SignedIn(_) => engine,
        other => panic!("expected SignedIn, got {other:?}"),
    }
}

// ============================================================================
// Invite Generation
// ============================================================================

/// Freshly generated codes continue the printed sequence and are
/// immediately redeemable by a guest.
#[tokio::test]
async fn test_generated_codes_are_redeemable() {
    let mock = Arc::new(MockBackend::with_event_defaults());
    let admin = admin_engine(mock.clone()).await;

    let fresh = admin.generate_invites(Segment::Adult, 2).await.unwrap();
    let codes: Vec<&str> = fresh.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["G15-A03", "G15-A04"]);

    let listed = admin.list_invites().await.unwrap();
    assert_eq!(listed.len(), 7);
    admin.logout().await.unwrap();

    // a guest redeems one of the new codes on their own device
    let guest = guest_engine(mock.clone(), "G15-A03").await;
    assert_eq!(guest.profile().unwrap().segment, Segment::Adult);

    let invites = mock.table_rows(Table::Invites);
    let row = invites.iter().find(|r| r["code"] == "G15-A03").unwrap();
    assert_eq!(row["used"], true);
}

/// Two admin devices generating at once: each call still returns its
/// full batch and no code is handed out twice.
#[tokio::test]
async fn test_concurrent_generation_yields_disjoint_codes() {
    let mock = Arc::new(MockBackend::with_event_defaults());
    let admin = admin_engine(mock.clone()).await;

    let (a, b) = futures::future::join(
        admin.generate_invites(Segment::Young, 3),
        admin.generate_invites(Segment::Young, 3),
    )
    .await;

    let mut all: Vec<String> = a
        .unwrap()
        .into_iter()
        .chain(b.unwrap())
        .map(|i| i.code)
        .collect();
    assert_eq!(all.len(), 6);
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 6, "the two batches overlap");

    // 3 seeded young codes plus the 6 fresh ones
    let young = mock
        .table_rows(Table::Invites)
        .iter()
        .filter(|r| r["segment"] == "YOUNG")
        .count();
    assert_eq!(young, 9);
}

/// Delegates to the mock, but the first invite insert loses the race:
/// the same code lands from "another device" just before it.
struct RacingBackend {
    inner: Arc<MockBackend>,
    raced: AtomicBool,
}

#[async_trait]
impl Backend for RacingBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn select(&self, table: Table, query: SelectQuery) -> FestaResult<Vec<Row>> {
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: Table, row: Row) -> FestaResult<Row> {
        if table == Table::Invites && !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.insert(table, row.clone()).await.unwrap();
        }
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: Table, patch: Row, filter: Filter) -> FestaResult<Vec<Row>> {
        self.inner.update(table, patch, filter).await
    }

    async fn upsert(&self, table: Table, row: Row, conflict_column: &str) -> FestaResult<Row> {
        self.inner.upsert(table, row, conflict_column).await
    }

    async fn session(&self) -> FestaResult<Option<AuthSession>> {
        self.inner.session().await
    }

    async fn sign_in_anonymously(&self) -> FestaResult<AuthSession> {
        self.inner.sign_in_anonymously().await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> FestaResult<AuthSession> {
        self.inner.sign_in_with_password(email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> FestaResult<AuthSession> {
        self.inner.sign_up(email, password).await
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> FestaResult<()> {
        self.inner.send_magic_link(email, redirect_to).await
    }

    async fn sign_out(&self) -> FestaResult<()> {
        self.inner.sign_out().await
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Bytes) -> FestaResult<()> {
        self.inner.upload(bucket, path, bytes).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.inner.public_url(bucket, path)
    }

    async fn subscribe(&self, table: Table, change: ChangeKind) -> FestaResult<ChangeFeed> {
        self.inner.subscribe(table, change).await
    }
}

/// A lost insert race is retried against a refreshed view of the codes,
/// and the batch never exceeds the requested count.
#[tokio::test]
async fn test_generation_retries_after_losing_a_race() {
    let mock = Arc::new(MockBackend::with_event_defaults());
    let racing = Arc::new(RacingBackend {
        inner: mock.clone(),
        raced: AtomicBool::new(false),
    });
    let admin = admin_engine(racing).await;

    let fresh = admin.generate_invites(Segment::Young, 2).await.unwrap();
    let codes: Vec<&str> = fresh.iter().map(|i| i.code.as_str()).collect();
    // J04 went to the winner; the retry picked up after it
    assert_eq!(codes, vec!["G15-J05", "G15-J06"]);

    let invites = mock.table_rows(Table::Invites);
    let mut young: Vec<&str> = invites
        .iter()
        .filter(|r| r["segment"] == "YOUNG")
        .filter_map(|r| r["code"].as_str())
        .collect();
    young.sort_unstable();
    assert_eq!(
        young,
        vec!["G15-J01", "G15-J02", "G15-J03", "G15-J04", "G15-J05", "G15-J06"]
    );
}

// ============================================================================
// Photo Moderation
// ============================================================================

/// Uploads queue for the admin oldest first; verdicts update the shared
/// gallery.
#[tokio::test]
async fn test_moderation_queue_and_gallery() {
    let mock = Arc::new(MockBackend::with_event_defaults());

    let guest = guest_engine(mock.clone(), "G15-J01").await;
    let first = guest
        .upload_photo("bolo.jpg", Bytes::from_static(b"one"))
        .await
        .unwrap();
    let second = guest
        .upload_photo("pista.jpg", Bytes::from_static(b"two"))
        .await
        .unwrap();
    guest.logout().await.unwrap();

    let admin = admin_engine(mock.clone()).await;
    let pending = admin.list_pending_photos().await.unwrap();
    assert_eq!(
        pending.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    admin
        .moderate_photo(first.id, ModerationStatus::Approved)
        .await
        .unwrap();
    admin
        .moderate_photo(second.id, ModerationStatus::Rejected)
        .await
        .unwrap();
    assert!(admin.list_pending_photos().await.unwrap().is_empty());

    // the admin's own gallery reflects the verdicts without a re-login
    let gallery = admin.snapshot();
    assert_eq!(gallery.photos().len(), 1);
    assert_eq!(gallery.photos()[0].id, first.id);
    admin.logout().await.unwrap();

    // a later guest login sees only the approved photo
    let late = guest_engine(mock.clone(), "G15-J02").await;
    let snapshot = late.snapshot();
    assert_eq!(snapshot.photos().len(), 1);
    assert!(snapshot.photos()[0].is_visible());
}

/// Featuring moves the highlight, never multiplies it.
#[tokio::test]
async fn test_featured_photo_is_singular() {
    let mock = Arc::new(MockBackend::with_event_defaults());

    let guest = guest_engine(mock.clone(), "G15-J01").await;
    let a = guest
        .upload_photo("a.jpg", Bytes::from_static(b"a"))
        .await
        .unwrap();
    let b = guest
        .upload_photo("b.jpg", Bytes::from_static(b"b"))
        .await
        .unwrap();
    guest.logout().await.unwrap();

    let admin = admin_engine(mock.clone()).await;
    admin
        .moderate_photo(a.id, ModerationStatus::Approved)
        .await
        .unwrap();
    admin
        .moderate_photo(b.id, ModerationStatus::Approved)
        .await
        .unwrap();

    admin.set_featured_photo(a.id, true).await.unwrap();
    admin.set_featured_photo(b.id, true).await.unwrap();

    let featured: Vec<i64> = mock
        .table_rows(Table::Photos)
        .iter()
        .filter(|r| r["featured"] == true)
        .filter_map(|r| r["id"].as_i64())
        .collect();
    assert_eq!(featured, vec![b.id]);
    assert_eq!(admin.snapshot().featured_photo().map(|p| p.id), Some(b.id));

    admin.set_featured_photo(b.id, false).await.unwrap();
    assert_eq!(admin.snapshot().featured_photo(), None);
}

// ============================================================================
// Tables & Theme
// ============================================================================

/// Table assignments show up in the guest list and clear with `None`.
#[tokio::test]
async fn test_table_assignment_round_trip() {
    let mock = Arc::new(MockBackend::with_event_defaults());

    let guest = guest_engine(mock.clone(), "G15-J01").await;
    let guest_id = guest.profile().unwrap().user_id;
    guest.logout().await.unwrap();

    let admin = admin_engine(mock.clone()).await;
    admin.assign_table(&guest_id, Some(12)).await.unwrap();

    let guests = admin.list_guests().await.unwrap();
    let row = guests.iter().find(|p| p.user_id == guest_id).unwrap();
    assert_eq!(row.table_number, Some(12));

    admin.assign_table(&guest_id, None).await.unwrap();
    let guests = admin.list_guests().await.unwrap();
    let row = guests.iter().find(|p| p.user_id == guest_id).unwrap();
    assert_eq!(row.table_number, None);
}

/// The palette the admin picks greets the next guest at login.
#[tokio::test]
async fn test_theme_persists_across_logins() {
    let mock = Arc::new(MockBackend::with_event_defaults());

    let admin = admin_engine(mock.clone()).await;
    admin.set_theme(ThemePalette::Neon).await.unwrap();
    admin.logout().await.unwrap();

    let guest = guest_engine(mock.clone(), "G15-J01").await;
    assert_eq!(guest.theme().palette, ThemePalette::Neon);
    assert_eq!(guest.theme().palette.spec().name, "Neon");
}
