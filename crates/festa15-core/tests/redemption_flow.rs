//! End-to-end invite redemption and sign-in flows.
//!
//! Everything runs against the in-memory mock backend, the same code
//! path mock mode uses, so these are full engine flows minus the wire.

use std::sync::Arc;
use std::time::Duration;

use festa15_core::{
    FestaEngine, FestaError, MockBackend, Mode, RedeemOutcome, RsvpStatus, SessionEvent, Table,
};
use tokio::sync::broadcast;
use tokio::time::timeout;

fn engine_pair() -> (FestaEngine, Arc<MockBackend>) {
    let mock = Arc::new(MockBackend::with_event_defaults());
    let engine = FestaEngine::with_backend(mock.clone(), Mode::Mock);
    (engine, mock)
}

async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

// ============================================================================
// Guest Flows
// ============================================================================

/// A guest's first evening with the app: redeem, name themselves, answer
/// the RSVP, leave a message, sign out.
#[tokio::test]
async fn test_full_guest_first_session() {
    let (engine, mock) = engine_pair();
    let mut events = engine.subscribe_events();

    let outcome = engine.redeem_code("  g15-j02 ").await.unwrap();
    let RedeemOutcome::SignedIn(profile) = outcome else {
        panic!("expected SignedIn, got {outcome:?}");
    };
    // unnamed guests show as "Convidado" plus their id prefix
    assert_eq!(
        profile.display_label(),
        format!("Convidado {}", profile.user_id.short())
    );

    match next_event(&mut events).await {
        SessionEvent::SessionStarted { profile: started } => {
            assert_eq!(started.user_id, profile.user_id);
        }
        other => panic!("expected SessionStarted, got {}", other.label()),
    }

    engine.update_profile("Bia", false).await.unwrap();
    assert_eq!(engine.profile().unwrap().display_name, "Bia");

    engine
        .set_rsvp(RsvpStatus::Confirmed, Some("chego cedo".into()))
        .await
        .unwrap();
    engine.send_chat_message("oi, gente!").await.unwrap();

    let snapshot = engine.snapshot();
    assert!(snapshot.rsvp().unwrap().status.is_confirmed());
    assert_eq!(snapshot.messages().len(), 1);
    assert_eq!(snapshot.messages()[0].display_sender(), "Bia");

    engine.logout().await.unwrap();
    assert!(!engine.is_signed_in());

    // the guest's rows survive the sign-out
    assert_eq!(mock.table_rows(Table::Rsvps).len(), 1);
    assert_eq!(mock.table_rows(Table::Messages).len(), 1);
}

/// Closing the app without signing out keeps the backend session; the
/// next launch resumes it without going through the code gate.
#[tokio::test]
async fn test_relaunch_restores_named_guest() {
    let (engine, mock) = engine_pair();
    engine.redeem_code("G15-J01").await.unwrap();
    engine.update_profile("Rafa", true).await.unwrap();
    drop(engine);

    let engine = FestaEngine::with_backend(mock.clone(), Mode::Mock);
    let restored = engine.restore_session().await.unwrap().unwrap();
    assert_eq!(restored.display_name, "Rafa");
    assert!(restored.dietary);
    assert!(engine.is_signed_in());

    // session data came back too
    assert!(engine.snapshot().event().is_some());
}

/// Profile row written, invite consumption lost (say the app died in
/// between): redeeming the same code again repairs the invite without
/// duplicating the profile.
#[tokio::test]
async fn test_redeem_repairs_partial_redemption() {
    let (engine, mock) = engine_pair();

    // an identity with a profile but a never-consumed invite
    let session = mock.complete_magic_link("vo@example.com");
    mock.seed_row(
        Table::Profiles,
        serde_json::json!({
            "user_id": session.user_id.as_str(),
            "display_name": "Vó Maria",
            "segment": "ADULT",
            "dietary": false,
            "table_number": null,
            "created_at": 1,
        }),
    );

    let outcome = engine.redeem_code("G15-A02").await.unwrap();
    let RedeemOutcome::SignedIn(profile) = outcome else {
        panic!("expected SignedIn, got {outcome:?}");
    };

    // the stored profile wins over a fresh blank one
    assert_eq!(profile.display_name, "Vó Maria");
    assert_eq!(mock.table_rows(Table::Profiles).len(), 1);

    // and the dangling invite finally gets consumed
    let invites = mock.table_rows(Table::Invites);
    let row = invites.iter().find(|r| r["code"] == "G15-A02").unwrap();
    assert_eq!(row["used"], true);
    assert_eq!(row["redeemed_by"], session.user_id.as_str());
}

/// Two guests on two devices: each redemption mints its own identity
/// and profile, and each code is consumed exactly once.
#[tokio::test]
async fn test_each_guest_gets_their_own_profile() {
    let (first, mock) = engine_pair();
    let a = match first.redeem_code("G15-J01").await.unwrap() {
        RedeemOutcome::SignedIn(profile) => profile,
        other => panic!("expected SignedIn, got {other:?}"),
    };
    first.logout().await.unwrap();

    let second = FestaEngine::with_backend(mock.clone(), Mode::Mock);
    let b = match second.redeem_code("G15-J02").await.unwrap() {
        RedeemOutcome::SignedIn(profile) => profile,
        other => panic!("expected SignedIn, got {other:?}"),
    };

    assert_ne!(a.user_id, b.user_id);
    assert_eq!(mock.table_rows(Table::Profiles).len(), 2);

    let invites = mock.table_rows(Table::Invites);
    for code in ["G15-J01", "G15-J02"] {
        let row = invites.iter().find(|r| r["code"] == code).unwrap();
        assert_eq!(row["used"], true);
    }
    assert_eq!(
        invites
            .iter()
            .filter(|r| r["used"] == false)
            .count(),
        3
    );
}

// ============================================================================
// Email Fallback
// ============================================================================

/// With anonymous sign-in disabled the flow detours through a magic
/// link and finishes once the link lands.
#[tokio::test]
async fn test_email_detour_end_to_end() {
    let (engine, mock) = engine_pair();
    mock.set_anonymous_enabled(false);

    assert_eq!(
        engine.redeem_code("G15-A01").await.unwrap(),
        RedeemOutcome::EmailRequired
    );

    // a malformed address is refused before anything is sent
    let err = engine.continue_with_email("not-an-address").await.unwrap_err();
    assert!(matches!(err, FestaError::InvalidOperation(_)));
    assert!(mock.magic_link_requests().is_empty());

    engine.continue_with_email("tia@example.com").await.unwrap();
    // resending is allowed while waiting
    engine.continue_with_email("tia@example.com").await.unwrap();
    assert_eq!(mock.magic_link_requests().len(), 2);

    mock.complete_magic_link("tia@example.com");
    let profile = engine.complete_sign_in().await.unwrap();
    assert_eq!(profile.segment, festa15_core::Segment::Adult);
    assert!(engine.is_signed_in());
}

/// The email detour state does not leak into a fresh code entry: typing
/// a new code restarts the machine.
#[tokio::test]
async fn test_new_code_restarts_the_flow() {
    let (engine, mock) = engine_pair();
    mock.set_anonymous_enabled(false);

    engine.redeem_code("G15-A01").await.unwrap();
    engine.continue_with_email("tia@example.com").await.unwrap();

    // guest gives up on email and tries the other household code
    mock.set_anonymous_enabled(true);
    let outcome = engine.redeem_code("G15-A02").await.unwrap();
    assert!(matches!(outcome, RedeemOutcome::SignedIn(_)));

    // only the second code was consumed
    let invites = mock.table_rows(Table::Invites);
    assert_eq!(
        invites.iter().find(|r| r["code"] == "G15-A01").unwrap()["used"],
        false
    );
    assert_eq!(
        invites.iter().find(|r| r["code"] == "G15-A02").unwrap()["used"],
        true
    );
}

// ============================================================================
// Notices
// ============================================================================

/// Every rejected redemption surfaces as a guest-facing notice with a
/// Portuguese message, not just an error return.
#[tokio::test]
async fn test_rejections_surface_notices() {
    let (engine, _mock) = engine_pair();
    let mut events = engine.subscribe_events();

    let err = engine.redeem_code("G15-X01").await.unwrap_err();
    assert!(matches!(err, FestaError::InvalidCode(_)));

    match next_event(&mut events).await {
        SessionEvent::Notice { kind, text } => {
            assert_eq!(kind, festa15_core::NoticeKind::Error);
            assert_eq!(text, err.user_message());
        }
        other => panic!("expected Notice, got {}", other.label()),
    }
}
