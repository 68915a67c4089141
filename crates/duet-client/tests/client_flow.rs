//! End-to-end flows over the local backend: session resolution, couple
//! pairing, note traffic with read receipts, and typing presence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use duet_client::{
    ClientConfig, CoupleSession, DuetClient, EventStore, NoteStore, PresenceChannel, SessionState,
};
use duet_shared::backend::{DataBackend, RealtimeBackend};
use duet_shared::constants::TYPING_EXPIRY;
use duet_shared::{
    AuthUser, Couple, CoupleCode, DuetError, EventKind, NewEvent, NewLoveNote, TypingSignal, UserId,
};
use duet_store::{LocalBackend, LocalSession};

fn auth(id: UserId) -> AuthUser {
    AuthUser {
        id,
        email: format!("{id}@example.com"),
    }
}

fn open_backend(dir: &tempfile::TempDir) -> Arc<LocalBackend> {
    Arc::new(
        LocalBackend::open_at(&dir.path().join("duet.db"), dir.path().join("blobs")).unwrap(),
    )
}

async fn paired_couple(backend: &LocalBackend, a: UserId, b: UserId) -> Couple {
    backend.register_profile(a, "Ana").await.unwrap();
    backend.register_profile(b, "Ben").await.unwrap();
    let code = backend.generate_couple_code().await.unwrap();
    let couple = backend.insert_couple(code, None).await.unwrap();
    backend.link_profile(a, Some(couple.id)).await.unwrap();
    backend.link_profile(b, Some(couple.id)).await.unwrap();
    couple
}

async fn wait_settled(rx: &mut watch::Receiver<SessionState>) -> SessionState {
    timeout(Duration::from_secs(5), rx.wait_for(|s| !s.is_loading()))
        .await
        .expect("session did not settle")
        .expect("session channel closed")
        .clone()
}

#[tokio::test]
async fn session_stays_loading_until_auth_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);
    let provider = LocalSession::new();

    let session = CoupleSession::new(backend, &provider);
    let mut rx = session.state();

    // Auth has not settled; nothing may be concluded yet.
    tokio::task::yield_now().await;
    assert!(rx.borrow().is_loading());
    assert!(!rx.borrow().needs_couple());

    provider.set_ready();
    let state = wait_settled(&mut rx).await;
    assert_eq!(state, SessionState::SignedOut);
}

#[tokio::test]
async fn create_couple_is_observable_once_it_returns() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let me = UserId::new();
    backend.register_profile(me, "Ana").await.unwrap();
    let provider = LocalSession::signed_in(auth(me));

    let session = CoupleSession::new(backend, &provider);
    let mut rx = session.state();
    let state = wait_settled(&mut rx).await;
    assert!(state.needs_couple());

    let couple = session.create_couple(None).await.unwrap();

    let state = rx.borrow().clone();
    let snap = state.snapshot().expect("session should be ready");
    assert_eq!(snap.couple_id(), Some(couple.id));
    assert!(!state.needs_couple());
}

#[tokio::test]
async fn join_accepts_lowercase_codes_and_resolves_partner() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    backend.register_profile(ana, "Ana").await.unwrap();
    backend.register_profile(ben, "Ben").await.unwrap();

    let code = CoupleCode::parse("QR45TU").unwrap();
    let couple = backend.insert_couple(code, None).await.unwrap();
    backend.link_profile(ana, Some(couple.id)).await.unwrap();

    let provider = LocalSession::signed_in(auth(ben));
    let session = CoupleSession::new(backend, &provider);
    let mut rx = session.state();
    wait_settled(&mut rx).await;

    let joined = session.join_couple("  qr45tu ").await.unwrap();
    assert_eq!(joined.id, couple.id);

    let state = rx.borrow().clone();
    let snap = state.snapshot().unwrap();
    assert_eq!(snap.partner.as_ref().map(|p| p.id), Some(ana));
}

#[tokio::test]
async fn join_rejects_unknown_and_full_couples() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let carol = UserId::new();
    backend.register_profile(carol, "Carol").await.unwrap();
    let provider = LocalSession::signed_in(auth(carol));
    let session = CoupleSession::new(backend.clone(), &provider);
    let mut rx = session.state();
    wait_settled(&mut rx).await;

    assert!(matches!(
        session.join_couple("nope").await,
        Err(DuetError::InvalidCode)
    ));
    assert!(matches!(
        session.join_couple("ZZZZZZ").await,
        Err(DuetError::InvalidCode)
    ));
    assert!(matches!(
        session.join_couple(couple.couple_code.as_str()).await,
        Err(DuetError::CoupleFull)
    ));

    // The failed join must not have linked the profile.
    let profile = backend.profile(carol).await.unwrap();
    assert_eq!(profile.couple_id, None);
}

#[tokio::test]
async fn dangling_couple_link_resolves_as_no_couple() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let ana = UserId::new();
    backend.register_profile(ana, "Ana").await.unwrap();
    let code = backend.generate_couple_code().await.unwrap();
    let couple = backend.insert_couple(code, None).await.unwrap();
    backend.link_profile(ana, Some(couple.id)).await.unwrap();

    // Simulate remote drift: the couple row vanishes while the profile
    // still points at it.
    let raw = duet_store::Database::open_at(&dir.path().join("duet.db")).unwrap();
    raw.conn()
        .execute_batch("PRAGMA foreign_keys = OFF; DELETE FROM couples;")
        .unwrap();
    drop(raw);

    let provider = LocalSession::signed_in(auth(ana));
    let session = CoupleSession::new(backend, &provider);
    let mut rx = session.state();

    let state = wait_settled(&mut rx).await;
    let snap = state.snapshot().expect("session should be ready");
    assert!(snap.profile.is_some());
    assert!(snap.couple.is_none());
    assert!(state.needs_couple());

    // An explicit refresh degrades the same way instead of failing.
    session.refresh().await.unwrap();
    assert!(session.state().borrow().needs_couple());
}

#[tokio::test]
async fn whitespace_note_never_reaches_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let notes = NoteStore::new(backend.clone());
    notes.attach(couple.id, ana).await.unwrap();

    assert!(matches!(
        notes.send(ben, " \t\n ").await,
        Err(DuetError::Validation(_))
    ));
    assert!(backend.notes_for(couple.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn inbound_note_updates_cache_and_unread_count() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let notes = NoteStore::new(backend.clone());
    notes.attach(couple.id, ana).await.unwrap();
    let mut rx = notes.watch();

    // Partner writes from another device.
    backend
        .insert_note(NewLoveNote {
            couple_id: couple.id,
            from_user_id: ben,
            to_user_id: ana,
            message: "miss you".into(),
        })
        .await
        .unwrap();

    timeout(Duration::from_secs(5), rx.wait_for(|n| n.len() == 1))
        .await
        .expect("note was not pushed")
        .unwrap();
    assert_eq!(notes.unread_count(), 1);

    assert_eq!(notes.mark_all_read().await.unwrap(), 1);
    assert_eq!(notes.unread_count(), 0);

    // Marking again transitions nothing.
    assert_eq!(notes.mark_all_read().await.unwrap(), 0);
    let note_id = rx.borrow()[0].id;
    notes.mark_as_read(note_id).await.unwrap();
    notes.mark_as_read(note_id).await.unwrap();
}

#[tokio::test]
async fn event_created_on_one_device_appears_on_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let mine = EventStore::new(backend.clone());
    let theirs = EventStore::new(backend.clone());
    mine.attach(couple.id).await.unwrap();
    theirs.attach(couple.id).await.unwrap();
    let mut theirs_rx = theirs.watch();

    let event = mine
        .create(
            ana,
            NewEvent {
                title: "Dinner".into(),
                description: None,
                event_date: chrono::NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
                event_time: None,
                event_type: EventKind::Date,
                color: "#FF6B9D".into(),
            },
        )
        .await
        .unwrap();

    timeout(
        Duration::from_secs(5),
        theirs_rx.wait_for(|events| events.iter().any(|e| e.id == event.id)),
    )
    .await
    .expect("event was not pushed")
    .unwrap();

    let upcoming = theirs.upcoming(chrono::NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(), 3);
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].title, "Dinner");
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_expires_after_silence() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let presence = PresenceChannel::new(backend.clone(), TYPING_EXPIRY);
    presence.attach(couple.id, ana).await.unwrap();
    let mut typing = presence.partner_typing();

    // Our own broadcast must not light the indicator.
    presence.set_typing(true).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!*typing.borrow());

    let started = tokio::time::Instant::now();
    backend
        .broadcast_typing(
            couple.id,
            TypingSignal {
                user_id: ben,
                is_typing: true,
            },
        )
        .await
        .unwrap();

    timeout(Duration::from_secs(5), typing.wait_for(|t| *t))
        .await
        .expect("indicator never lit")
        .unwrap();

    // No further signal: the indicator auto-hides after the expiry.
    timeout(Duration::from_secs(10), typing.wait_for(|t| !*t))
        .await
        .expect("indicator never expired")
        .unwrap();
    assert!(started.elapsed() >= TYPING_EXPIRY);
}

#[tokio::test(start_paused = true)]
async fn repeated_typing_resets_the_expiry_timer() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let presence = PresenceChannel::new(backend.clone(), TYPING_EXPIRY);
    presence.attach(couple.id, ana).await.unwrap();
    let mut typing = presence.partner_typing();

    let signal = TypingSignal {
        user_id: ben,
        is_typing: true,
    };
    let started = tokio::time::Instant::now();
    backend.broadcast_typing(couple.id, signal).await.unwrap();
    timeout(Duration::from_secs(5), typing.wait_for(|t| *t))
        .await
        .expect("indicator never lit")
        .unwrap();

    // A second signal inside the window re-arms the deadline instead of
    // letting the first one run out.
    tokio::time::sleep(TYPING_EXPIRY / 2).await;
    backend.broadcast_typing(couple.id, signal).await.unwrap();

    // Past the original deadline the indicator is still visible.
    tokio::time::sleep(TYPING_EXPIRY / 2 + Duration::from_millis(100)).await;
    assert!(*typing.borrow());

    timeout(Duration::from_secs(10), typing.wait_for(|t| !*t))
        .await
        .expect("indicator never expired")
        .unwrap();
    assert!(started.elapsed() >= TYPING_EXPIRY + TYPING_EXPIRY / 2);
}

#[tokio::test]
async fn typing_signal_before_attach_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    // Not attached yet: the broadcast is silently skipped.
    let presence = PresenceChannel::new(backend, TYPING_EXPIRY);
    presence.set_typing(true).await;
    assert!(!*presence.partner_typing().borrow());
}

#[tokio::test(start_paused = true)]
async fn inbound_note_is_auto_read_after_the_delay() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let provider = LocalSession::signed_in(auth(ana));
    let client = DuetClient::new(backend.clone(), &provider, ClientConfig::default());

    // Wait for the wiring task to attach the stores to the couple.
    // Polling must yield to the timer so the paused clock can advance.
    timeout(Duration::from_secs(5), async {
        while client.notes().attached_user().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stores never attached");

    let sent = backend
        .insert_note(NewLoveNote {
            couple_id: couple.id,
            from_user_id: ben,
            to_user_id: ana,
            message: "good morning".into(),
        })
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let mut rx = client.notes().watch();
    timeout(
        Duration::from_secs(10),
        rx.wait_for(|notes| notes.iter().any(|n| n.id == sent.id && n.is_read)),
    )
    .await
    .expect("note never auto-read")
    .unwrap();

    let config = ClientConfig::default();
    assert!(started.elapsed() >= config.auto_read_delay);
    assert!(backend.notes_for(couple.id).await.unwrap()[0].is_read);
}

#[tokio::test(start_paused = true)]
async fn unread_history_is_auto_read_after_attach() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    // The note predates the session, like reopening the app onto an
    // unread chat.
    backend
        .insert_note(NewLoveNote {
            couple_id: couple.id,
            from_user_id: ben,
            to_user_id: ana,
            message: "welcome back".into(),
        })
        .await
        .unwrap();

    let provider = LocalSession::signed_in(auth(ana));
    let client = DuetClient::new(backend.clone(), &provider, ClientConfig::default());

    let mut rx = client.notes().watch();
    timeout(
        Duration::from_secs(10),
        rx.wait_for(|notes| !notes.is_empty() && notes.iter().all(|n| n.is_read)),
    )
    .await
    .expect("history never auto-read")
    .unwrap();
    assert!(backend.notes_for(couple.id).await.unwrap()[0].is_read);
}

#[tokio::test(start_paused = true)]
async fn outbound_notes_trigger_no_read_receipt() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let provider = LocalSession::signed_in(auth(ana));
    let client = DuetClient::new(backend.clone(), &provider, ClientConfig::default());

    timeout(Duration::from_secs(5), async {
        while client.notes().attached_user().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stores never attached");

    client.notes().send(ben, "thinking of you").await.unwrap();

    // Only the recipient issues the receipt; our own sends must never
    // flip the partner's note to read.
    tokio::time::sleep(ClientConfig::default().auto_read_delay * 4).await;
    let stored = backend.notes_for(couple.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].is_read);
}

#[tokio::test]
async fn leaving_keeps_the_couple_for_the_partner() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open_backend(&dir);

    let (ana, ben) = (UserId::new(), UserId::new());
    let couple = paired_couple(&backend, ana, ben).await;

    let provider = LocalSession::signed_in(auth(ben));
    let session = CoupleSession::new(backend.clone(), &provider);
    let mut rx = session.state();
    wait_settled(&mut rx).await;

    session.leave_couple().await.unwrap();
    assert!(rx.borrow().needs_couple());

    // Ana is still linked and the couple row survives.
    assert_eq!(
        backend.profile(ana).await.unwrap().couple_id,
        Some(couple.id)
    );
    assert_eq!(backend.couple(couple.id).await.unwrap().id, couple.id);
}
