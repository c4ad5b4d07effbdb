use colloquy_types::{DeliberationPhase, PersonaKind, SessionId};
use ractor::call;

use crate::actors::moderator::state::SessionLimits;
use crate::actors::moderator::{ModeratorError, ModeratorMsg};

use super::support::{setup_test_moderator, snapshot_of, start_deliberation};

#[tokio::test]
async fn test_moderator_actor_spawn() {
    let (moderator_ref, bus_ref) = setup_test_moderator(SessionLimits::default()).await;
    assert!(!moderator_ref.get_id().to_string().is_empty());
    moderator_ref.stop(None);
    bus_ref.stop(None);
}

#[tokio::test]
async fn test_snapshot_before_start() {
    let (moderator_ref, bus_ref) = setup_test_moderator(SessionLimits::default()).await;

    let snapshot = snapshot_of(&moderator_ref).await;
    assert_eq!(snapshot.phase, DeliberationPhase::Uninitialized);
    assert!(snapshot.topic.is_none());
    assert_eq!(snapshot.turn_count, 0);
    assert!(snapshot.current_speaker.is_none());
    assert!(snapshot.transcript.is_empty());

    moderator_ref.stop(None);
    bus_ref.stop(None);
}

#[tokio::test]
async fn test_start_deliberation_opens_framework() {
    let (moderator_ref, bus_ref) = setup_test_moderator(SessionLimits::default()).await;

    let session_id = start_deliberation(&moderator_ref, "Should cities ban private cars?").await;
    assert!(!session_id.as_str().is_empty());

    let snapshot = snapshot_of(&moderator_ref).await;
    assert_eq!(snapshot.session_id, session_id);
    assert_eq!(
        snapshot.topic.as_deref(),
        Some("Should cities ban private cars?")
    );
    assert_eq!(snapshot.phase, DeliberationPhase::Framework);
    assert_eq!(snapshot.current_speaker, Some(PersonaKind::Synthesist));
    assert_eq!(snapshot.turn_count, 1);

    moderator_ref.stop(None);
    bus_ref.stop(None);
}

#[tokio::test]
async fn test_second_start_rejected() {
    let (moderator_ref, bus_ref) = setup_test_moderator(SessionLimits::default()).await;

    start_deliberation(&moderator_ref, "Is remote work here to stay?").await;

    let second: Result<Result<SessionId, ModeratorError>, _> =
        call!(moderator_ref, |reply| ModeratorMsg::StartDeliberation {
            topic: "A different topic".to_string(),
            reply,
        });
    assert_eq!(second.unwrap(), Err(ModeratorError::AlreadyStarted));

    // The running session is untouched.
    let snapshot = snapshot_of(&moderator_ref).await;
    assert_eq!(snapshot.topic.as_deref(), Some("Is remote work here to stay?"));

    moderator_ref.stop(None);
    bus_ref.stop(None);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (moderator_ref, bus_ref) = setup_test_moderator(SessionLimits::default()).await;

    start_deliberation(&moderator_ref, "Should voting be mandatory?").await;
    moderator_ref
        .send_message(ModeratorMsg::StopDeliberation)
        .unwrap();
    moderator_ref
        .send_message(ModeratorMsg::StopDeliberation)
        .unwrap();

    let snapshot = snapshot_of(&moderator_ref).await;
    assert_eq!(snapshot.phase, DeliberationPhase::Stopped);
    assert!(snapshot.current_speaker.is_none());
    let stop_entries = snapshot
        .transcript
        .iter()
        .filter(|entry| {
            entry
                .text()
                .is_some_and(|text| text.contains("Deliberation stopped"))
        })
        .count();
    assert_eq!(stop_entries, 1);

    moderator_ref.stop(None);
    bus_ref.stop(None);
}

#[tokio::test]
async fn test_stop_before_start_parks_session() {
    let (moderator_ref, bus_ref) = setup_test_moderator(SessionLimits::default()).await;

    moderator_ref
        .send_message(ModeratorMsg::StopDeliberation)
        .unwrap();

    let snapshot = snapshot_of(&moderator_ref).await;
    assert_eq!(snapshot.phase, DeliberationPhase::Stopped);

    moderator_ref.stop(None);
    bus_ref.stop(None);
}
