//! End-to-end lifecycle: a scripted deliberation runs framework,
//! discussion, and synthesis on tight budgets, stops itself, and gets
//! scored; a user stop halts everything with no evaluation.

mod common;

use std::time::Duration;

use colloquy::actors::event_bus::EventType;
use colloquy::actors::moderator::state::SessionLimits;
use colloquy::actors::ModeratorMsg;
use colloquy_types::{
    DeliberationPhase, EvaluationOutcome, PersonaKind, TranscriptEntry,
};

use common::{
    attach_collector, reply, reply_after, spawn_colloquy, start_deliberation, wait_for_events,
    wait_for_snapshot, ScriptKey, ScriptedAdapter,
};

const TOPIC: &str = "Should cities ban private cars from their centers?";

const REPORT_JSON: &str = r#"{"overall": 7.5, "dimensions": [
    {"name": "insight", "score": 8.0, "explanation": "sharp framing"},
    {"name": "rigor", "score": 7.0, "explanation": "claims were checked"}
]}"#;

fn tight_limits() -> SessionLimits {
    SessionLimits {
        framework_cap: 1,
        discussion_cap: 2,
        ..SessionLimits::default()
    }
}

/// Checks that `expected` event types occur in order (gaps allowed).
fn assert_ordered(events: &[EventType], expected: &[EventType]) {
    let mut remaining = expected.iter();
    let mut looking_for = remaining.next();
    for event in events {
        if Some(event) == looking_for {
            looking_for = remaining.next();
        }
    }
    assert!(
        looking_for.is_none(),
        "missing {looking_for:?} in order within {events:?}"
    );
}

#[tokio::test]
async fn test_deliberation_runs_to_completion_and_evaluates() {
    let adapter = ScriptedAdapter::new()
        .script(
            ScriptKey::Persona(PersonaKind::Synthesist),
            vec![
                reply("We are weighing mobility against livability."),
                reply("Let us open with practical impacts."),
                reply("The panel lands on pilot closures with exemptions."),
            ],
        )
        .script(ScriptKey::Evaluation, vec![reply(REPORT_JSON)]);

    let (supervisor, moderator, event_bus) = spawn_colloquy(adapter, tight_limits()).await;
    let events = attach_collector(&event_bus).await;
    let session_id = start_deliberation(&moderator, TOPIC).await;

    let snapshot = wait_for_snapshot(&moderator, Duration::from_secs(5), |s| {
        s.phase == DeliberationPhase::Stopped
    })
    .await;

    assert_eq!(snapshot.topic.as_deref(), Some(TOPIC));
    let spoken: Vec<&str> = snapshot
        .transcript
        .iter()
        .filter_map(|entry| match entry {
            TranscriptEntry::Participant { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(spoken.len(), 4, "framework, kickoff, one panel turn, synthesis");
    assert_eq!(spoken[0], "We are weighing mobility against livability.");
    assert_eq!(spoken[3], "The panel lands on pilot closures with exemptions.");

    let turns = |persona: PersonaKind| {
        snapshot
            .participant_turns
            .get(&persona)
            .copied()
            .unwrap_or(0)
    };
    assert_eq!(turns(PersonaKind::Synthesist), 3);
    assert_eq!(turns(PersonaKind::Visionary), 1);
    assert_eq!(turns(PersonaKind::Skeptic), 0);

    for marker in [
        "Deliberation convened:",
        "Framework complete; opening discussion.",
        "Moving to synthesis.",
        "Deliberation stopped: synthesis complete",
    ] {
        assert!(
            snapshot.transcript.iter().any(|entry| {
                entry.text().is_some_and(|text| text.contains(marker))
            }),
            "transcript missing {marker:?}"
        );
    }

    // The scoring pass runs detached after the stop.
    let snapshot = wait_for_snapshot(&moderator, Duration::from_secs(5), |s| {
        s.evaluation.is_some()
    })
    .await;
    match snapshot.evaluation {
        Some(EvaluationOutcome::Complete { report }) => {
            assert_eq!(report.overall, 7.5);
            assert_eq!(report.dimensions.len(), 2);
            assert_eq!(report.dimensions[0].name, "insight");
        }
        other => panic!("expected a completed evaluation, got {other:?}"),
    }

    wait_for_events(&events, Duration::from_secs(2), |log| {
        log.iter()
            .any(|event| event.event_type == EventType::EvaluationComplete)
    })
    .await;

    let log = events.lock().unwrap();
    assert!(
        log.iter()
            .all(|event| event.correlation_id.as_deref() == Some(session_id.as_str())),
        "every event should carry the session id"
    );
    let types: Vec<EventType> = log.iter().map(|event| event.event_type.clone()).collect();
    assert_ordered(
        &types,
        &[
            EventType::SessionStarted,
            EventType::TopicSet,
            EventType::PhaseChanged,
            EventType::SpeakingStarted,
            EventType::ResponseChunk,
            EventType::ResponseComplete,
            EventType::TurnLimitReached,
            EventType::PhaseChanged,
            EventType::PhaseChanged,
            EventType::Stopped,
            EventType::EvaluationComplete,
        ],
    );
    drop(log);

    supervisor.stop(None);
}

#[tokio::test]
async fn test_user_stop_discards_stragglers_and_skips_evaluation() {
    let adapter = ScriptedAdapter::new().script(
        ScriptKey::Persona(PersonaKind::Synthesist),
        vec![reply_after("A framing that arrives too late.", 500)],
    );

    let (supervisor, moderator, event_bus) = spawn_colloquy(adapter, SessionLimits::default()).await;
    let events = attach_collector(&event_bus).await;
    start_deliberation(&moderator, TOPIC).await;

    moderator
        .send_message(ModeratorMsg::StopDeliberation)
        .unwrap();
    let snapshot = wait_for_snapshot(&moderator, Duration::from_secs(2), |s| {
        s.phase == DeliberationPhase::Stopped
    })
    .await;
    assert_eq!(snapshot.turn_count, 1);

    // Let the delayed generation finish and reach the moderator.
    tokio::time::sleep(Duration::from_millis(900)).await;

    let snapshot = wait_for_snapshot(&moderator, Duration::from_secs(1), |_| true).await;
    assert!(
        !snapshot
            .transcript
            .iter()
            .any(|entry| matches!(entry, TranscriptEntry::Participant { .. })),
        "completions after a stop must be discarded"
    );
    assert!(snapshot.evaluation.is_none(), "a user stop is never scored");

    wait_for_events(&events, Duration::from_secs(2), |log| {
        log.iter().any(|event| {
            event.event_type == EventType::Stopped
                && event.payload.get("reason").and_then(serde_json::Value::as_str)
                    == Some("stopped by user")
        })
    })
    .await;
    assert!(
        !events
            .lock()
            .unwrap()
            .iter()
            .any(|event| event.event_type == EventType::ResponseComplete),
        "no completed response should be announced after the stop"
    );

    supervisor.stop(None);
}
