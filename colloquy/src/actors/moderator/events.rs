//! ModeratorActor event emission
//!
//! Typed emission functions for everything a deliberation announces on the
//! event bus. Emission is fire-and-forget: a full or dead bus never blocks
//! the turn loop, observers catch up from the recent-events ring if they
//! need to.

use colloquy_types::{
    DeliberationPhase, EvaluationOutcome, FactCheckItem, PersonaKind, SessionId, TOPIC_FACT_CHECK,
    TOPIC_LIFECYCLE, TOPIC_PHASE, TOPIC_RESPONSE, TOPIC_TURN,
};
use ractor::ActorRef;

use crate::actors::event_bus::{Event, EventBusMsg, EventType};
use crate::profiles;

fn publish(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    event_type: EventType,
    topic: &str,
    payload: serde_json::Value,
) {
    match Event::new(event_type, topic, payload, "moderator") {
        Ok(event) => {
            let event = event.with_correlation_id(session_id.as_str());
            let _ = event_bus.send_message(EventBusMsg::Publish { event });
        }
        Err(error) => {
            tracing::warn!(%error, "Failed to serialize event payload, dropping");
        }
    }
}

pub fn emit_session_started(event_bus: &ActorRef<EventBusMsg>, session_id: &SessionId, topic: &str) {
    let payload = serde_json::json!({
        "session_id": session_id.as_str(),
        "topic": topic,
    });
    publish(
        event_bus,
        session_id,
        EventType::SessionStarted,
        TOPIC_LIFECYCLE,
        payload,
    );
}

pub fn emit_topic_set(event_bus: &ActorRef<EventBusMsg>, session_id: &SessionId, topic: &str) {
    let payload = serde_json::json!({ "topic": topic });
    publish(
        event_bus,
        session_id,
        EventType::TopicSet,
        TOPIC_LIFECYCLE,
        payload,
    );
}

pub fn emit_phase_changed(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    from: DeliberationPhase,
    to: DeliberationPhase,
) {
    let payload = serde_json::json!({
        "from": from.to_string(),
        "to": to.to_string(),
    });
    publish(
        event_bus,
        session_id,
        EventType::PhaseChanged,
        TOPIC_PHASE,
        payload,
    );
}

pub fn emit_stopped(event_bus: &ActorRef<EventBusMsg>, session_id: &SessionId, reason: &str) {
    let payload = serde_json::json!({ "reason": reason });
    publish(
        event_bus,
        session_id,
        EventType::Stopped,
        TOPIC_LIFECYCLE,
        payload,
    );
}

pub fn emit_speaking_started(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    persona: PersonaKind,
    turn_count: u32,
) {
    let payload = serde_json::json!({
        "persona": persona.to_string(),
        "name": profiles::display_name(persona),
        "turn_count": turn_count,
    });
    publish(
        event_bus,
        session_id,
        EventType::SpeakingStarted,
        TOPIC_TURN,
        payload,
    );
}

pub fn emit_response_chunk(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    persona: PersonaKind,
    text: &str,
) {
    let payload = serde_json::json!({
        "persona": persona.to_string(),
        "text": text,
    });
    publish(
        event_bus,
        session_id,
        EventType::ResponseChunk,
        TOPIC_RESPONSE,
        payload,
    );
}

pub fn emit_response_complete(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    persona: PersonaKind,
    text: &str,
) {
    let payload = serde_json::json!({
        "persona": persona.to_string(),
        "name": profiles::display_name(persona),
        "text": text,
    });
    publish(
        event_bus,
        session_id,
        EventType::ResponseComplete,
        TOPIC_RESPONSE,
        payload,
    );
}

pub fn emit_participant_error(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    persona: PersonaKind,
    category: &str,
    detail: &str,
) {
    let payload = serde_json::json!({
        "persona": persona.to_string(),
        "category": category,
        "detail": detail,
    });
    publish(
        event_bus,
        session_id,
        EventType::ParticipantError,
        TOPIC_RESPONSE,
        payload,
    );
}

pub fn emit_turn_count_updated(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    turn_count: u32,
    phase: DeliberationPhase,
) {
    let payload = serde_json::json!({
        "turn_count": turn_count,
        "phase": phase.to_string(),
    });
    publish(
        event_bus,
        session_id,
        EventType::TurnCountUpdated,
        TOPIC_TURN,
        payload,
    );
}

pub fn emit_turn_limit_reached(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    phase: DeliberationPhase,
    turn_count: u32,
    cap: u32,
) {
    let payload = serde_json::json!({
        "phase": phase.to_string(),
        "turn_count": turn_count,
        "cap": cap,
    });
    publish(
        event_bus,
        session_id,
        EventType::TurnLimitReached,
        TOPIC_TURN,
        payload,
    );
}

pub fn emit_nomination_recorded(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    by: PersonaKind,
    nominees: &[PersonaKind],
) {
    let payload = serde_json::json!({
        "by": by.to_string(),
        "nominees": nominees.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
    });
    publish(
        event_bus,
        session_id,
        EventType::NominationRecorded,
        TOPIC_TURN,
        payload,
    );
}

pub fn emit_interjection_received(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    text: &str,
) {
    let payload = serde_json::json!({ "text": text });
    publish(
        event_bus,
        session_id,
        EventType::InterjectionReceived,
        TOPIC_LIFECYCLE,
        payload,
    );
}

pub fn emit_fact_check_queued(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    item: &FactCheckItem,
) {
    let payload = serde_json::json!({
        "item_id": item.id,
        "source": item.source.to_string(),
        "claims": item.claims,
    });
    publish(
        event_bus,
        session_id,
        EventType::FactCheckQueued,
        TOPIC_FACT_CHECK,
        payload,
    );
}

pub fn emit_fact_check_complete(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    item: &FactCheckItem,
) {
    let payload = serde_json::json!({
        "item_id": item.id,
        "source": item.source.to_string(),
        "verdict": item
            .verdict
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    });
    publish(
        event_bus,
        session_id,
        EventType::FactCheckComplete,
        TOPIC_FACT_CHECK,
        payload,
    );
}

pub fn emit_fact_check_dropped(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    item: &FactCheckItem,
) {
    let payload = serde_json::json!({ "item_id": item.id });
    publish(
        event_bus,
        session_id,
        EventType::FactCheckDropped,
        TOPIC_FACT_CHECK,
        payload,
    );
}

pub fn emit_waiting_for_fact_checks(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    checking: usize,
) {
    let payload = serde_json::json!({ "checking": checking });
    publish(
        event_bus,
        session_id,
        EventType::WaitingForFactChecks,
        TOPIC_FACT_CHECK,
        payload,
    );
}

pub fn emit_evaluation_complete(
    event_bus: &ActorRef<EventBusMsg>,
    session_id: &SessionId,
    outcome: &EvaluationOutcome,
) {
    publish(
        event_bus,
        session_id,
        EventType::EvaluationComplete,
        TOPIC_LIFECYCLE,
        serde_json::json!(outcome),
    );
}
