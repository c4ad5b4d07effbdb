//! ModeratorActor - hosts one deliberation session
//!
//! The moderator is the single writer for session state. It spawns the
//! six participants linked to itself, routes every completion through the
//! turn rules in [`super::state`], and emits events for observers. LLM
//! calls never run here; participants generate, the moderator decides.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use colloquy_types::{EvaluationOutcome, FactCheckItem, PersonaKind, SessionId};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};

use crate::actors::event_bus::EventBusMsg;
use crate::actors::model_config::{ModelRegistry, ModelResolutionContext};
use crate::actors::moderator::{
    events,
    protocol::{ModeratorError, ModeratorMsg},
    state::{
        DeliberationSession, DispatchVia, InterjectionOutcome, SessionLimits, SynthesisGate,
        SynthesisTrigger, TurnOutcome,
    },
};
use crate::actors::participant::{ParticipantActor, ParticipantArguments, ParticipantMsg};
use crate::evaluation::{self, EVALUATION_CALLSITE};
use crate::llm::{AdapterError, ChatRole, GenerationAdapter, GenerationOptions, DEFAULT_MAX_TOKENS};
use crate::profiles;
use crate::prompts;

/// Token budgets by role: verification replies are terse, synthesis and
/// evaluation run long.
const FACT_CHECK_MAX_TOKENS: u32 = 512;
const SYNTHESIS_MAX_TOKENS: u32 = 2048;
const EVALUATION_MAX_TOKENS: u32 = 2048;

fn max_tokens_for(kind: PersonaKind) -> u32 {
    match kind {
        PersonaKind::FactChecker => FACT_CHECK_MAX_TOKENS,
        PersonaKind::Synthesist => SYNTHESIS_MAX_TOKENS,
        _ => DEFAULT_MAX_TOKENS,
    }
}

/// ModeratorActor - deliberation orchestrator
#[derive(Debug, Default)]
pub struct ModeratorActor;

/// Arguments for spawning ModeratorActor
#[derive(Clone)]
pub struct ModeratorArguments {
    /// Event bus for observer-facing emissions
    pub event_bus: ActorRef<EventBusMsg>,
    /// Generation adapter shared by every participant and the evaluator
    pub adapter: Arc<dyn GenerationAdapter>,
    /// Model catalog for per-persona resolution
    pub registry: ModelRegistry,
    /// Turn budgets and retention knobs
    pub limits: SessionLimits,
    /// Request-level model override applied to every persona
    pub model_override: Option<String>,
}

/// Internal state for ModeratorActor
pub struct ModeratorState {
    session: DeliberationSession,
    participants: HashMap<PersonaKind, ActorRef<ParticipantMsg>>,
    event_bus: ActorRef<EventBusMsg>,
    adapter: Arc<dyn GenerationAdapter>,
    evaluation_options: GenerationOptions,
}

#[async_trait]
impl Actor for ModeratorActor {
    type Msg = ModeratorMsg;
    type State = ModeratorState;
    type Arguments = ModeratorArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(actor_id = %myself.get_id(), "ModeratorActor starting");

        let context = ModelResolutionContext {
            request_model: args.model_override.clone(),
            ..ModelResolutionContext::default()
        };

        // Model resolution failures surface here, before any turn is taken.
        let mut participants = HashMap::new();
        for profile in profiles::roster() {
            let resolved = args
                .registry
                .resolve_for_persona(profile.kind, &context)
                .map_err(|e| {
                    ModeratorError::InvalidConstruction(format!("{}: {e}", profile.kind))
                })?;
            tracing::info!(
                persona = %profile.kind,
                model = %resolved.config.id,
                source = resolved.source.as_str(),
                "Participant model resolved"
            );

            let options = GenerationOptions::new(resolved.config.provider)
                .with_system(profiles::system_prompt(profile.kind))
                .with_max_tokens(max_tokens_for(profile.kind));
            let participant_args = ParticipantArguments {
                persona: profile.kind,
                moderator: myself.clone(),
                adapter: args.adapter.clone(),
                options,
            };
            let (participant, _handle) =
                Actor::spawn_linked(None, ParticipantActor, participant_args, myself.get_cell())
                    .await
                    .map_err(|e| ModeratorError::SpawnFailed(format!("{}: {e}", profile.kind)))?;
            participants.insert(profile.kind, participant);
        }

        let evaluation_model = args
            .registry
            .resolve_for_callsite(EVALUATION_CALLSITE, &context)
            .map_err(|e| ModeratorError::InvalidConstruction(format!("evaluation: {e}")))?;
        let evaluation_options = GenerationOptions::new(evaluation_model.config.provider)
            .with_max_tokens(EVALUATION_MAX_TOKENS);

        Ok(ModeratorState {
            session: DeliberationSession::new(args.limits),
            participants,
            event_bus: args.event_bus,
            adapter: args.adapter,
            evaluation_options,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            session_id = %state.session.session_id.as_str(),
            participants = state.participants.len(),
            "ModeratorActor started"
        );
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ModeratorMsg::StartDeliberation { topic, reply } => {
                let result = self.handle_start(state, topic);
                let _ = reply.send(result);
            }
            ModeratorMsg::Interject { text } => {
                self.handle_interject(state, text);
            }
            ModeratorMsg::StopDeliberation => {
                self.handle_stop(state);
            }
            ModeratorMsg::ParticipantComplete { persona, text } => {
                self.handle_participant_complete(&myself, state, persona, text);
            }
            ModeratorMsg::ParticipantFailed { persona, error } => {
                self.handle_participant_failed(state, persona, error);
            }
            ModeratorMsg::StreamChunk { persona, text } => {
                if state.session.mark_speaking(persona) {
                    events::emit_response_chunk(
                        &state.event_bus,
                        &state.session.session_id,
                        persona,
                        &text,
                    );
                }
            }
            ModeratorMsg::EvaluationFinished { outcome } => {
                self.handle_evaluation_finished(state, outcome);
            }
            ModeratorMsg::GetSnapshot { reply } => {
                let _ = reply.send(state.session.snapshot());
            }
        }
        Ok(())
    }

    // Participants report generation failures as messages, so a child
    // dying is unexpected. Log it and keep moderating; the session holds
    // rather than crash the tree.
    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(who, err) => {
                tracing::error!(actor_id = %who.get_id(), error = %err, "Participant actor failed");
            }
            SupervisionEvent::ActorTerminated(who, _, reason) => {
                tracing::debug!(actor_id = %who.get_id(), ?reason, "Participant actor terminated");
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(actor_id = %myself.get_id(), "ModeratorActor stopped");
        Ok(())
    }
}

impl ModeratorActor {
    /// Handle StartDeliberation: framework phase, synthesist frames first.
    fn handle_start(
        &self,
        state: &mut ModeratorState,
        topic: String,
    ) -> Result<SessionId, ModeratorError> {
        state.session.start(topic.clone())?;
        let session_id = state.session.session_id.clone();
        tracing::info!(
            session_id = %session_id.as_str(),
            topic = %topic,
            "Deliberation started"
        );

        events::emit_session_started(&state.event_bus, &session_id, &topic);
        events::emit_topic_set(&state.event_bus, &session_id, &topic);
        events::emit_phase_changed(
            &state.event_bus,
            &session_id,
            colloquy_types::DeliberationPhase::Uninitialized,
            state.session.phase,
        );
        self.announce_turn(state);
        self.send_speak(
            state,
            PersonaKind::Synthesist,
            prompts::framework_prompt(&topic),
            true,
        );
        Ok(session_id)
    }

    /// Handle Interject: record, fan to every memory, re-prompt the
    /// current speaker.
    fn handle_interject(&self, state: &mut ModeratorState, text: String) {
        match state.session.interject(&text) {
            InterjectionOutcome::NotStarted => {
                tracing::warn!("Interjection before start, ignoring");
            }
            InterjectionOutcome::Stopped => {
                tracing::debug!("Interjection after stop, ignoring");
            }
            InterjectionOutcome::Redispatch { persona } => {
                events::emit_interjection_received(
                    &state.event_bus,
                    &state.session.session_id,
                    &text,
                );
                for participant in state.participants.values() {
                    let _ = participant.send_message(ParticipantMsg::Remember {
                        role: ChatRole::User,
                        content: text.clone(),
                    });
                }
                self.announce_turn(state);
                self.send_speak(state, persona, prompts::interjection_prompt(&text), true);
            }
        }
    }

    /// Handle StopDeliberation. Idempotent; never triggers evaluation.
    fn handle_stop(&self, state: &mut ModeratorState) {
        let from = state.session.phase;
        if !state.session.stop("stopped by user") {
            tracing::debug!("Stop on an already-stopped session, ignoring");
            return;
        }
        tracing::info!(
            session_id = %state.session.session_id.as_str(),
            "Deliberation stopped by user"
        );
        events::emit_phase_changed(
            &state.event_bus,
            &state.session.session_id,
            from,
            state.session.phase,
        );
        events::emit_stopped(&state.event_bus, &state.session.session_id, "stopped by user");
    }

    /// Handle ParticipantComplete: run the turn rules, then perform the
    /// dispatches and emissions the outcome calls for.
    fn handle_participant_complete(
        &self,
        myself: &ActorRef<ModeratorMsg>,
        state: &mut ModeratorState,
        persona: PersonaKind,
        text: String,
    ) {
        let phase_before = state.session.phase;
        let turns_before = state.session.turn_count;
        let outcome = state.session.participant_complete(persona, &text);
        let session_id = state.session.session_id.clone();

        match outcome {
            TurnOutcome::Discarded => {
                tracing::debug!(persona = %persona, "Completion discarded");
            }
            TurnOutcome::FactCheckResolved {
                item,
                dropped,
                released,
            } => {
                tracing::info!(
                    item_id = %item.id,
                    verdict = ?item.verdict,
                    released,
                    "Fact-check resolved"
                );
                events::emit_fact_check_complete(&state.event_bus, &session_id, &item);
                for old in &dropped {
                    events::emit_fact_check_dropped(&state.event_bus, &session_id, old);
                }
                if released {
                    events::emit_phase_changed(
                        &state.event_bus,
                        &session_id,
                        phase_before,
                        state.session.phase,
                    );
                    self.announce_turn(state);
                    self.dispatch_synthesis(state);
                }
            }
            TurnOutcome::SessionComplete { fact_check } => {
                tracing::info!(session_id = %session_id.as_str(), "Synthesis delivered");
                events::emit_response_complete(&state.event_bus, &session_id, persona, &text);
                self.dispatch_fact_check(state, fact_check);
                events::emit_phase_changed(
                    &state.event_bus,
                    &session_id,
                    phase_before,
                    state.session.phase,
                );
                events::emit_stopped(&state.event_bus, &session_id, "synthesis complete");
                self.spawn_evaluation(myself, state);
            }
            TurnOutcome::DiscussionForced { fact_check } => {
                events::emit_response_complete(&state.event_bus, &session_id, persona, &text);
                self.dispatch_fact_check(state, fact_check);
                events::emit_turn_limit_reached(
                    &state.event_bus,
                    &session_id,
                    phase_before,
                    turns_before,
                    state.session.limits.framework_cap,
                );
                events::emit_phase_changed(
                    &state.event_bus,
                    &session_id,
                    phase_before,
                    state.session.phase,
                );
                self.announce_turn(state);
                let topic = state.session.topic.clone().unwrap_or_default();
                self.send_speak(
                    state,
                    PersonaKind::Synthesist,
                    prompts::discussion_kickoff_prompt(&topic),
                    true,
                );
            }
            TurnOutcome::SynthesisAttempted {
                trigger,
                gate,
                fact_check,
            } => {
                events::emit_response_complete(&state.event_bus, &session_id, persona, &text);
                self.dispatch_fact_check(state, fact_check);
                if trigger == SynthesisTrigger::TurnCap {
                    events::emit_turn_limit_reached(
                        &state.event_bus,
                        &session_id,
                        phase_before,
                        turns_before,
                        state.session.limits.discussion_cap,
                    );
                }
                match gate {
                    SynthesisGate::Proceeding => {
                        events::emit_phase_changed(
                            &state.event_bus,
                            &session_id,
                            phase_before,
                            state.session.phase,
                        );
                        self.announce_turn(state);
                        self.dispatch_synthesis(state);
                    }
                    SynthesisGate::Deferred { checking } => {
                        tracing::info!(checking, "Holding synthesis for unresolved fact-checks");
                        events::emit_waiting_for_fact_checks(&state.event_bus, &session_id, checking);
                    }
                }
            }
            TurnOutcome::Dispatched {
                persona: next,
                via,
                queued,
                fact_check,
            } => {
                events::emit_response_complete(&state.event_bus, &session_id, persona, &text);
                self.dispatch_fact_check(state, fact_check);
                if via == DispatchVia::Nomination {
                    let mut nominees = vec![next];
                    nominees.extend(queued.iter().copied());
                    events::emit_nomination_recorded(
                        &state.event_bus,
                        &session_id,
                        persona,
                        &nominees,
                    );
                }
                self.announce_turn(state);
                let topic = state.session.topic.clone().unwrap_or_default();
                let prompt = prompts::turn_prompt(&topic, &state.session.transcript);
                self.send_speak(state, next, prompt, true);
            }
        }
    }

    /// Handle ParticipantFailed: record and surface; no retry, no
    /// dispatch. The session holds for an interjection or a stop.
    fn handle_participant_failed(
        &self,
        state: &mut ModeratorState,
        persona: PersonaKind,
        error: AdapterError,
    ) {
        if !state.session.participant_failed(persona, &error.to_string()) {
            tracing::debug!(persona = %persona, "Failure discarded");
            return;
        }
        tracing::warn!(
            persona = %persona,
            category = error.category(),
            error = %error,
            "Participant failed; session holds for user action"
        );
        events::emit_participant_error(
            &state.event_bus,
            &state.session.session_id,
            persona,
            error.category(),
            &error.to_string(),
        );
    }

    /// Handle EvaluationFinished. First outcome wins.
    fn handle_evaluation_finished(&self, state: &mut ModeratorState, outcome: EvaluationOutcome) {
        if !state.session.record_evaluation(outcome.clone()) {
            tracing::debug!("Duplicate evaluation outcome, ignoring");
            return;
        }
        tracing::info!(
            session_id = %state.session.session_id.as_str(),
            "Evaluation recorded"
        );
        events::emit_evaluation_complete(&state.event_bus, &state.session.session_id, &outcome);
    }

    /// Emit the counters for a dispatch just recorded in the session.
    fn announce_turn(&self, state: &ModeratorState) {
        let session = &state.session;
        events::emit_turn_count_updated(
            &state.event_bus,
            &session.session_id,
            session.turn_count,
            session.phase,
        );
        if let Some(persona) = session.current_speaker {
            events::emit_speaking_started(
                &state.event_bus,
                &session.session_id,
                persona,
                session.turn_count,
            );
        }
    }

    fn send_speak(&self, state: &ModeratorState, persona: PersonaKind, prompt: String, stream: bool) {
        let Some(participant) = state.participants.get(&persona) else {
            tracing::error!(persona = %persona, "No participant actor for dispatch");
            return;
        };
        let _ = participant.send_message(ParticipantMsg::Speak { prompt, stream });
    }

    /// Send the verification request to the fact-checker, off the primary
    /// turn ledger.
    fn dispatch_fact_check(&self, state: &ModeratorState, item: Option<FactCheckItem>) {
        let Some(item) = item else { return };
        tracing::info!(
            item_id = %item.id,
            source = %item.source,
            claims = item.claims.len(),
            "Fact-check queued"
        );
        events::emit_fact_check_queued(&state.event_bus, &state.session.session_id, &item);
        let prompt = prompts::fact_check_prompt(item.source, &item.claims);
        self.send_speak(state, PersonaKind::FactChecker, prompt, false);
    }

    fn dispatch_synthesis(&self, state: &ModeratorState) {
        let topic = state.session.topic.clone().unwrap_or_default();
        let prompt = prompts::synthesis_prompt(&topic, &state.session.fact_checks);
        self.send_speak(state, PersonaKind::Synthesist, prompt, true);
    }

    /// Run the one-shot scoring pass detached, so the moderator keeps
    /// serving snapshots while it is in flight.
    fn spawn_evaluation(&self, myself: &ActorRef<ModeratorMsg>, state: &ModeratorState) {
        let adapter = state.adapter.clone();
        let options = state.evaluation_options.clone();
        let topic = state.session.topic.clone().unwrap_or_default();
        let transcript = state.session.transcript.clone();
        let user_context = state.session.user_context();
        let session_id = state.session.session_id.clone();
        let myself_clone = myself.clone();

        tokio::spawn(async move {
            let outcome = match evaluation::evaluate(
                adapter.as_ref(),
                &options,
                &topic,
                &transcript,
                &user_context,
            )
            .await
            {
                Ok(report) => EvaluationOutcome::Complete { report },
                Err(error) => {
                    tracing::warn!(
                        session_id = %session_id.as_str(),
                        error = %error,
                        "Evaluation failed"
                    );
                    EvaluationOutcome::Failed {
                        detail: error.to_string(),
                    }
                }
            };

            let _ = myself_clone.send_message(ModeratorMsg::EvaluationFinished { outcome });
        });
    }
}
