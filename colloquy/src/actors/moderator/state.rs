//! ModeratorActor session state
//!
//! `DeliberationSession` is the single-writer state container: every phase
//! transition, turn counter, queue operation, and transcript append goes
//! through its methods. The actor layer only performs message IO around
//! the outcomes these methods return, which keeps the turn-taking rules
//! unit-testable without a runtime.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use colloquy_types::{
    DeliberationPhase, EvaluationOutcome, FactCheckItem, ParticipantStatus, PersonaKind, SessionId,
    SessionSnapshot, TranscriptEntry,
};

use crate::heuristics;
use crate::profiles::{self, PRIMARY_ROTATION};

use super::protocol::ModeratorError;

// ============================================================================
// Limits
// ============================================================================

pub const DEFAULT_FRAMEWORK_CAP: u32 = 4;
pub const DEFAULT_DISCUSSION_CAP: u32 = 12;
pub const DEFAULT_PARTICIPANT_CAP: u32 = 3;
pub const DEFAULT_FACT_CHECK_RETENTION: usize = 5;

/// Turn budgets and retention knobs for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLimits {
    /// Turns allowed in the framework phase before discussion is forced
    pub framework_cap: u32,
    /// Turns allowed in the discussion phase before synthesis is attempted
    pub discussion_cap: u32,
    /// Per-persona turn budget; the synthesist is exempt
    pub participant_cap: u32,
    /// Completed fact-check items kept in memory
    pub fact_check_retention: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            framework_cap: DEFAULT_FRAMEWORK_CAP,
            discussion_cap: DEFAULT_DISCUSSION_CAP,
            participant_cap: DEFAULT_PARTICIPANT_CAP,
            fact_check_retention: DEFAULT_FACT_CHECK_RETENTION,
        }
    }
}

impl SessionLimits {
    /// Read limits from `COLLOQUY_*` environment variables, falling back
    /// to the defaults on missing or unparseable values.
    pub fn from_env() -> Self {
        Self {
            framework_cap: env_u32("COLLOQUY_FRAMEWORK_CAP", DEFAULT_FRAMEWORK_CAP),
            discussion_cap: env_u32("COLLOQUY_DISCUSSION_CAP", DEFAULT_DISCUSSION_CAP),
            participant_cap: env_u32("COLLOQUY_PARTICIPANT_CAP", DEFAULT_PARTICIPANT_CAP),
            fact_check_retention: env_usize(
                "COLLOQUY_FACT_CHECK_RETENTION",
                DEFAULT_FACT_CHECK_RETENTION,
            ),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Turn Outcomes
// ============================================================================

/// How a synthesis attempt landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisGate {
    /// No unresolved fact-checks; the synthesist has been dispatched
    Proceeding,
    /// Unresolved fact-checks block synthesis; nobody was dispatched
    Deferred { checking: usize },
}

/// What pushed the session toward synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisTrigger {
    TurnCap,
    Readiness,
}

/// How the next primary speaker was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchVia {
    Nomination,
    AwaitingQueue,
    RoundRobin,
}

/// Result of feeding one participant completion through the turn rules.
///
/// All state mutation has already happened by the time one of these is
/// returned; the actor layer maps each variant onto prompt dispatches
/// and event emissions.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Stopped session, a reply overtaken by an interjection, or a
    /// verdict with no open item
    Discarded,
    /// The fact-checker's reply resolved the oldest checking item
    FactCheckResolved {
        item: FactCheckItem,
        /// Completed items dropped by retention pruning
        dropped: Vec<FactCheckItem>,
        /// True when this resolution released a deferred synthesis
        released: bool,
    },
    /// The synthesis response arrived; the session is now stopped
    SessionComplete { fact_check: Option<FactCheckItem> },
    /// The framework budget ran out; the synthesist opens discussion
    DiscussionForced { fact_check: Option<FactCheckItem> },
    /// The discussion budget ran out or a readiness signal fired
    SynthesisAttempted {
        trigger: SynthesisTrigger,
        gate: SynthesisGate,
        fact_check: Option<FactCheckItem>,
    },
    /// Ordinary hand-off to the next primary speaker
    Dispatched {
        persona: PersonaKind,
        via: DispatchVia,
        /// Extra nominees parked for later turns
        queued: Vec<PersonaKind>,
        fact_check: Option<FactCheckItem>,
    },
}

/// Result of a user interjection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterjectionOutcome {
    /// No session yet; nothing to steer
    NotStarted,
    /// Session over; ignored
    Stopped,
    /// The given persona is re-prompted with the user's text
    Redispatch { persona: PersonaKind },
}

// ============================================================================
// Session State
// ============================================================================

/// State container for ModeratorActor
#[derive(Debug)]
pub struct DeliberationSession {
    pub session_id: SessionId,
    pub topic: Option<String>,
    pub phase: DeliberationPhase,
    pub current_speaker: Option<PersonaKind>,
    /// Turns taken in the current phase; resets when discussion opens
    pub turn_count: u32,
    pub participant_turns: HashMap<PersonaKind, u32>,
    pub participant_status: HashMap<PersonaKind, ParticipantStatus>,
    /// Primary dispatches whose reply has not arrived yet
    pub in_flight: u32,
    /// In-flight replies overtaken by an interjection; discarded on arrival
    pub superseded: u32,
    /// Nominees waiting for a turn, oldest first
    pub awaiting_queue: VecDeque<PersonaKind>,
    pub transcript: Vec<TranscriptEntry>,
    /// Verification items in queue order; completed ones are pruned down
    /// to the retention limit
    pub fact_checks: Vec<FactCheckItem>,
    /// Set when synthesis was attempted while fact-checks were unresolved
    pub pending_synthesis: bool,
    pub evaluation: Option<EvaluationOutcome>,
    pub limits: SessionLimits,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliberationSession {
    pub fn new(limits: SessionLimits) -> Self {
        let now = Utc::now();
        let participant_status = profiles::roster()
            .iter()
            .map(|p| (p.kind, ParticipantStatus::Idle))
            .collect();
        Self {
            session_id: SessionId::new(),
            topic: None,
            phase: DeliberationPhase::Uninitialized,
            current_speaker: None,
            turn_count: 0,
            participant_turns: HashMap::new(),
            participant_status,
            in_flight: 0,
            superseded: 0,
            awaiting_queue: VecDeque::new(),
            transcript: Vec::new(),
            fact_checks: Vec::new(),
            pending_synthesis: false,
            evaluation: None,
            limits,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == DeliberationPhase::Stopped
    }

    /// Fact-check items still unresolved
    pub fn checking_count(&self) -> usize {
        self.fact_checks.iter().filter(|i| i.is_checking()).count()
    }

    fn turns_taken(&self, persona: PersonaKind) -> u32 {
        self.participant_turns.get(&persona).copied().unwrap_or(0)
    }

    /// True when the persona has spent its turn budget. The synthesist is
    /// exempt so framing, kickoff, and synthesis always have a speaker.
    pub fn is_capped(&self, persona: PersonaKind) -> bool {
        if persona.is_synthesis_role() {
            return false;
        }
        self.turns_taken(persona) >= self.limits.participant_cap
    }

    /// Book a primary turn: bump counters, set the speaker. The caller
    /// sends the actual prompt.
    fn record_dispatch(&mut self, persona: PersonaKind) {
        self.turn_count += 1;
        *self.participant_turns.entry(persona).or_insert(0) += 1;
        self.current_speaker = Some(persona);
        self.in_flight += 1;
        self.participant_status
            .insert(persona, ParticipantStatus::Thinking);
        self.touch();
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the session: framework phase, synthesist on turn one.
    pub fn start(&mut self, topic: impl Into<String>) -> Result<(), ModeratorError> {
        if self.phase != DeliberationPhase::Uninitialized {
            return Err(ModeratorError::AlreadyStarted);
        }
        let topic = topic.into();
        self.transcript
            .push(TranscriptEntry::system(format!("Deliberation convened: {topic}")));
        self.topic = Some(topic);
        self.phase = DeliberationPhase::Framework;
        self.record_dispatch(PersonaKind::Synthesist);
        Ok(())
    }

    /// Stop the session. Idempotent; returns false when already stopped.
    pub fn stop(&mut self, reason: &str) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.transcript
            .push(TranscriptEntry::system(format!("Deliberation stopped: {reason}")));
        self.phase = DeliberationPhase::Stopped;
        self.current_speaker = None;
        self.touch();
        true
    }

    /// Record the user's interjection and pick who answers it. The
    /// re-dispatch spends a turn like any other and overtakes any reply
    /// already being generated; that reply is discarded when it lands.
    pub fn interject(&mut self, text: &str) -> InterjectionOutcome {
        if self.phase == DeliberationPhase::Uninitialized {
            return InterjectionOutcome::NotStarted;
        }
        if self.is_stopped() {
            return InterjectionOutcome::Stopped;
        }
        self.transcript.push(TranscriptEntry::user(text));
        let persona = self.current_speaker.unwrap_or(PersonaKind::Synthesist);
        if self.in_flight > 0 {
            self.superseded += 1;
        }
        self.record_dispatch(persona);
        InterjectionOutcome::Redispatch { persona }
    }

    /// Record a failed generation. The turn is not retried; the session
    /// holds until the user interjects or stops it. Returns false when
    /// the failure is discarded (stopped session or superseded turn).
    pub fn participant_failed(&mut self, persona: PersonaKind, detail: &str) -> bool {
        if self.is_stopped() {
            return false;
        }
        if !persona.is_fact_checker() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if self.superseded > 0 {
                self.superseded -= 1;
                return false;
            }
        }
        self.participant_status
            .insert(persona, ParticipantStatus::Error);
        self.transcript.push(TranscriptEntry::system(format!(
            "{} ({persona}) failed to respond: {detail}",
            profiles::display_name(persona)
        )));
        self.touch();
        true
    }

    /// First write wins; the evaluation runs exactly once.
    pub fn record_evaluation(&mut self, outcome: EvaluationOutcome) -> bool {
        if self.evaluation.is_some() {
            return false;
        }
        self.evaluation = Some(outcome);
        self.touch();
        true
    }

    /// A streamed chunk arrived from `persona`.
    pub fn mark_speaking(&mut self, persona: PersonaKind) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.participant_status
            .insert(persona, ParticipantStatus::Speaking);
        true
    }

    // ========================================================================
    // Turn Rules
    // ========================================================================

    /// Feed one completed response through the turn-taking rules.
    ///
    /// Precedence, first match wins:
    /// 1. fact-checker replies resolve the oldest checking item
    /// 2. replies overtaken by an interjection are discarded
    /// 3. factual claims enqueue a new fact-check (never takes the turn)
    /// 4. a synthesis response ends the session
    /// 5. framework budget exhausted forces discussion
    /// 6. discussion budget exhausted attempts synthesis
    /// 7. a readiness signal attempts synthesis (discussion only)
    /// 8. parked nominees take the next turn
    /// 9. fresh nominations, then round-robin
    pub fn participant_complete(&mut self, persona: PersonaKind, text: &str) -> TurnOutcome {
        if self.is_stopped() {
            return TurnOutcome::Discarded;
        }

        if persona.is_fact_checker() {
            return self.resolve_fact_check(text);
        }

        self.in_flight = self.in_flight.saturating_sub(1);
        if self.superseded > 0 {
            self.superseded -= 1;
            return TurnOutcome::Discarded;
        }

        self.participant_status
            .insert(persona, ParticipantStatus::Idle);
        self.transcript
            .push(TranscriptEntry::participant(persona, text));
        self.touch();

        // Claim scanning covers every panel response, synthesis included.
        let claims = heuristics::detect_claims(text);
        let fact_check = if claims.is_empty() {
            None
        } else {
            let item = FactCheckItem::new(persona, claims);
            self.fact_checks.push(item.clone());
            self.participant_status
                .insert(PersonaKind::FactChecker, ParticipantStatus::Thinking);
            Some(item)
        };

        if self.phase == DeliberationPhase::Synthesis {
            self.stop("synthesis complete");
            return TurnOutcome::SessionComplete { fact_check };
        }

        if self.phase == DeliberationPhase::Framework
            && self.turn_count >= self.limits.framework_cap
        {
            self.transcript.push(TranscriptEntry::system(
                "Framework complete; opening discussion.",
            ));
            self.phase = DeliberationPhase::Discussion;
            self.turn_count = 0;
            self.record_dispatch(PersonaKind::Synthesist);
            return TurnOutcome::DiscussionForced { fact_check };
        }

        if self.phase == DeliberationPhase::Discussion
            && self.turn_count >= self.limits.discussion_cap
        {
            let gate = self.attempt_synthesis();
            return TurnOutcome::SynthesisAttempted {
                trigger: SynthesisTrigger::TurnCap,
                gate,
                fact_check,
            };
        }

        if self.phase == DeliberationPhase::Discussion
            && heuristics::signals_synthesis_readiness(text)
        {
            let gate = self.attempt_synthesis();
            return TurnOutcome::SynthesisAttempted {
                trigger: SynthesisTrigger::Readiness,
                gate,
                fact_check,
            };
        }

        if let Some(next) = self.pop_awaiting() {
            self.record_dispatch(next);
            return TurnOutcome::Dispatched {
                persona: next,
                via: DispatchVia::AwaitingQueue,
                queued: Vec::new(),
                fact_check,
            };
        }

        let nominees: Vec<PersonaKind> = heuristics::detect_nominations(text)
            .into_iter()
            .filter(|n| !n.is_fact_checker() && *n != persona && !self.is_capped(*n))
            .collect();
        if let Some((&first, rest)) = nominees.split_first() {
            self.awaiting_queue.extend(rest.iter().copied());
            self.record_dispatch(first);
            return TurnOutcome::Dispatched {
                persona: first,
                via: DispatchVia::Nomination,
                queued: rest.to_vec(),
                fact_check,
            };
        }

        let next = self.next_round_robin();
        self.record_dispatch(next);
        TurnOutcome::Dispatched {
            persona: next,
            via: DispatchVia::RoundRobin,
            queued: Vec::new(),
            fact_check,
        }
    }

    /// Pop parked nominees until one is still under its budget. Capped
    /// entries are dropped, not deferred.
    fn pop_awaiting(&mut self) -> Option<PersonaKind> {
        while let Some(next) = self.awaiting_queue.pop_front() {
            if !self.is_capped(next) {
                return Some(next);
            }
        }
        None
    }

    /// Next speaker in rotation order after the current one, skipping
    /// capped personas. The synthesist is always eligible, so the scan
    /// cannot come up empty.
    fn next_round_robin(&self) -> PersonaKind {
        let start = self
            .current_speaker
            .and_then(|p| PRIMARY_ROTATION.iter().position(|&r| r == p))
            .map(|i| i + 1)
            .unwrap_or(0);
        for offset in 0..PRIMARY_ROTATION.len() {
            let candidate = PRIMARY_ROTATION[(start + offset) % PRIMARY_ROTATION.len()];
            if !self.is_capped(candidate) {
                return candidate;
            }
        }
        PersonaKind::Synthesist
    }

    /// Move to synthesis when every fact-check has resolved; otherwise
    /// mark synthesis pending and hold the turn. The turn counter does
    /// not move while holding.
    fn attempt_synthesis(&mut self) -> SynthesisGate {
        let checking = self.checking_count();
        if checking > 0 {
            self.pending_synthesis = true;
            self.transcript.push(TranscriptEntry::system(format!(
                "Holding synthesis for {checking} unresolved fact-check(s)."
            )));
            self.touch();
            return SynthesisGate::Deferred { checking };
        }
        self.pending_synthesis = false;
        self.transcript
            .push(TranscriptEntry::system("Moving to synthesis."));
        self.phase = DeliberationPhase::Synthesis;
        self.record_dispatch(PersonaKind::Synthesist);
        SynthesisGate::Proceeding
    }

    /// Resolve the oldest checking item with the fact-checker's reply.
    /// Resolution never spends a turn.
    fn resolve_fact_check(&mut self, raw: &str) -> TurnOutcome {
        self.participant_status
            .insert(PersonaKind::FactChecker, ParticipantStatus::Idle);
        let verdict = heuristics::parse_verdict(raw);
        let Some(item) = self.fact_checks.iter_mut().find(|i| i.is_checking()) else {
            return TurnOutcome::Discarded;
        };
        item.resolve(verdict, raw.to_string());
        let resolved = item.clone();
        self.transcript.push(TranscriptEntry::FactCheck {
            item: resolved.clone(),
        });
        let dropped = self.prune_fact_checks();
        self.touch();

        let released = if self.pending_synthesis && self.checking_count() == 0 {
            matches!(self.attempt_synthesis(), SynthesisGate::Proceeding)
        } else {
            false
        };

        TurnOutcome::FactCheckResolved {
            item: resolved,
            dropped,
            released,
        }
    }

    /// Drop the oldest completed items beyond the retention limit.
    /// Checking items are never dropped.
    fn prune_fact_checks(&mut self) -> Vec<FactCheckItem> {
        let completed = self.fact_checks.iter().filter(|i| !i.is_checking()).count();
        let mut excess = completed.saturating_sub(self.limits.fact_check_retention);
        let mut dropped = Vec::new();
        if excess == 0 {
            return dropped;
        }
        let mut kept = Vec::with_capacity(self.fact_checks.len());
        for item in self.fact_checks.drain(..) {
            if excess > 0 && !item.is_checking() {
                dropped.push(item);
                excess -= 1;
            } else {
                kept.push(item);
            }
        }
        self.fact_checks = kept;
        dropped
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            topic: self.topic.clone(),
            phase: self.phase,
            current_speaker: self.current_speaker,
            turn_count: self.turn_count,
            participant_turns: self.participant_turns.clone(),
            participant_status: self.participant_status.clone(),
            awaiting: self.awaiting_queue.iter().copied().collect(),
            transcript: self.transcript.clone(),
            fact_checks: self.fact_checks.clone(),
            pending_synthesis: self.pending_synthesis,
            evaluation: self.evaluation.clone(),
        }
    }

    /// The user's interjections so far, for the evaluation prompt.
    pub fn user_context(&self) -> String {
        let lines: Vec<&str> = self
            .transcript
            .iter()
            .filter_map(|entry| match entry {
                TranscriptEntry::User { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if lines.is_empty() {
            "none".to_string()
        } else {
            lines.join("\n")
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
