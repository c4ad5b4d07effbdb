//! Shared types between the deliberation engine and observers
//!
//! These types cross the actor boundary:
//! - Moderator and participant actors (native Rust)
//! - Event-bus subscribers and any external presentation layer
//!
//! Serializable with serde for JSON over the event bus

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

// ============================================================================
// Core Types
// ============================================================================

/// Unique identifier for deliberation sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Personas
// ============================================================================

/// The fixed persona roster.
///
/// `Synthesist` opens every deliberation, delivers the synthesis, and is
/// exempt from the per-participant turn cap. `FactChecker` never takes a
/// primary turn; it only verifies claims.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PersonaKind {
    Synthesist,
    Visionary,
    Skeptic,
    Pragmatist,
    Scholar,
    FactChecker,
}

impl PersonaKind {
    pub fn is_fact_checker(&self) -> bool {
        matches!(self, PersonaKind::FactChecker)
    }

    /// The persona that frames, moderates, and synthesizes.
    pub fn is_synthesis_role(&self) -> bool {
        matches!(self, PersonaKind::Synthesist)
    }
}

/// What a participant actor is doing right now
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParticipantStatus {
    Idle,
    Thinking,
    Speaking,
    Error,
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Deliberation lifecycle phases.
///
/// Transitions are one-directional:
/// uninitialized -> framework -> discussion -> synthesis -> stopped
/// (stop can short-circuit from any phase).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliberationPhase {
    Uninitialized,
    Framework,
    Discussion,
    Synthesis,
    Stopped,
}

// ============================================================================
// Fact Checking
// ============================================================================

/// Verdict categories a fact-check can resolve to, strongest first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Verified,
    Partial,
    Disputed,
    False,
    Unverifiable,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FactCheckStatus {
    Checking,
    Complete,
}

/// One queued verification request plus its eventual outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactCheckItem {
    /// Unique item ID (ULID, so queue order is also lexical order)
    pub id: String,

    /// Which persona made the claims
    pub source: PersonaKind,

    /// The claim sentences under verification (at most a handful)
    pub claims: Vec<String>,

    pub status: FactCheckStatus,

    /// Present once status is `Complete`
    pub verdict: Option<Verdict>,

    /// The fact-checker's full response text, kept for the transcript
    pub raw: Option<String>,

    pub queued_at: DateTime<Utc>,

    pub checked_at: Option<DateTime<Utc>>,
}

impl FactCheckItem {
    pub fn new(source: PersonaKind, claims: Vec<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            source,
            claims,
            status: FactCheckStatus::Checking,
            verdict: None,
            raw: None,
            queued_at: Utc::now(),
            checked_at: None,
        }
    }

    pub fn is_checking(&self) -> bool {
        self.status == FactCheckStatus::Checking
    }

    pub fn resolve(&mut self, verdict: Verdict, raw: String) {
        self.status = FactCheckStatus::Complete;
        self.verdict = Some(verdict);
        self.raw = Some(raw);
        self.checked_at = Some(Utc::now());
    }
}

// ============================================================================
// Transcript
// ============================================================================

/// One entry in the deliberation transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// The user interjected
    User {
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A persona finished a turn
    Participant {
        persona: PersonaKind,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Engine notices (phase changes, stop reasons)
    System {
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A completed fact-check, inline where it resolved
    FactCheck { item: FactCheckItem },
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn participant(persona: PersonaKind, text: impl Into<String>) -> Self {
        Self::Participant {
            persona,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// The spoken or written text of the entry, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::User { text, .. } | Self::Participant { text, .. } | Self::System { text, .. } => {
                Some(text)
            }
            Self::FactCheck { item } => item.raw.as_deref(),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Score for one evaluation dimension (0.0 to 10.0)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionScore {
    pub name: String,
    pub score: f32,
    pub explanation: String,
}

/// Post-deliberation quality report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationReport {
    pub overall: f32,
    pub dimensions: Vec<DimensionScore>,
}

/// Terminal result of the one-shot evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Complete { report: EvaluationReport },
    Failed { detail: String },
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of a deliberation session, for observers and tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub topic: Option<String>,
    pub phase: DeliberationPhase,
    pub current_speaker: Option<PersonaKind>,
    pub turn_count: u32,
    pub participant_turns: HashMap<PersonaKind, u32>,
    pub participant_status: HashMap<PersonaKind, ParticipantStatus>,
    pub awaiting: Vec<PersonaKind>,
    pub transcript: Vec<TranscriptEntry>,
    pub fact_checks: Vec<FactCheckItem>,
    pub pending_synthesis: bool,
    pub evaluation: Option<EvaluationOutcome>,
}

impl SessionSnapshot {
    /// Number of fact-check items still unresolved
    pub fn checking_count(&self) -> usize {
        self.fact_checks.iter().filter(|i| i.is_checking()).count()
    }
}

// ============================================================================
// Constants
// ============================================================================

/// Event-bus topics
pub const TOPIC_PHASE: &str = "deliberation.phase";
pub const TOPIC_TURN: &str = "deliberation.turn";
pub const TOPIC_RESPONSE: &str = "deliberation.response";
pub const TOPIC_FACT_CHECK: &str = "deliberation.fact_check";
pub const TOPIC_LIFECYCLE: &str = "deliberation.lifecycle";

/// Wildcard matching every deliberation topic
pub const TOPIC_DELIBERATION_ALL: &str = "deliberation.*";

// ============================================================================
// Tests
// ============================================================================
