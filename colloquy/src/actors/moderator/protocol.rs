//! ModeratorActor message protocol
//!
//! Defines the messages the moderator accepts and the errors it returns
//! to callers. Participants report back through this protocol too, so it
//! is the single place where turn-taking inputs are enumerated.

use colloquy_types::{EvaluationOutcome, PersonaKind, SessionId, SessionSnapshot};
use ractor::RpcReplyPort;

use crate::llm::AdapterError;

/// Messages handled by ModeratorActor
#[derive(Debug)]
pub enum ModeratorMsg {
    /// Begin a deliberation on the given topic
    StartDeliberation {
        topic: String,
        reply: RpcReplyPort<Result<SessionId, ModeratorError>>,
    },
    /// User guidance injected mid-deliberation
    Interject { text: String },
    /// Halt the deliberation without a synthesis
    StopDeliberation,
    /// A participant finished its turn
    ParticipantComplete { persona: PersonaKind, text: String },
    /// A participant's generation call failed
    ParticipantFailed {
        persona: PersonaKind,
        error: AdapterError,
    },
    /// Streamed increment from whichever participant is speaking
    StreamChunk { persona: PersonaKind, text: String },
    /// The detached evaluation task resolved
    EvaluationFinished { outcome: EvaluationOutcome },
    /// Read a point-in-time view of the session
    GetSnapshot {
        reply: RpcReplyPort<SessionSnapshot>,
    },
}

/// Errors that can occur in ModeratorActor
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ModeratorError {
    /// A session is already running; one moderator hosts one deliberation
    #[error("deliberation already started")]
    AlreadyStarted,
    /// A participant could not be built (model resolution failed)
    #[error("invalid construction: {0}")]
    InvalidConstruction(String),
    /// Spawning a child actor failed
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
}
