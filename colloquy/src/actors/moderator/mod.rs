//! ModeratorActor - orchestrates a deliberation across persona actors
//!
//! The ModeratorActor is the central orchestration component that:
//! - Receives lifecycle requests via `ModeratorMsg::StartDeliberation` / `StopDeliberation`
//! - Dispatches turns to persona participants and applies the turn rules
//! - Detects nominations, readiness signals, and checkable claims in replies
//! - Gates synthesis on the fact-check ledger
//! - Emits events for observability
//!
//! ## Phases
//!
//! ```text
//! Uninitialized → Framework → Discussion → Synthesis → Stopped
//!                     |            |
//!                     +------------+-- StopDeliberation at any point
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ractor::Actor;
//! use crate::actors::moderator::{ModeratorActor, ModeratorArguments};
//!
//! let args = ModeratorArguments {
//!     event_bus: event_bus_ref,
//!     adapter: adapter.clone(),
//!     registry,
//!     limits: SessionLimits::from_env(),
//!     model_override: None,
//! };
//!
//! let (moderator_ref, _handle) = Actor::spawn(None, ModeratorActor, args).await?;
//! ```

pub mod actor;
pub mod events;
pub mod protocol;
pub mod state;

#[cfg(test)]
mod tests;

pub use actor::{ModeratorActor, ModeratorArguments, ModeratorState};
pub use protocol::{ModeratorError, ModeratorMsg};
