//! Colloquy - actor-based multi-persona deliberation engine
//!
//! A moderator actor walks a fixed panel of personas through framework,
//! discussion, and synthesis phases, with concurrent fact-checking and a
//! one-shot quality evaluation of the finished transcript.

pub mod actors;
pub mod evaluation;
pub mod heuristics;
pub mod llm;
pub mod profiles;
pub mod prompts;
pub mod supervisor;
