//! ParticipantActor - one persona seat at the deliberation table
//!
//! Each participant owns its conversation memory and runs generations
//! through the shared adapter. It never decides who speaks next: it
//! reports completions and failures to the moderator and waits for the
//! next prompt.

use std::sync::Arc;

use async_trait::async_trait;
use colloquy_types::{ParticipantStatus, PersonaKind};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::mpsc;

use crate::actors::moderator::ModeratorMsg;
use crate::llm::{ChatMessage, ChatRole, GenerationAdapter, GenerationOptions};

/// ParticipantActor - persona seat backed by a generation adapter
pub struct ParticipantActor;

/// Arguments for spawning ParticipantActor
#[derive(Clone)]
pub struct ParticipantArguments {
    pub persona: PersonaKind,
    pub moderator: ActorRef<ModeratorMsg>,
    pub adapter: Arc<dyn GenerationAdapter>,
    pub options: GenerationOptions,
}

/// State for ParticipantActor
pub struct ParticipantState {
    args: ParticipantArguments,
    memory: Vec<ChatMessage>,
    status: ParticipantStatus,
}

// ============================================================================
// Messages
// ============================================================================

/// Messages handled by ParticipantActor
#[derive(Debug)]
pub enum ParticipantMsg {
    /// Generate this persona's next turn from memory plus `prompt`
    Speak { prompt: String, stream: bool },

    /// Append to memory without generating (interjection fan-out)
    Remember { role: ChatRole, content: String },

    /// What this participant is doing right now
    GetStatus { reply: RpcReplyPort<ParticipantStatus> },

    /// Conversation memory accumulated so far
    GetMemory { reply: RpcReplyPort<Vec<ChatMessage>> },
}

// ============================================================================
// Actor Implementation
// ============================================================================

#[async_trait]
impl Actor for ParticipantActor {
    type Msg = ParticipantMsg;
    type State = ParticipantState;
    type Arguments = ParticipantArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(
            actor_id = %myself.get_id(),
            persona = %args.persona,
            "ParticipantActor starting"
        );
        Ok(ParticipantState {
            args,
            memory: Vec::new(),
            status: ParticipantStatus::Idle,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ParticipantMsg::Speak { prompt, stream } => {
                self.handle_speak(state, prompt, stream).await;
            }
            ParticipantMsg::Remember { role, content } => {
                state.memory.push(ChatMessage { role, content });
            }
            ParticipantMsg::GetStatus { reply } => {
                let _ = reply.send(state.status);
            }
            ParticipantMsg::GetMemory { reply } => {
                let _ = reply.send(state.memory.clone());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::debug!(persona = %state.args.persona, "ParticipantActor stopped");
        Ok(())
    }
}

impl ParticipantActor {
    /// Run one generation. The prompt and the reply both join memory on
    /// success, so later turns carry the full exchange; a failed turn
    /// leaves memory untouched.
    async fn handle_speak(&self, state: &mut ParticipantState, prompt: String, stream: bool) {
        let persona = state.args.persona;
        state.status = ParticipantStatus::Thinking;

        let mut messages = state.memory.clone();
        messages.push(ChatMessage::user(prompt.clone()));

        let result = if stream {
            // Poll the generation and the chunk relay together; the first
            // relayed chunk flips the seat from thinking to speaking.
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut call = state.args.adapter.stream(&messages, &state.args.options, tx);
            let mut relay_open = true;
            loop {
                if !relay_open {
                    break call.await;
                }
                tokio::select! {
                    result = &mut call => {
                        // The call resolved; flush chunks it sent on the way out.
                        while let Ok(text) = rx.try_recv() {
                            let _ = state
                                .args
                                .moderator
                                .send_message(ModeratorMsg::StreamChunk { persona, text });
                        }
                        break result;
                    }
                    received = rx.recv() => match received {
                        Some(text) => {
                            state.status = ParticipantStatus::Speaking;
                            let _ = state
                                .args
                                .moderator
                                .send_message(ModeratorMsg::StreamChunk { persona, text });
                        }
                        // Sender dropped early; nothing more will arrive.
                        None => relay_open = false,
                    },
                }
            }
        } else {
            state
                .args
                .adapter
                .complete(&messages, &state.args.options)
                .await
        };

        match result {
            Ok(text) => {
                state.memory.push(ChatMessage::user(prompt));
                state.memory.push(ChatMessage::assistant(text.clone()));
                state.status = ParticipantStatus::Idle;
                let _ = state
                    .args
                    .moderator
                    .send_message(ModeratorMsg::ParticipantComplete { persona, text });
            }
            Err(error) => {
                tracing::warn!(persona = %persona, error = %error, "Generation failed");
                state.status = ParticipantStatus::Error;
                let _ = state
                    .args
                    .moderator
                    .send_message(ModeratorMsg::ParticipantFailed { persona, error });
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
