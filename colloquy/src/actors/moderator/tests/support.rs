use std::sync::Arc;

use async_trait::async_trait;
use colloquy_types::{PersonaKind, SessionId, SessionSnapshot};
use ractor::{call, Actor, ActorRef};
use tokio::sync::mpsc;

use crate::actors::event_bus::{EventBusActor, EventBusConfig, EventBusMsg};
use crate::actors::model_config::{self, ModelRegistry};
use crate::actors::moderator::state::SessionLimits;
use crate::actors::moderator::{ModeratorActor, ModeratorArguments, ModeratorMsg};
use crate::llm::{AdapterError, ChatMessage, GenerationAdapter, GenerationOptions};

/// Adapter whose requests never finish. The spawned participants stay
/// silent forever, so tests drive the moderator with synthetic
/// completions and rely on mailbox order for determinism.
pub(crate) struct StallAdapter;

#[async_trait]
impl GenerationAdapter for StallAdapter {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<String, AdapterError> {
        std::future::pending().await
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        _options: &GenerationOptions,
        _chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String, AdapterError> {
        std::future::pending().await
    }
}

pub(crate) async fn setup_test_moderator(
    limits: SessionLimits,
) -> (ActorRef<ModeratorMsg>, ActorRef<EventBusMsg>) {
    let (bus_ref, _bus_handle) = Actor::spawn(None, EventBusActor, EventBusConfig::default())
        .await
        .unwrap();

    // Registry construction reads the environment; serialize against the
    // catalog tests that mutate it.
    let registry = {
        let _lock = model_config::test_env::lock();
        ModelRegistry::new()
    };

    let args = ModeratorArguments {
        event_bus: bus_ref.clone(),
        adapter: Arc::new(StallAdapter),
        registry,
        limits,
        model_override: None,
    };

    let (moderator_ref, _moderator_handle) =
        Actor::spawn(None, ModeratorActor, args).await.unwrap();
    (moderator_ref, bus_ref)
}

pub(crate) async fn start_deliberation(
    moderator: &ActorRef<ModeratorMsg>,
    topic: &str,
) -> SessionId {
    call!(moderator, |reply| ModeratorMsg::StartDeliberation {
        topic: topic.to_string(),
        reply,
    })
    .unwrap()
    .unwrap()
}

/// Feed a synthetic completion. Processed before any later GetSnapshot
/// because the moderator drains its mailbox in order.
pub(crate) fn complete(moderator: &ActorRef<ModeratorMsg>, persona: PersonaKind, text: &str) {
    moderator
        .send_message(ModeratorMsg::ParticipantComplete {
            persona,
            text: text.to_string(),
        })
        .unwrap();
}

pub(crate) async fn snapshot_of(moderator: &ActorRef<ModeratorMsg>) -> SessionSnapshot {
    call!(moderator, |reply| ModeratorMsg::GetSnapshot { reply }).unwrap()
}
