#![allow(dead_code)]

//! Shared fixtures for the integration suites: a scripted generation
//! adapter keyed by persona, a supervision-tree spawner, and snapshot
//! polling helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::mpsc;

use colloquy::actors::event_bus::{self, Event, EventBusMsg};
use colloquy::actors::model_config::ModelRegistry;
use colloquy::actors::moderator::state::SessionLimits;
use colloquy::actors::ModeratorMsg;
use colloquy::llm::{AdapterError, ChatMessage, GenerationAdapter, GenerationOptions};
use colloquy::profiles;
use colloquy::supervisor::{ColloquySupervisor, ColloquySupervisorMsg, SupervisorArguments};
use colloquy_types::{PersonaKind, SessionId, SessionSnapshot, TOPIC_DELIBERATION_ALL};

/// Default reply for personas whose script ran out. Trips none of the
/// reply heuristics, so unscripted turns just advance the rotation.
pub const FILLER: &str = "Noted; nothing further from me.";

// ============================================================================
// Scripted Adapter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKey {
    Persona(PersonaKind),
    /// The scoring call carries no system prompt.
    Evaluation,
}

pub struct ScriptedReply {
    outcome: Result<String, AdapterError>,
    delay: Option<Duration>,
}

pub fn reply(text: &str) -> ScriptedReply {
    ScriptedReply {
        outcome: Ok(text.to_string()),
        delay: None,
    }
}

pub fn reply_after(text: &str, millis: u64) -> ScriptedReply {
    ScriptedReply {
        outcome: Ok(text.to_string()),
        delay: Some(Duration::from_millis(millis)),
    }
}

pub fn failure(error: AdapterError) -> ScriptedReply {
    ScriptedReply {
        outcome: Err(error),
        delay: None,
    }
}

/// Generation adapter that replays canned replies per persona, resolved
/// by the system prompt of the request. Replies are consumed in order;
/// an exhausted or missing script yields [`FILLER`].
pub struct ScriptedAdapter {
    scripts: Mutex<HashMap<ScriptKey, VecDeque<ScriptedReply>>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(self, key: ScriptKey, replies: Vec<ScriptedReply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(key, replies.into_iter().collect());
        self
    }

    fn key_for(options: &GenerationOptions) -> ScriptKey {
        let Some(system) = options.system.as_deref() else {
            return ScriptKey::Evaluation;
        };
        for profile in profiles::roster() {
            let marker = format!("You are {}", profile.name);
            if system.contains(&marker) {
                return ScriptKey::Persona(profile.kind);
            }
        }
        ScriptKey::Evaluation
    }

    async fn next_reply(&self, options: &GenerationOptions) -> Result<String, AdapterError> {
        let key = Self::key_for(options);
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(ScriptedReply { outcome, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                outcome
            }
            None => Ok(FILLER.to_string()),
        }
    }
}

#[async_trait]
impl GenerationAdapter for ScriptedAdapter {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, AdapterError> {
        self.next_reply(options).await
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        options: &GenerationOptions,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String, AdapterError> {
        let text = self.next_reply(options).await?;
        let _ = chunks.send(text.clone());
        Ok(text)
    }
}

// ============================================================================
// Tree Spawning
// ============================================================================

pub async fn spawn_colloquy(
    adapter: ScriptedAdapter,
    limits: SessionLimits,
) -> (
    ActorRef<ColloquySupervisorMsg>,
    ActorRef<ModeratorMsg>,
    ActorRef<EventBusMsg>,
) {
    let args = SupervisorArguments {
        adapter: Arc::new(adapter),
        registry: ModelRegistry::new(),
        limits,
        model_override: None,
    };
    let (supervisor, _supervisor_handle) = Actor::spawn(None, ColloquySupervisor, args)
        .await
        .expect("Failed to spawn ColloquySupervisor");

    let moderator = ractor::call!(supervisor, |reply| ColloquySupervisorMsg::GetModerator {
        reply
    })
    .expect("GetModerator RPC failed")
    .expect("moderator should be running");
    let event_bus = ractor::call!(supervisor, |reply| ColloquySupervisorMsg::GetEventBus {
        reply
    })
    .expect("GetEventBus RPC failed")
    .expect("event bus should be running");

    (supervisor, moderator, event_bus)
}

pub async fn start_deliberation(moderator: &ActorRef<ModeratorMsg>, topic: &str) -> SessionId {
    ractor::call!(moderator, |reply| ModeratorMsg::StartDeliberation {
        topic: topic.to_string(),
        reply,
    })
    .expect("StartDeliberation RPC failed")
    .expect("StartDeliberation should be accepted")
}

// ============================================================================
// Polling
// ============================================================================

/// Poll snapshots until `predicate` holds, panicking with the last
/// snapshot when the timeout elapses.
pub async fn wait_for_snapshot(
    moderator: &ActorRef<ModeratorMsg>,
    timeout: Duration,
    predicate: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = ractor::call!(moderator, |reply| ModeratorMsg::GetSnapshot { reply })
            .expect("GetSnapshot RPC failed");
        if predicate(&snapshot) {
            return snapshot;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("snapshot predicate not met within {timeout:?}; last: {snapshot:#?}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

// ============================================================================
// Event Collection
// ============================================================================

struct EventCollector;

#[async_trait]
impl Actor for EventCollector {
    type Msg = Event;
    type State = Arc<Mutex<Vec<Event>>>;
    type Arguments = Arc<Mutex<Vec<Event>>>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        log: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(log)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        event: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.lock().unwrap().push(event);
        Ok(())
    }
}

/// Subscribe a collector to every deliberation topic and return its log.
pub async fn attach_collector(event_bus: &ActorRef<EventBusMsg>) -> Arc<Mutex<Vec<Event>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (collector, _collector_handle) = Actor::spawn(None, EventCollector, log.clone())
        .await
        .expect("Failed to spawn EventCollector");
    event_bus::subscribe(event_bus, TOPIC_DELIBERATION_ALL, collector)
        .await
        .expect("Failed to subscribe EventCollector");
    log
}

/// Wait until the collected events satisfy `predicate`. Emissions hop
/// moderator -> bus -> collector, so they can trail the snapshot that
/// triggered them.
pub async fn wait_for_events(
    log: &Arc<Mutex<Vec<Event>>>,
    timeout: Duration,
    predicate: impl Fn(&[Event]) -> bool,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate(&log.lock().unwrap()) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            let types: Vec<String> = log
                .lock()
                .unwrap()
                .iter()
                .map(|event| event.event_type.to_string())
                .collect();
            panic!("event predicate not met within {timeout:?}; saw: {types:?}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
