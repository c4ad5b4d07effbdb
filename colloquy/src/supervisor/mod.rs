//! Colloquy Supervisor - root of the supervision tree
//!
//! ## Architecture
//!
//! ColloquySupervisor (one_for_one strategy)
//! ├── EventBusActor
//! └── ModeratorActor
//!     └── ParticipantActor x6 (linked to the moderator)
//!
//! ## Supervision Events
//!
//! The supervisor handles:
//! - `ActorStarted`: New child actor started
//! - `ActorFailed`: Child actor crashed/failed
//! - `ActorTerminated`: Child actor terminated normally
//!
//! Every supervision event is counted and republished on the event bus so
//! observers can watch tree health without process-level hooks.

use std::sync::Arc;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tracing::{error, info};

use crate::actors::event_bus::{Event, EventBusActor, EventBusConfig, EventBusMsg, EventType};
use crate::actors::model_config::ModelRegistry;
use crate::actors::moderator::state::SessionLimits;
use crate::actors::moderator::{ModeratorActor, ModeratorArguments, ModeratorMsg};
use crate::llm::GenerationAdapter;

/// Root supervisor for one colloquy process
#[derive(Debug, Default)]
pub struct ColloquySupervisor;

/// Arguments for spawning ColloquySupervisor
#[derive(Clone)]
pub struct SupervisorArguments {
    pub adapter: Arc<dyn GenerationAdapter>,
    pub registry: ModelRegistry,
    pub limits: SessionLimits,
    pub model_override: Option<String>,
}

/// Supervisor state
pub struct SupervisorState {
    pub event_bus: Option<ActorRef<EventBusMsg>>,
    pub moderator: Option<ActorRef<ModeratorMsg>>,
    pub supervision_event_counts: SupervisionEventCounts,
    pub last_supervision_failure: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisionEventCounts {
    pub actor_started: u64,
    pub actor_failed: u64,
    pub actor_terminated: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorHealth {
    pub event_bus_healthy: bool,
    pub moderator_healthy: bool,
    pub supervision_event_counts: SupervisionEventCounts,
    pub last_supervision_failure: Option<String>,
}

/// Messages handled by ColloquySupervisor
#[derive(Debug)]
pub enum ColloquySupervisorMsg {
    /// The moderator child, if alive
    GetModerator {
        reply: RpcReplyPort<Option<ActorRef<ModeratorMsg>>>,
    },
    /// The event bus child, if alive
    GetEventBus {
        reply: RpcReplyPort<Option<ActorRef<EventBusMsg>>>,
    },
    /// Return health snapshot and supervision counters.
    GetHealth {
        reply: RpcReplyPort<SupervisorHealth>,
    },
}

#[async_trait]
impl Actor for ColloquySupervisor {
    type Msg = ColloquySupervisorMsg;
    type State = SupervisorState;
    type Arguments = SupervisorArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            supervisor = %myself.get_id(),
            "ColloquySupervisor starting"
        );

        // No fixed names - allows multiple supervisors in tests.
        let (event_bus, _handle) = Actor::spawn_linked(
            None,
            EventBusActor,
            EventBusConfig::default(),
            myself.get_cell(),
        )
        .await
        .map_err(|e| {
            error!("Failed to spawn EventBusActor: {}", e);
            ActorProcessingErr::from(e)
        })?;

        let moderator_args = ModeratorArguments {
            event_bus: event_bus.clone(),
            adapter: args.adapter,
            registry: args.registry,
            limits: args.limits,
            model_override: args.model_override,
        };
        let (moderator, _handle) =
            Actor::spawn_linked(None, ModeratorActor, moderator_args, myself.get_cell())
                .await
                .map_err(|e| {
                    error!("Failed to spawn ModeratorActor: {}", e);
                    ActorProcessingErr::from(e)
                })?;

        info!(
            event_bus = %event_bus.get_id(),
            moderator = %moderator.get_id(),
            "Supervision tree ready"
        );

        Ok(SupervisorState {
            event_bus: Some(event_bus),
            moderator: Some(moderator),
            supervision_event_counts: SupervisionEventCounts::default(),
            last_supervision_failure: None,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ColloquySupervisorMsg::GetModerator { reply } => {
                let _ = reply.send(state.moderator.clone());
            }
            ColloquySupervisorMsg::GetEventBus { reply } => {
                let _ = reply.send(state.event_bus.clone());
            }
            ColloquySupervisorMsg::GetHealth { reply } => {
                let _ = reply.send(SupervisorHealth {
                    event_bus_healthy: state.event_bus.is_some(),
                    moderator_healthy: state.moderator.is_some(),
                    supervision_event_counts: state.supervision_event_counts.clone(),
                    last_supervision_failure: state.last_supervision_failure.clone(),
                });
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            supervisor = %myself.get_id(),
            event = ?event,
            "ColloquySupervisor received supervision event"
        );
        match &event {
            SupervisionEvent::ActorStarted(_) => {
                state.supervision_event_counts.actor_started += 1;
            }
            SupervisionEvent::ActorFailed(actor_cell, failure) => {
                state.supervision_event_counts.actor_failed += 1;
                state.last_supervision_failure =
                    Some(format!("actor_id={} error={failure}", actor_cell.get_id()));
            }
            SupervisionEvent::ActorTerminated(actor_cell, _, _) => {
                state.supervision_event_counts.actor_terminated += 1;
                if let Some(moderator) = &state.moderator {
                    if moderator.get_id() == actor_cell.get_id() {
                        state.moderator = None;
                    }
                }
                if let Some(event_bus) = &state.event_bus {
                    if event_bus.get_id() == actor_cell.get_id() {
                        state.event_bus = None;
                    }
                }
            }
            _ => {}
        }

        if let Some(event_bus) = state.event_bus.clone() {
            let supervision_event = match Event::new(
                EventType::Custom("supervision.event".to_string()),
                "supervisor.colloquy.supervision",
                serde_json::json!({
                    "supervisor_id": myself.get_id().to_string(),
                    "event_debug": format!("{event:?}"),
                }),
                "colloquy_supervisor",
            ) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to build supervision event payload");
                    return Ok(());
                }
            };

            if let Err(e) = ractor::cast!(
                event_bus,
                EventBusMsg::Publish {
                    event: supervision_event,
                }
            ) {
                tracing::warn!(error = %e, "Failed to publish supervision event");
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        info!(supervisor = %myself.get_id(), "ColloquySupervisor stopped");
        Ok(())
    }
}
