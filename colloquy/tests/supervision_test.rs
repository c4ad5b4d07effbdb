//! Supervision tests
//!
//! These tests verify the supervision tree around a deliberation:
//! - The root supervisor spawns the event bus and moderator as linked children
//! - Health reporting reflects live children
//! - Work flows through a moderator owned by the supervisor
//! - Registry auto-cleanup works (where_is returns None after the supervisor stops)

mod common;

use std::sync::Arc;
use std::time::Duration;

use ractor::Actor;
use tokio::time::timeout;

use colloquy::actors::model_config::ModelRegistry;
use colloquy::actors::moderator::state::SessionLimits;
use colloquy::actors::ModeratorMsg;
use colloquy::supervisor::{ColloquySupervisor, ColloquySupervisorMsg, SupervisorArguments};
use colloquy_types::{DeliberationPhase, PersonaKind};

use common::{
    reply_after, spawn_colloquy, start_deliberation, wait_for_snapshot, ScriptKey,
    ScriptedAdapter, FILLER,
};

#[tokio::test]
async fn test_supervisor_spawns_tree_and_reports_health() {
    let args = SupervisorArguments {
        adapter: Arc::new(ScriptedAdapter::new()),
        registry: ModelRegistry::new(),
        limits: SessionLimits::default(),
        model_override: None,
    };
    let (supervisor, _handle) = Actor::spawn(
        Some("test_colloquy_supervisor_health".to_string()),
        ColloquySupervisor,
        args,
    )
    .await
    .expect("Failed to spawn ColloquySupervisor");

    assert!(
        ractor::registry::where_is("test_colloquy_supervisor_health".to_string()).is_some(),
        "supervisor should be in registry after spawn"
    );

    let health = ractor::call!(supervisor, |reply| ColloquySupervisorMsg::GetHealth {
        reply
    })
    .expect("GetHealth RPC failed");
    assert!(health.event_bus_healthy, "event bus should be healthy after startup");
    assert!(health.moderator_healthy, "moderator should be healthy after startup");
    assert_eq!(health.last_supervision_failure, None);

    // The children answer RPCs through the refs the supervisor hands out.
    let moderator = ractor::call!(supervisor, |reply| ColloquySupervisorMsg::GetModerator {
        reply
    })
    .expect("GetModerator RPC failed")
    .expect("moderator should be running");
    let snapshot = ractor::call!(moderator, |reply| ModeratorMsg::GetSnapshot { reply })
        .expect("GetSnapshot RPC failed");
    assert_eq!(snapshot.phase, DeliberationPhase::Uninitialized);

    supervisor.stop(None);
}

#[tokio::test]
async fn test_deliberation_flows_through_supervised_children() {
    // Delay the framing reply so the framework phase stays observable;
    // FILLER keeps the session's flow identical to an unscripted run.
    let adapter = ScriptedAdapter::new().script(
        ScriptKey::Persona(PersonaKind::Synthesist),
        vec![reply_after(FILLER, 500)],
    );
    let (supervisor, moderator, _event_bus) =
        spawn_colloquy(adapter, SessionLimits::default()).await;

    start_deliberation(&moderator, "Does remote work help small teams?").await;

    let snapshot = wait_for_snapshot(&moderator, Duration::from_secs(2), |s| {
        s.phase == DeliberationPhase::Framework && s.turn_count >= 1
    })
    .await;
    assert_eq!(snapshot.current_speaker, Some(PersonaKind::Synthesist));

    supervisor.stop(None);
}

#[tokio::test]
async fn test_registry_cleanup_after_supervisor_stops() {
    let args = SupervisorArguments {
        adapter: Arc::new(ScriptedAdapter::new()),
        registry: ModelRegistry::new(),
        limits: SessionLimits::default(),
        model_override: None,
    };
    let (supervisor, handle) = Actor::spawn(
        Some("test_colloquy_supervisor_cleanup".to_string()),
        ColloquySupervisor,
        args,
    )
    .await
    .expect("Failed to spawn ColloquySupervisor");

    assert!(
        ractor::registry::where_is("test_colloquy_supervisor_cleanup".to_string()).is_some(),
        "supervisor should be in registry after spawn"
    );

    supervisor.stop(None);

    let _ = timeout(Duration::from_secs(2), handle).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(
        ractor::registry::where_is("test_colloquy_supervisor_cleanup".to_string()).is_none(),
        "supervisor should be removed from registry after stop"
    );
}
