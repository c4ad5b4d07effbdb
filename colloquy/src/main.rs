use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colloquy::actors::event_bus::{self, Event, EventType};
use colloquy::actors::model_config::ModelRegistry;
use colloquy::actors::moderator::state::SessionLimits;
use colloquy::actors::ModeratorMsg;
use colloquy::llm::{GenerationAdapter, HttpGenerationAdapter};
use colloquy::supervisor::{ColloquySupervisor, ColloquySupervisorMsg, SupervisorArguments};
use colloquy_types::{
    DeliberationPhase, EvaluationOutcome, SessionSnapshot, TOPIC_DELIBERATION_ALL,
};
use ractor::{call, Actor, ActorProcessingErr, ActorRef};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn load_env_file() {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, "Could not determine current directory for .env lookup");
            return;
        }
    };

    let mut current = cwd.clone();
    loop {
        let candidate = current.join(".env");
        if candidate.exists() {
            match dotenvy::from_path(&candidate) {
                Ok(_) => {
                    tracing::info!(path = %candidate.display(), "Loaded environment from .env");
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.display(),
                        error = %e,
                        "Failed to load .env file"
                    );
                }
            }
            return;
        }

        if !current.pop() {
            break;
        }
    }

    tracing::info!(
        cwd = %cwd.display(),
        "No .env file found in current directory or ancestors; using process environment only"
    );
}

// ============================================================================
// Console Observer
// ============================================================================

/// Subscribes to the deliberation topics and renders them as a live
/// transcript on stdout.
struct ConsoleObserver;

fn payload_str<'a>(event: &'a Event, key: &str) -> &'a str {
    event
        .payload
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("?")
}

fn payload_u64(event: &Event, key: &str) -> u64 {
    event
        .payload
        .get(key)
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}

#[async_trait]
impl Actor for ConsoleObserver {
    type Msg = Event;
    type State = ();
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        event: Self::Msg,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match &event.event_type {
            EventType::SessionStarted => {
                println!("Topic: {}", payload_str(&event, "topic"));
            }
            EventType::PhaseChanged => {
                println!(
                    "\n[phase] {} -> {}",
                    payload_str(&event, "from"),
                    payload_str(&event, "to")
                );
            }
            EventType::SpeakingStarted => {
                println!(
                    "\n--- {} ({}) | turn {} ---",
                    payload_str(&event, "name"),
                    payload_str(&event, "persona"),
                    payload_u64(&event, "turn_count")
                );
            }
            EventType::ResponseChunk => {
                let mut out = std::io::stdout();
                let _ = write!(out, "{}", payload_str(&event, "text"));
                let _ = out.flush();
            }
            EventType::ResponseComplete => {
                println!();
            }
            EventType::ParticipantError => {
                println!(
                    "\n[error] {}: {}",
                    payload_str(&event, "persona"),
                    payload_str(&event, "detail")
                );
            }
            EventType::TurnLimitReached => {
                println!(
                    "\n[limit] {} budget spent ({} turns)",
                    payload_str(&event, "phase"),
                    payload_u64(&event, "turn_count")
                );
            }
            EventType::NominationRecorded => {
                let nominees = event
                    .payload
                    .get("nominees")
                    .and_then(serde_json::Value::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(serde_json::Value::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                println!(
                    "\n[nomination] {} nominated {}",
                    payload_str(&event, "by"),
                    nominees
                );
            }
            EventType::InterjectionReceived => {
                println!("\n[user] {}", payload_str(&event, "text"));
            }
            EventType::FactCheckQueued => {
                println!(
                    "\n[fact-check] verifying {} claim(s) from {}",
                    event
                        .payload
                        .get("claims")
                        .and_then(serde_json::Value::as_array)
                        .map(Vec::len)
                        .unwrap_or(0),
                    payload_str(&event, "source")
                );
            }
            EventType::FactCheckComplete => {
                println!("\n[fact-check] verdict: {}", payload_str(&event, "verdict"));
            }
            EventType::WaitingForFactChecks => {
                println!(
                    "\n[fact-check] holding synthesis for {} open check(s)",
                    payload_u64(&event, "checking")
                );
            }
            EventType::Stopped => {
                println!("\n[stopped] {}", payload_str(&event, "reason"));
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// Run Loop
// ============================================================================

async fn wait_until_stopped(moderator: &ActorRef<ModeratorMsg>) -> Option<SessionSnapshot> {
    loop {
        match call!(moderator, |reply| ModeratorMsg::GetSnapshot { reply }) {
            Ok(snapshot) if snapshot.phase == DeliberationPhase::Stopped => return Some(snapshot),
            Ok(_) => {}
            Err(_) => return None,
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn wait_for_evaluation(
    moderator: &ActorRef<ModeratorMsg>,
    timeout: Duration,
) -> Option<EvaluationOutcome> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        match call!(moderator, |reply| ModeratorMsg::GetSnapshot { reply }) {
            Ok(snapshot) => {
                if let Some(outcome) = snapshot.evaluation {
                    return Some(outcome);
                }
            }
            Err(_) => return None,
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "colloquy=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env values early so provider keys are available to all actors.
    // Search the current directory and ancestors so running from
    // `colloquy/` still picks up a repo-root `.env`.
    load_env_file();

    let topic = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COLLOQUY_TOPIC").ok())
        .unwrap_or_else(|| "Should cities ban private cars from their centers?".to_string());

    let registry = ModelRegistry::new();
    let adapter: Arc<dyn GenerationAdapter> = Arc::new(HttpGenerationAdapter::new());
    let args = SupervisorArguments {
        adapter,
        registry,
        limits: SessionLimits::from_env(),
        model_override: std::env::var("COLLOQUY_MODEL").ok(),
    };

    let (supervisor, _supervisor_handle) = Actor::spawn(None, ColloquySupervisor, args)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start supervision tree: {e}"))?;

    let moderator = call!(supervisor, |reply| ColloquySupervisorMsg::GetModerator {
        reply
    })
    .map_err(|e| anyhow::anyhow!("supervisor unreachable: {e}"))?
    .ok_or_else(|| anyhow::anyhow!("moderator not running"))?;
    let event_bus_ref = call!(supervisor, |reply| ColloquySupervisorMsg::GetEventBus {
        reply
    })
    .map_err(|e| anyhow::anyhow!("supervisor unreachable: {e}"))?
    .ok_or_else(|| anyhow::anyhow!("event bus not running"))?;

    let (observer, _observer_handle) = Actor::spawn(None, ConsoleObserver, ())
        .await
        .map_err(|e| anyhow::anyhow!("failed to start console observer: {e}"))?;
    event_bus::subscribe(&event_bus_ref, TOPIC_DELIBERATION_ALL, observer.clone())
        .await
        .map_err(|e| anyhow::anyhow!("failed to subscribe console observer: {e}"))?;

    let session_id = call!(moderator, |reply| ModeratorMsg::StartDeliberation {
        topic: topic.clone(),
        reply,
    })
    .map_err(|e| anyhow::anyhow!("moderator unreachable: {e}"))?
    .map_err(|e| anyhow::anyhow!("deliberation rejected: {e}"))?;
    tracing::info!(session_id = %session_id.as_str(), topic = %topic, "Deliberation running");

    let mut interrupted = false;
    let final_snapshot = tokio::select! {
        snapshot = wait_until_stopped(&moderator) => snapshot,
        _ = tokio::signal::ctrl_c() => {
            interrupted = true;
            println!("\nStopping deliberation...");
            let _ = moderator.send_message(ModeratorMsg::StopDeliberation);
            wait_until_stopped(&moderator).await
        }
    };
    let Some(final_snapshot) = final_snapshot else {
        anyhow::bail!("moderator terminated before the deliberation finished");
    };

    println!(
        "\nDeliberation finished: {} transcript entries, {} fact-check(s).",
        final_snapshot.transcript.len(),
        final_snapshot.fact_checks.len()
    );

    // A user stop skips synthesis, so there is no evaluation to wait for.
    if !interrupted {
        println!("Scoring the deliberation...");
        match wait_for_evaluation(&moderator, Duration::from_secs(60)).await {
            Some(EvaluationOutcome::Complete { report }) => {
                println!("Overall: {:.1}/10", report.overall);
                for dimension in &report.dimensions {
                    println!(
                        "  {:<24} {:>4.1}  {}",
                        dimension.name, dimension.score, dimension.explanation
                    );
                }
            }
            Some(EvaluationOutcome::Failed { detail }) => {
                println!("Evaluation failed: {detail}");
            }
            None => println!("Evaluation did not finish in time."),
        }
    }

    supervisor.stop(None);
    Ok(())
}
