//! EventBusActor - pub/sub event distribution using ractor process groups
//!
//! The moderator publishes everything that happens in a deliberation here;
//! UI layers, loggers, and tests subscribe without touching the moderator.
//!
//! # Architecture
//!
//! - Uses `ractor::pg` for topic-based pub/sub (no custom subscriber
//!   management)
//! - Supports wildcard topic patterns (e.g., "deliberation.*")
//! - Keeps a bounded ring of recent events for introspection
//! - Maintains subscription stats for monitoring/debugging
//!
//! # Example
//!
//! ```text
//! // Subscribe to everything the deliberation emits
//! cast!(event_bus, EventBusMsg::Subscribe {
//!     topic: "deliberation.*".to_string(),
//!     subscriber: observer.clone(),
//! })?;
//!
//! // Publish an event
//! let event = Event::new(EventType::PhaseChanged, "deliberation.phase", payload, "moderator")?;
//! cast!(event_bus, EventBusMsg::Publish { event })?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ractor::{cast, Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing;

// ============================================================================
// Data Types
// ============================================================================

/// Core event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Unique event identifier (ULID)
    pub id: String,

    /// Event type classification
    pub event_type: EventType,

    /// Topic for routing (hierarchical, e.g., "deliberation.fact_check")
    pub topic: String,

    /// Event payload (JSON value)
    pub payload: serde_json::Value,

    /// Timestamp in UTC
    pub timestamp: DateTime<Utc>,

    /// Source actor or user identifier
    pub source: String,

    /// Optional correlation ID, carries the session id
    pub correlation_id: Option<String>,
}

impl Event {
    /// Create a new event with auto-generated ID and timestamp
    pub fn new(
        event_type: EventType,
        topic: impl Into<String>,
        payload: impl Serialize,
        source: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: ulid::Ulid::new().to_string(),
            event_type,
            topic: topic.into(),
            payload: serde_json::to_value(payload)?,
            timestamp: Utc::now(),
            source: source.into(),
            correlation_id: None,
        })
    }

    /// Check if this event matches a topic pattern
    /// Supports wildcards: "deliberation.*" matches "deliberation.turn"
    pub fn matches_topic(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        if pattern.ends_with(".*") {
            let prefix = &pattern[..pattern.len() - 2];
            self.topic.starts_with(prefix)
                && (self.topic.len() == prefix.len()
                    || self.topic[prefix.len()..].starts_with('.'))
        } else {
            self.topic == pattern
        }
    }

    /// Set correlation ID (builder pattern)
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Everything a deliberation session can announce to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Session lifecycle
    SessionStarted,
    TopicSet,
    PhaseChanged,
    Stopped,
    EvaluationComplete,

    // Turn flow
    SpeakingStarted,
    ResponseChunk,
    ResponseComplete,
    ParticipantError,
    TurnCountUpdated,
    TurnLimitReached,

    // Panel dynamics
    NominationRecorded,
    InterjectionReceived,

    // Fact-checking
    FactCheckQueued,
    FactCheckDropped,
    FactCheckComplete,
    WaitingForFactChecks,

    // Custom (for extensibility)
    #[serde(rename = "custom")]
    Custom(String),
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::SessionStarted => write!(f, "session_started"),
            EventType::TopicSet => write!(f, "topic_set"),
            EventType::PhaseChanged => write!(f, "phase_changed"),
            EventType::Stopped => write!(f, "stopped"),
            EventType::EvaluationComplete => write!(f, "evaluation_complete"),
            EventType::SpeakingStarted => write!(f, "speaking_started"),
            EventType::ResponseChunk => write!(f, "response_chunk"),
            EventType::ResponseComplete => write!(f, "response_complete"),
            EventType::ParticipantError => write!(f, "participant_error"),
            EventType::TurnCountUpdated => write!(f, "turn_count_updated"),
            EventType::TurnLimitReached => write!(f, "turn_limit_reached"),
            EventType::NominationRecorded => write!(f, "nomination_recorded"),
            EventType::InterjectionReceived => write!(f, "interjection_received"),
            EventType::FactCheckQueued => write!(f, "fact_check_queued"),
            EventType::FactCheckDropped => write!(f, "fact_check_dropped"),
            EventType::FactCheckComplete => write!(f, "fact_check_complete"),
            EventType::WaitingForFactChecks => write!(f, "waiting_for_fact_checks"),
            EventType::Custom(s) => write!(f, "custom.{}", s),
        }
    }
}

// ============================================================================
// EventBusActor
// ============================================================================

/// Messages handled by EventBusActor
#[derive(Debug)]
pub enum EventBusMsg {
    /// Publish an event to its topic
    Publish { event: Event },

    /// Subscribe an actor to a topic
    Subscribe {
        topic: String,
        subscriber: ActorRef<Event>,
    },

    /// Unsubscribe an actor from a topic
    Unsubscribe {
        topic: String,
        subscriber: ActorRef<Event>,
    },

    /// Get list of subscribers for a topic (for debugging)
    GetSubscribers {
        topic: String,
        reply: RpcReplyPort<Vec<ractor::ActorId>>,
    },

    /// Subscription counts per topic
    GetStats {
        reply: RpcReplyPort<HashMap<String, usize>>,
    },

    /// The most recent events, oldest first
    RecentEvents {
        limit: usize,
        reply: RpcReplyPort<Vec<Event>>,
    },
}

/// Configuration for EventBusActor
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// How many published events the introspection ring retains
    pub recent_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 64,
        }
    }
}

/// State for EventBusActor
pub struct EventBusState {
    /// Bounded ring of recently published events
    recent: VecDeque<Event>,

    /// Cache of topic -> subscriber count (for metrics/debugging)
    subscription_stats: HashMap<String, usize>,

    /// Configuration
    config: EventBusConfig,
}

/// Actor that provides pub/sub event distribution
#[derive(Debug, Default)]
pub struct EventBusActor;

#[async_trait]
impl Actor for EventBusActor {
    type Msg = EventBusMsg;
    type State = EventBusState;
    type Arguments = EventBusConfig;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        config: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            "EventBusActor starting"
        );

        Ok(EventBusState {
            recent: VecDeque::with_capacity(config.recent_capacity),
            subscription_stats: HashMap::new(),
            config,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            EventBusMsg::Publish { event } => self.handle_publish(event, state).await,
            EventBusMsg::Subscribe { topic, subscriber } => {
                self.handle_subscribe(topic, subscriber, state).await
            }
            EventBusMsg::Unsubscribe { topic, subscriber } => {
                self.handle_unsubscribe(topic, subscriber, state).await
            }
            EventBusMsg::GetSubscribers { topic, reply } => {
                let members = ractor::pg::get_members(&topic);
                let actor_ids: Vec<ractor::ActorId> =
                    members.iter().map(|cell| cell.get_id()).collect();
                let _ = reply.send(actor_ids);
                Ok(())
            }
            EventBusMsg::GetStats { reply } => {
                let _ = reply.send(state.subscription_stats.clone());
                Ok(())
            }
            EventBusMsg::RecentEvents { limit, reply } => {
                let skip = state.recent.len().saturating_sub(limit);
                let events: Vec<Event> = state.recent.iter().skip(skip).cloned().collect();
                let _ = reply.send(events);
                Ok(())
            }
        }
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            "EventBusActor stopped"
        );
        Ok(())
    }
}

impl EventBusActor {
    async fn handle_publish(
        &self,
        event: Event,
        state: &mut EventBusState,
    ) -> Result<(), ActorProcessingErr> {
        tracing::debug!(
            event_id = %event.id,
            topic = %event.topic,
            event_type = %event.event_type,
            "Publishing event"
        );

        if state.config.recent_capacity > 0 {
            if state.recent.len() == state.config.recent_capacity {
                state.recent.pop_front();
            }
            state.recent.push_back(event.clone());
        }

        // Broadcast to exact topic subscribers via process groups
        self.broadcast_to_topic(&event.topic, &event).await?;

        // Broadcast to wildcard subscribers
        self.broadcast_to_wildcards(&event).await?;

        Ok(())
    }

    async fn handle_subscribe(
        &self,
        topic: String,
        subscriber: ActorRef<Event>,
        state: &mut EventBusState,
    ) -> Result<(), ActorProcessingErr> {
        // Join the process group for this topic
        ractor::pg::join(topic.clone(), vec![subscriber.get_cell()]);

        *state.subscription_stats.entry(topic.clone()).or_insert(0) += 1;

        tracing::info!(
            topic = %topic,
            subscriber = %subscriber.get_id(),
            "Actor subscribed to topic"
        );

        Ok(())
    }

    async fn handle_unsubscribe(
        &self,
        topic: String,
        subscriber: ActorRef<Event>,
        state: &mut EventBusState,
    ) -> Result<(), ActorProcessingErr> {
        // Leave the process group
        ractor::pg::leave(topic.clone(), vec![subscriber.get_cell()]);

        if let Some(count) = state.subscription_stats.get_mut(&topic) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.subscription_stats.remove(&topic);
            }
        }

        tracing::info!(
            topic = %topic,
            subscriber = %subscriber.get_id(),
            "Actor unsubscribed from topic"
        );

        Ok(())
    }

    async fn broadcast_to_topic(
        &self,
        topic: &str,
        event: &Event,
    ) -> Result<(), ActorProcessingErr> {
        let members = ractor::pg::get_members(&topic.to_string());

        for member in members {
            let actor_id = member.get_id();
            let actor_ref: ActorRef<Event> = member.into();
            if let Err(e) = ractor::cast!(actor_ref, event.clone()) {
                tracing::warn!(
                    topic = %topic,
                    actor_id = %actor_id,
                    error = %e,
                    "Failed to send event to subscriber"
                );
            }
        }

        Ok(())
    }

    async fn broadcast_to_wildcards(&self, event: &Event) -> Result<(), ActorProcessingErr> {
        // Split topic and broadcast to each parent pattern
        let parts: Vec<&str> = event.topic.split('.').collect();

        for i in 1..parts.len() {
            let wildcard_topic = format!("{}.*", parts[..i].join("."));
            self.broadcast_to_topic(&wildcard_topic, event).await?;
        }

        // Also broadcast to root wildcard
        self.broadcast_to_topic("*", event).await?;

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convenience function to publish an event
pub async fn publish_event(
    event_bus: &ActorRef<EventBusMsg>,
    event: Event,
) -> Result<(), ractor::RactorErr<EventBusMsg>> {
    cast!(event_bus, EventBusMsg::Publish { event })
}

/// Convenience function to subscribe to a topic
pub async fn subscribe(
    event_bus: &ActorRef<EventBusMsg>,
    topic: impl Into<String>,
    subscriber: ActorRef<Event>,
) -> Result<(), ractor::RactorErr<EventBusMsg>> {
    cast!(
        event_bus,
        EventBusMsg::Subscribe {
            topic: topic.into(),
            subscriber,
        }
    )
}

/// Convenience function to unsubscribe from a topic
pub async fn unsubscribe(
    event_bus: &ActorRef<EventBusMsg>,
    topic: impl Into<String>,
    subscriber: ActorRef<Event>,
) -> Result<(), ractor::RactorErr<EventBusMsg>> {
    cast!(
        event_bus,
        EventBusMsg::Unsubscribe {
            topic: topic.into(),
            subscriber,
        }
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn test_event(topic: &str) -> Event {
        Event {
            id: "test".to_string(),
            event_type: EventType::Custom("test".to_string()),
            topic: topic.to_string(),
            payload: json!({}),
            timestamp: Utc::now(),
            source: "test".to_string(),
            correlation_id: None,
        }
    }

    #[test]
    fn test_event_matches_topic_exact() {
        let event = test_event("deliberation.fact_check.complete");

        assert!(event.matches_topic("deliberation.fact_check.complete"));
        assert!(!event.matches_topic("deliberation.fact_check"));
        assert!(!event.matches_topic("deliberation.fact_check.complete.extra"));
    }

    #[test]
    fn test_event_matches_topic_wildcard() {
        let event = test_event("deliberation.fact_check.complete");

        assert!(event.matches_topic("deliberation.*"));
        assert!(event.matches_topic("deliberation.fact_check.*"));
        assert!(event.matches_topic("*"));
        assert!(!event.matches_topic("other.*"));
        assert!(!event.matches_topic("deliberation.turn.*"));
    }

    #[test]
    fn test_event_new() {
        let event = Event::new(
            EventType::PhaseChanged,
            "deliberation.phase",
            json!({"from": "framework", "to": "discussion"}),
            "moderator",
        )
        .unwrap();

        assert_eq!(event.event_type, EventType::PhaseChanged);
        assert_eq!(event.topic, "deliberation.phase");
        assert_eq!(event.source, "moderator");
        assert!(event.correlation_id.is_none());
        assert_eq!(event.id.len(), 26);
    }

    #[test]
    fn test_event_with_correlation_id() {
        let event = Event::new(EventType::Stopped, "deliberation.lifecycle", json!({}), "moderator")
            .unwrap()
            .with_correlation_id("session-123");

        assert_eq!(event.correlation_id, Some("session-123".to_string()));
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(EventType::FactCheckQueued.to_string(), "fact_check_queued");
        assert_eq!(EventType::ResponseChunk.to_string(), "response_chunk");
        assert_eq!(
            EventType::Custom("heartbeat".to_string()).to_string(),
            "custom.heartbeat"
        );
    }

    /// Test subscriber that appends every received event to a shared log.
    struct Collector;

    #[async_trait]
    impl Actor for Collector {
        type Msg = Event;
        type State = Arc<Mutex<Vec<Event>>>;
        type Arguments = Arc<Mutex<Vec<Event>>>;

        async fn pre_start(
            &self,
            _myself: ActorRef<Self::Msg>,
            args: Self::Arguments,
        ) -> Result<Self::State, ActorProcessingErr> {
            Ok(args)
        }

        async fn handle(
            &self,
            _myself: ActorRef<Self::Msg>,
            message: Self::Msg,
            state: &mut Self::State,
        ) -> Result<(), ActorProcessingErr> {
            state.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_wildcard_subscriber_receives_child_topics() {
        let (bus, bus_handle) = Actor::spawn(None, EventBusActor, EventBusConfig::default())
            .await
            .unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let (collector, collector_handle) = Actor::spawn(None, Collector, received.clone())
            .await
            .unwrap();

        subscribe(&bus, "deliberation.*", collector.clone())
            .await
            .unwrap();

        let event = Event::new(
            EventType::TurnCountUpdated,
            "deliberation.turn",
            json!({"turn_count": 3}),
            "moderator",
        )
        .unwrap();
        publish_event(&bus, event.clone()).await.unwrap();

        // Unrelated topic must not be delivered
        let other = Event::new(EventType::Custom("x".to_string()), "other.topic", json!({}), "t")
            .unwrap();
        publish_event(&bus, other).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let log = received.lock().unwrap().clone();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, event.id);

        collector.stop(None);
        bus.stop(None);
        let _ = collector_handle.await;
        let _ = bus_handle.await;
    }

    #[tokio::test]
    async fn test_recent_ring_is_bounded() {
        let (bus, bus_handle) = Actor::spawn(
            None,
            EventBusActor,
            EventBusConfig { recent_capacity: 2 },
        )
        .await
        .unwrap();

        for i in 0..3 {
            let event = Event::new(
                EventType::ResponseChunk,
                "deliberation.response",
                json!({"seq": i}),
                "moderator",
            )
            .unwrap();
            publish_event(&bus, event).await.unwrap();
        }

        let recent = ractor::call!(bus, |reply| EventBusMsg::RecentEvents { limit: 10, reply })
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload["seq"], 1);
        assert_eq!(recent[1].payload["seq"], 2);

        bus.stop(None);
        let _ = bus_handle.await;
    }
}
