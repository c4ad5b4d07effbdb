pub mod event_bus;
pub mod model_config;
pub mod moderator;
pub mod participant;

pub use event_bus::{Event, EventBusActor, EventBusConfig, EventBusMsg, EventType};
pub use moderator::{ModeratorActor, ModeratorArguments, ModeratorMsg};
pub use participant::{ParticipantActor, ParticipantArguments, ParticipantMsg};
