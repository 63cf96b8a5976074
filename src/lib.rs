//! Build, read and write Malmo mission documents.
//!
//! ```
//! use mission_spec::MissionSpec;
//!
//! let mut mission = MissionSpec::new();
//! mission.time_limit_in_seconds(30.0);
//! mission.start_at(0.5, 227.0, 0.5);
//! mission.request_video(320, 240);
//! mission.allow_continuous_movement_command("move");
//!
//! let xml = mission.to_xml(true).unwrap();
//! let parsed = MissionSpec::from_xml(&xml, true).unwrap();
//! assert_eq!(parsed, mission);
//! assert_eq!(parsed.get_video_channels(0).unwrap(), 3);
//! ```

pub mod commands;
pub mod error;
pub mod mission;
pub mod schema;
mod xml;

pub use commands::{CommandCategory, CommandHandlers, CommandPolicy, VerbSet};
pub use error::{MissionError, Result, SchemaViolation};
pub use mission::{
    AgentMode, AgentSection, BlockPos, DrawDirective, EndPosition, MissionSpec,
    ObservationRequest, Placement, Position, PositionReward, ServerSection, TimeOfDay,
    VideoProducer, WorldGenerator, XML_NAMESPACE,
};
pub use schema::{SchemaValidator, StructuralValidator};
