use serde::Serialize;

use crate::commands::{CommandCategory, CommandHandlers, CommandPolicy};
use crate::error::{MissionError, Result};
use crate::schema::{SchemaValidator, StructuralValidator};
use crate::xml;

pub const XML_NAMESPACE: &str = "http://ProjectMalmo.microsoft.com";
pub const DEFAULT_FLAT_WORLD: &str = "3;7,220*1,5*3,2;3;,biome_1";
pub const DEFAULT_AGENT_NAME: &str = "Cristina";
const DEFAULT_TIME_LIMIT_MS: f64 = 10_000.0;
const END_POSITION_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorldGenerator {
    Flat {
        generator_string: String,
        force_reset: bool,
    },
    Default {
        seed: Option<String>,
        force_reset: bool,
    },
}

impl Default for WorldGenerator {
    fn default() -> Self {
        Self::Flat {
            generator_string: DEFAULT_FLAT_WORLD.to_string(),
            force_reset: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOfDay {
    /// Minecraft ticks since dawn, stored as given.
    pub start_time: i32,
    pub allow_passage_of_time: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "draw", rename_all = "snake_case")]
pub enum DrawDirective {
    Block {
        at: BlockPos,
        block_type: String,
    },
    Cuboid {
        from: BlockPos,
        to: BlockPos,
        block_type: String,
    },
    Item {
        at: BlockPos,
        item_type: String,
    },
    Sphere {
        center: BlockPos,
        radius: i32,
        block_type: String,
    },
    Line {
        from: BlockPos,
        to: BlockPos,
        block_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSection {
    pub time_of_day: Option<TimeOfDay>,
    pub generator: WorldGenerator,
    pub drawing: Vec<DrawDirective>,
    pub time_limit_ms: Option<f64>,
    pub quit_when_any_agent_finishes: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            time_of_day: None,
            generator: WorldGenerator::default(),
            drawing: Vec::new(),
            time_limit_ms: Some(DEFAULT_TIME_LIMIT_MS),
            quit_when_any_agent_finishes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AgentMode {
    #[default]
    Survival,
    Creative,
    Spectator,
}

impl AgentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Survival => "Survival",
            Self::Creative => "Creative",
            Self::Spectator => "Spectator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Survival" => Some(Self::Survival),
            "Creative" => Some(Self::Creative),
            "Spectator" => Some(Self::Spectator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Start position of an agent. Orientation is only present when the mission
/// text carried it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub at: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
}

impl From<Position> for Placement {
    fn from(at: Position) -> Self {
        Self {
            at,
            yaw: None,
            pitch: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EndPosition {
    pub at: Position,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoProducer {
    pub width: u32,
    pub height: u32,
    pub want_depth: bool,
}

impl VideoProducer {
    /// 4 (RGBD) with depth, 3 (RGB) without.
    pub fn channels(&self) -> u32 {
        if self.want_depth {
            4
        } else {
            3
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionReward {
    pub at: Position,
    pub amount: f64,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "observe", rename_all = "snake_case")]
pub enum ObservationRequest {
    FullStats,
    RecentCommands,
    HotBar,
    FullInventory,
    Grid {
        min: BlockPos,
        max: BlockPos,
        name: String,
    },
    Distance {
        at: BlockPos,
        name: String,
    },
    Chat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSection {
    pub name: String,
    pub mode: AgentMode,
    pub start: Option<Placement>,
    pub end_positions: Vec<EndPosition>,
    pub video: Option<VideoProducer>,
    pub rewards: Vec<PositionReward>,
    pub observations: Vec<ObservationRequest>,
    pub command_handlers: CommandHandlers,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            mode: AgentMode::default(),
            start: None,
            end_positions: Vec::new(),
            video: None,
            rewards: Vec::new(),
            observations: Vec::new(),
            command_handlers: CommandHandlers::default(),
        }
    }
}

/// A mission document: world settings plus one section per agent role.
///
/// Mutators only ever touch the first agent. Missions with more agents come
/// from parsed XML and are read through the role-indexed accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionSpec {
    pub(crate) summary: String,
    pub(crate) server: ServerSection,
    pub(crate) agents: Vec<AgentSection>,
}

impl Default for MissionSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionSpec {
    /// Flat world, ten second time limit, one survival agent without sensors
    /// or command handlers.
    pub fn new() -> Self {
        Self {
            summary: String::new(),
            server: ServerSection::default(),
            agents: vec![AgentSection::default()],
        }
    }

    /// Parses mission XML, checking it with [`StructuralValidator`] first when
    /// `validate` is set.
    pub fn from_xml(text: &str, validate: bool) -> Result<Self> {
        if validate {
            Self::from_xml_with(text, &StructuralValidator)
        } else {
            xml::read_mission(text)
        }
    }

    pub fn from_xml_with(text: &str, validator: &dyn SchemaValidator) -> Result<Self> {
        validator.validate(text)?;
        xml::read_mission(text)
    }

    pub fn to_xml(&self, pretty_print: bool) -> Result<String> {
        xml::write_mission(self, pretty_print)
    }

    pub(crate) fn from_parts(
        summary: String,
        server: ServerSection,
        agents: Vec<AgentSection>,
    ) -> Self {
        Self {
            summary,
            server,
            agents,
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = summary.into();
    }

    pub fn server(&self) -> &ServerSection {
        &self.server
    }

    pub fn agents(&self) -> &[AgentSection] {
        &self.agents
    }

    // -------------------- server settings --------------------

    /// Replaces the time limit. The value is not range checked.
    pub fn time_limit_in_seconds(&mut self, seconds: f64) {
        tracing::trace!(seconds, "Setting mission time limit");
        self.server.time_limit_ms = Some(seconds * 1000.0);
    }

    pub fn create_default_terrain(&mut self) {
        let force_reset = self.world_force_reset();
        if !matches!(self.server.generator, WorldGenerator::Default { .. }) {
            self.server.generator = WorldGenerator::Default {
                seed: None,
                force_reset,
            };
        }
    }

    /// Uses Minecraft's terrain generator with a fixed seed.
    pub fn set_world_seed(&mut self, seed: impl Into<String>) {
        let force_reset = self.world_force_reset();
        self.server.generator = WorldGenerator::Default {
            seed: Some(seed.into()),
            force_reset,
        };
    }

    /// Makes the world generator rebuild the world instead of reusing it.
    pub fn force_world_reset(&mut self) {
        match &mut self.server.generator {
            WorldGenerator::Flat { force_reset, .. }
            | WorldGenerator::Default { force_reset, .. } => *force_reset = true,
        }
    }

    fn world_force_reset(&self) -> bool {
        match &self.server.generator {
            WorldGenerator::Flat { force_reset, .. }
            | WorldGenerator::Default { force_reset, .. } => *force_reset,
        }
    }

    /// `ticks` is stored verbatim, 0 = dawn, 6000 = noon, 18000 = midnight.
    pub fn set_time_of_day(&mut self, ticks: i32, allow_time_to_pass: bool) {
        self.server.time_of_day = Some(TimeOfDay {
            start_time: ticks,
            allow_passage_of_time: allow_time_to_pass,
        });
    }

    pub fn draw_block(&mut self, x: i32, y: i32, z: i32, block_type: &str) {
        self.draw(DrawDirective::Block {
            at: BlockPos::new(x, y, z),
            block_type: block_type.to_string(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_cuboid(
        &mut self,
        x1: i32,
        y1: i32,
        z1: i32,
        x2: i32,
        y2: i32,
        z2: i32,
        block_type: &str,
    ) {
        self.draw(DrawDirective::Cuboid {
            from: BlockPos::new(x1, y1, z1),
            to: BlockPos::new(x2, y2, z2),
            block_type: block_type.to_string(),
        });
    }

    pub fn draw_item(&mut self, x: i32, y: i32, z: i32, item_type: &str) {
        self.draw(DrawDirective::Item {
            at: BlockPos::new(x, y, z),
            item_type: item_type.to_string(),
        });
    }

    pub fn draw_sphere(&mut self, x: i32, y: i32, z: i32, radius: i32, block_type: &str) {
        self.draw(DrawDirective::Sphere {
            center: BlockPos::new(x, y, z),
            radius,
            block_type: block_type.to_string(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_line(
        &mut self,
        x1: i32,
        y1: i32,
        z1: i32,
        x2: i32,
        y2: i32,
        z2: i32,
        block_type: &str,
    ) {
        self.draw(DrawDirective::Line {
            from: BlockPos::new(x1, y1, z1),
            to: BlockPos::new(x2, y2, z2),
            block_type: block_type.to_string(),
        });
    }

    fn draw(&mut self, directive: DrawDirective) {
        tracing::trace!(?directive, "Appending draw directive");
        self.server.drawing.push(directive);
    }

    // -------------------- agent settings --------------------

    fn first_agent(&mut self) -> &mut AgentSection {
        if self.agents.is_empty() {
            self.agents.push(AgentSection::default());
        }
        &mut self.agents[0]
    }

    /// Replaces the start placement, orientation included.
    pub fn start_at(&mut self, x: f64, y: f64, z: f64) {
        self.first_agent().start = Some(Position::new(x, y, z).into());
    }

    /// Adds a position that ends the mission. May be called repeatedly.
    pub fn end_at(&mut self, x: f64, y: f64, z: f64) {
        self.first_agent().end_positions.push(EndPosition {
            at: Position::new(x, y, z),
            tolerance: END_POSITION_TOLERANCE,
        });
    }

    pub fn set_mode_to_creative(&mut self) {
        self.first_agent().mode = AgentMode::Creative;
    }

    pub fn set_mode_to_spectator(&mut self) {
        self.first_agent().mode = AgentMode::Spectator;
    }

    /// Requests RGB frames, or updates the size of an existing request. An
    /// earlier depth request is kept.
    pub fn request_video(&mut self, width: u32, height: u32) {
        let agent = self.first_agent();
        let want_depth = agent.video.is_some_and(|video| video.want_depth);
        agent.video = Some(VideoProducer {
            width,
            height,
            want_depth,
        });
    }

    pub fn request_video_with_depth(&mut self, width: u32, height: u32) {
        self.first_agent().video = Some(VideoProducer {
            width,
            height,
            want_depth: true,
        });
    }

    pub fn reward_for_reaching_position(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        amount: f64,
        tolerance: f64,
    ) {
        self.first_agent().rewards.push(PositionReward {
            at: Position::new(x, y, z),
            amount,
            tolerance,
        });
    }

    fn observe(&mut self, request: ObservationRequest) {
        tracing::trace!(?request, "Adding observation request");
        self.first_agent().observations.push(request);
    }

    pub fn observe_full_stats(&mut self) {
        self.observe(ObservationRequest::FullStats);
    }

    pub fn observe_recent_commands(&mut self) {
        self.observe(ObservationRequest::RecentCommands);
    }

    pub fn observe_hot_bar(&mut self) {
        self.observe(ObservationRequest::HotBar);
    }

    pub fn observe_full_inventory(&mut self) {
        self.observe(ObservationRequest::FullInventory);
    }

    /// Block types in the cuboid relative to the agent, reported under `name`.
    #[allow(clippy::too_many_arguments)]
    pub fn observe_grid(
        &mut self,
        x1: i32,
        y1: i32,
        z1: i32,
        x2: i32,
        y2: i32,
        z2: i32,
        name: &str,
    ) {
        self.observe(ObservationRequest::Grid {
            min: BlockPos::new(x1, y1, z1),
            max: BlockPos::new(x2, y2, z2),
            name: name.to_string(),
        });
    }

    /// Euclidean distance to a point, reported as `distanceFrom<name>`.
    pub fn observe_distance(&mut self, x: i32, y: i32, z: i32, name: &str) {
        self.observe(ObservationRequest::Distance {
            at: BlockPos::new(x, y, z),
            name: name.to_string(),
        });
    }

    pub fn observe_chat(&mut self) {
        self.observe(ObservationRequest::Chat);
    }

    // -------------------- command handlers --------------------

    fn handlers(&mut self) -> &mut CommandHandlers {
        &mut self.first_agent().command_handlers
    }

    pub fn remove_all_command_handlers(&mut self) {
        self.handlers().clear();
    }

    pub fn allow_all_continuous_movement_commands(&mut self) {
        self.handlers().allow_all(CommandCategory::ContinuousMovement);
    }

    pub fn allow_continuous_movement_command(&mut self, verb: &str) {
        self.handlers().allow(CommandCategory::ContinuousMovement, verb);
    }

    pub fn allow_all_discrete_movement_commands(&mut self) {
        self.handlers().allow_all(CommandCategory::DiscreteMovement);
    }

    pub fn allow_discrete_movement_command(&mut self, verb: &str) {
        self.handlers().allow(CommandCategory::DiscreteMovement, verb);
    }

    pub fn allow_all_absolute_movement_commands(&mut self) {
        self.handlers().allow_all(CommandCategory::AbsoluteMovement);
    }

    pub fn allow_absolute_movement_command(&mut self, verb: &str) {
        self.handlers().allow(CommandCategory::AbsoluteMovement, verb);
    }

    pub fn allow_all_inventory_commands(&mut self) {
        self.handlers().allow_all(CommandCategory::Inventory);
    }

    pub fn allow_inventory_command(&mut self, verb: &str) {
        self.handlers().allow(CommandCategory::Inventory, verb);
    }

    /// Chat has no verbs, so there is no per-verb variant.
    pub fn allow_all_chat_commands(&mut self) {
        self.handlers().allow_all(CommandCategory::Chat);
    }

    // -------------------- information --------------------

    pub fn get_number_of_agents(&self) -> usize {
        self.agents.len()
    }

    fn agent(&self, role: usize) -> Result<&AgentSection> {
        self.agents
            .get(role)
            .ok_or(MissionError::IndexOutOfRange {
                role,
                agents: self.agents.len(),
            })
    }

    fn video(&self, role: usize) -> Result<&VideoProducer> {
        self.agent(role)?
            .video
            .as_ref()
            .ok_or(MissionError::NotConfigured { role })
    }

    pub fn agent_name(&self, role: usize) -> Result<&str> {
        Ok(&self.agent(role)?.name)
    }

    pub fn agent_mode(&self, role: usize) -> Result<AgentMode> {
        Ok(self.agent(role)?.mode)
    }

    pub fn is_video_requested(&self, role: usize) -> Result<bool> {
        Ok(self.agent(role)?.video.is_some())
    }

    pub fn get_video_width(&self, role: usize) -> Result<u32> {
        Ok(self.video(role)?.width)
    }

    pub fn get_video_height(&self, role: usize) -> Result<u32> {
        Ok(self.video(role)?.height)
    }

    pub fn get_video_channels(&self, role: usize) -> Result<u32> {
        Ok(self.video(role)?.channels())
    }

    /// Categories that have a handler for the agent, in canonical order.
    pub fn command_handlers(&self, role: usize) -> Result<Vec<CommandCategory>> {
        Ok(self.agent(role)?.command_handlers.configured().collect())
    }

    pub fn command_policy(&self, role: usize, category: CommandCategory) -> Result<&CommandPolicy> {
        Ok(self.agent(role)?.command_handlers.policy(category))
    }
}
