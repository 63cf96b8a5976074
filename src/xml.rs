//! Conversion between mission XML and [`MissionSpec`].
//!
//! Text is first read into a small element tree; the tree is then mapped onto
//! the model. Writing goes the other way. The schema validator reuses the same
//! tree.

use std::fmt::Display;
use std::io::Write;
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::commands::{CommandCategory, CommandHandlers, CommandPolicy, VerbSet};
use crate::error::{MissionError, Result};
use crate::mission::{
    AgentMode, AgentSection, BlockPos, DrawDirective, EndPosition, MissionSpec,
    ObservationRequest, Placement, Position, PositionReward, ServerSection, TimeOfDay,
    VideoProducer, WorldGenerator, DEFAULT_FLAT_WORLD, XML_NAMESPACE,
};

const ALLOW_LIST: &str = "allow-list";
const DENY_LIST: &str = "deny-list";
const DEFAULT_MARKER_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn with_attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    fn with_text(mut self, text: impl ToString) -> Self {
        self.text = text.to_string();
        self
    }

    fn with_position(self, at: &Position) -> Self {
        self.with_attr("x", at.x).with_attr("y", at.y).with_attr("z", at.z)
    }

    fn with_optional_attr(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with_attr(key, value),
            None => self,
        }
    }

    fn with_block_pos(self, at: &BlockPos, suffix: &str) -> Self {
        self.with_attr(&format!("x{suffix}"), at.x)
            .with_attr(&format!("y{suffix}"), at.y)
            .with_attr(&format!("z{suffix}"), at.z)
    }
}

// -------------------- text <-> tree --------------------

/// Reads the single root element of `text`. Element names lose any namespace
/// prefix; attribute keys are kept as written.
pub(crate) fn parse_document(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                close_element(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| MissionError::malformed("unexpected closing tag"))?;
                if !element.children.is_empty() {
                    element.text.clear();
                }
                close_element(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(open) => open.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(MissionError::malformed("text outside the root element")),
                }
            }
            Event::CData(data) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(MissionError::malformed(format!(
            "<{}> is never closed",
            open.name
        )));
    }
    root.ok_or_else(|| MissionError::malformed("document has no root element"))
}

fn open_element(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(&String::from_utf8_lossy(start.local_name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(MissionError::malformed(format!(
                "second root element <{}>",
                element.name
            )))
        }
    }
    Ok(())
}

fn write_document(root: &Element, pretty_print: bool) -> Result<String> {
    let mut writer = if pretty_print {
        Writer::new_with_indent(Vec::new(), b' ', 2)
    } else {
        Writer::new(Vec::new())
    };
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;
    write_element(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).map_err(MissionError::malformed)
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if !element.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&element.text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

// -------------------- value helpers --------------------

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_value<T>(element: &Element, what: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|err| {
        MissionError::malformed(format!("<{}> {what} `{raw}`: {err}", element.name))
    })
}

fn attr<T>(element: &Element, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = element.attr(key).ok_or_else(|| {
        MissionError::malformed(format!("<{}> is missing attribute `{key}`", element.name))
    })?;
    parse_value(element, &format!("attribute `{key}`"), raw)
}

fn optional_attr<T>(element: &Element, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    element
        .attr(key)
        .map(|raw| parse_value(element, &format!("attribute `{key}`"), raw))
        .transpose()
}

fn attr_or<T>(element: &Element, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(optional_attr(element, key)?.unwrap_or(default))
}

fn bool_attr_or(element: &Element, key: &str, default: bool) -> Result<bool> {
    match element.attr(key) {
        Some(raw) => parse_bool(raw).ok_or_else(|| {
            MissionError::malformed(format!(
                "<{}> attribute `{key}` is not a boolean: `{raw}`",
                element.name
            ))
        }),
        None => Ok(default),
    }
}

fn child_value<T>(element: &Element, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    element
        .child(name)
        .map(|child| parse_value(child, "text", &child.text))
        .transpose()
}

fn position(element: &Element) -> Result<Position> {
    Ok(Position::new(
        attr(element, "x")?,
        attr(element, "y")?,
        attr(element, "z")?,
    ))
}

fn block_pos(element: &Element, suffix: &str) -> Result<BlockPos> {
    Ok(BlockPos::new(
        attr(element, &format!("x{suffix}"))?,
        attr(element, &format!("y{suffix}"))?,
        attr(element, &format!("z{suffix}"))?,
    ))
}

fn string_attr(element: &Element, key: &str) -> Result<String> {
    element.attr(key).map(str::to_string).ok_or_else(|| {
        MissionError::malformed(format!("<{}> is missing attribute `{key}`", element.name))
    })
}

// -------------------- tree -> model --------------------

pub(crate) fn read_mission(text: &str) -> Result<MissionSpec> {
    let root = parse_document(text)?;
    if root.name != "Mission" {
        return Err(MissionError::malformed(format!(
            "root element is <{}>, expected <Mission>",
            root.name
        )));
    }

    let summary = root
        .child("About")
        .and_then(|about| about.child("Summary"))
        .map(|summary| summary.text.clone())
        .unwrap_or_default();
    let server = match root.child("ServerSection") {
        Some(section) => read_server_section(section)?,
        None => ServerSection::default(),
    };
    let agents = root
        .children_named("AgentSection")
        .map(read_agent_section)
        .collect::<Result<Vec<_>>>()?;
    if agents.is_empty() {
        return Err(MissionError::malformed("mission has no <AgentSection>"));
    }

    tracing::debug!(agents = agents.len(), "Parsed mission xml");
    Ok(MissionSpec::from_parts(summary, server, agents))
}

fn read_server_section(section: &Element) -> Result<ServerSection> {
    let time_of_day = section
        .child("ServerInitialConditions")
        .and_then(|conditions| conditions.child("Time"))
        .map(|time| -> Result<TimeOfDay> {
            let allow_passage_of_time = match time.child("AllowPassageOfTime") {
                Some(flag) => parse_bool(&flag.text).ok_or_else(|| {
                    MissionError::malformed(format!(
                        "<AllowPassageOfTime> is not a boolean: `{}`",
                        flag.text
                    ))
                })?,
                None => true,
            };
            Ok(TimeOfDay {
                start_time: child_value(time, "StartTime")?.unwrap_or(0),
                allow_passage_of_time,
            })
        })
        .transpose()?;

    let mut server = ServerSection {
        time_of_day,
        generator: WorldGenerator::default(),
        drawing: Vec::new(),
        time_limit_ms: None,
        quit_when_any_agent_finishes: false,
    };
    let Some(handlers) = section.child("ServerHandlers") else {
        return Ok(server);
    };

    for handler in &handlers.children {
        match handler.name.as_str() {
            "FlatWorldGenerator" => {
                server.generator = WorldGenerator::Flat {
                    generator_string: handler
                        .attr("generatorString")
                        .unwrap_or(DEFAULT_FLAT_WORLD)
                        .to_string(),
                    force_reset: bool_attr_or(handler, "forceReset", false)?,
                }
            }
            "DefaultWorldGenerator" => {
                server.generator = WorldGenerator::Default {
                    seed: handler.attr("seed").map(str::to_string),
                    force_reset: bool_attr_or(handler, "forceReset", false)?,
                }
            }
            "DrawingDecorator" => {
                for draw in &handler.children {
                    server.drawing.push(read_draw_directive(draw)?);
                }
            }
            "ServerQuitFromTimeUp" => server.time_limit_ms = Some(attr(handler, "timeLimitMs")?),
            "ServerQuitWhenAnyAgentFinishes" => server.quit_when_any_agent_finishes = true,
            other => tracing::debug!(element = other, "Ignoring server handler"),
        }
    }
    Ok(server)
}

fn read_draw_directive(draw: &Element) -> Result<DrawDirective> {
    let directive = match draw.name.as_str() {
        "DrawBlock" => DrawDirective::Block {
            at: block_pos(draw, "")?,
            block_type: string_attr(draw, "type")?,
        },
        "DrawCuboid" => DrawDirective::Cuboid {
            from: block_pos(draw, "1")?,
            to: block_pos(draw, "2")?,
            block_type: string_attr(draw, "type")?,
        },
        "DrawItem" => DrawDirective::Item {
            at: block_pos(draw, "")?,
            item_type: string_attr(draw, "type")?,
        },
        "DrawSphere" => DrawDirective::Sphere {
            center: block_pos(draw, "")?,
            radius: attr(draw, "radius")?,
            block_type: string_attr(draw, "type")?,
        },
        "DrawLine" => DrawDirective::Line {
            from: block_pos(draw, "1")?,
            to: block_pos(draw, "2")?,
            block_type: string_attr(draw, "type")?,
        },
        other => {
            return Err(MissionError::malformed(format!(
                "unknown drawing directive <{other}>"
            )))
        }
    };
    Ok(directive)
}

fn read_agent_section(section: &Element) -> Result<AgentSection> {
    let mode = match section.attr("mode") {
        Some(raw) => AgentMode::parse(raw.trim())
            .ok_or_else(|| MissionError::malformed(format!("unknown agent mode `{raw}`")))?,
        None => AgentMode::default(),
    };
    let start = section
        .child("AgentStart")
        .and_then(|start| start.child("Placement"))
        .map(|placement| -> Result<Placement> {
            Ok(Placement {
                at: position(placement)?,
                yaw: optional_attr(placement, "yaw")?,
                pitch: optional_attr(placement, "pitch")?,
            })
        })
        .transpose()?;

    let mut agent = AgentSection {
        name: section
            .child("Name")
            .map(|name| name.text.trim().to_string())
            .unwrap_or_default(),
        mode,
        start,
        ..AgentSection::default()
    };
    let Some(handlers) = section.child("AgentHandlers") else {
        return Ok(agent);
    };

    for handler in &handlers.children {
        match handler.name.as_str() {
            "ObservationFromFullStats" => agent.observations.push(ObservationRequest::FullStats),
            "ObservationFromRecentCommands" => {
                agent.observations.push(ObservationRequest::RecentCommands)
            }
            "ObservationFromHotBar" => agent.observations.push(ObservationRequest::HotBar),
            "ObservationFromFullInventory" => {
                agent.observations.push(ObservationRequest::FullInventory)
            }
            "ObservationFromChat" => agent.observations.push(ObservationRequest::Chat),
            "ObservationFromGrid" => {
                for grid in handler.children_named("Grid") {
                    let corner = |name: &str| {
                        grid.child(name).map(|c| block_pos(c, "")).unwrap_or_else(|| {
                            Err(MissionError::malformed(format!("<Grid> has no <{name}>")))
                        })
                    };
                    agent.observations.push(ObservationRequest::Grid {
                        min: corner("min")?,
                        max: corner("max")?,
                        name: string_attr(grid, "name")?,
                    });
                }
            }
            "ObservationFromDistance" => {
                for marker in handler.children_named("Marker") {
                    agent.observations.push(ObservationRequest::Distance {
                        at: block_pos(marker, "")?,
                        name: string_attr(marker, "name")?,
                    });
                }
            }
            "VideoProducer" => {
                agent.video = Some(VideoProducer {
                    width: child_value(handler, "Width")?.unwrap_or(0),
                    height: child_value(handler, "Height")?.unwrap_or(0),
                    want_depth: bool_attr_or(handler, "want_depth", false)?,
                })
            }
            "RewardForReachingPosition" => {
                for marker in handler.children_named("Marker") {
                    agent.rewards.push(PositionReward {
                        at: position(marker)?,
                        amount: attr(marker, "reward")?,
                        tolerance: attr_or(marker, "tolerance", DEFAULT_MARKER_TOLERANCE)?,
                    });
                }
            }
            "AgentQuitFromReachingPosition" => {
                for marker in handler.children_named("Marker") {
                    agent.end_positions.push(EndPosition {
                        at: position(marker)?,
                        tolerance: attr_or(marker, "tolerance", DEFAULT_MARKER_TOLERANCE)?,
                    });
                }
            }
            name => match CommandCategory::from_element_name(name) {
                Some(category) => {
                    read_command_handler(&mut agent.command_handlers, category, handler)?
                }
                None => tracing::debug!(element = name, "Ignoring agent handler"),
            },
        }
    }
    Ok(agent)
}

fn read_command_handler(
    handlers: &mut CommandHandlers,
    category: CommandCategory,
    element: &Element,
) -> Result<()> {
    let policy = match element.child("ModifierList") {
        None => CommandPolicy::Unrestricted,
        Some(list) => {
            let verbs: VerbSet = list
                .children_named("command")
                .map(|command| command.text.clone())
                .collect();
            match list.attr("type").unwrap_or(ALLOW_LIST) {
                ALLOW_LIST => CommandPolicy::AllowOnly(verbs),
                DENY_LIST => CommandPolicy::DenyOnly(verbs),
                other => {
                    return Err(MissionError::malformed(format!(
                        "unknown modifier list type `{other}`"
                    )))
                }
            }
        }
    };
    handlers.set_policy(category, policy);
    if category == CommandCategory::ContinuousMovement {
        handlers.set_turn_speed_degs(optional_attr(element, "turnSpeedDegs")?);
    }
    Ok(())
}

// -------------------- model -> tree --------------------

pub(crate) fn write_mission(mission: &MissionSpec, pretty_print: bool) -> Result<String> {
    let about =
        Element::new("About").with_child(Element::new("Summary").with_text(mission.summary()));
    let mut root = Element::new("Mission")
        .with_attr("xmlns", XML_NAMESPACE)
        .with_child(about)
        .with_child(server_element(mission.server()));
    for agent in mission.agents() {
        root = root.with_child(agent_element(agent));
    }

    let xml = write_document(&root, pretty_print)?;
    tracing::debug!(pretty_print, bytes = xml.len(), "Serialized mission xml");
    Ok(xml)
}

fn server_element(server: &ServerSection) -> Element {
    let mut section = Element::new("ServerSection");
    if let Some(time) = &server.time_of_day {
        let time = Element::new("Time")
            .with_child(Element::new("StartTime").with_text(time.start_time))
            .with_child(Element::new("AllowPassageOfTime").with_text(time.allow_passage_of_time));
        section = section.with_child(Element::new("ServerInitialConditions").with_child(time));
    }

    let mut handlers = Element::new("ServerHandlers");
    let generator = match &server.generator {
        WorldGenerator::Flat {
            generator_string,
            force_reset,
        } => {
            let flat =
                Element::new("FlatWorldGenerator").with_attr("generatorString", generator_string);
            if *force_reset {
                flat.with_attr("forceReset", true)
            } else {
                flat
            }
        }
        WorldGenerator::Default { seed, force_reset } => {
            let mut terrain = Element::new("DefaultWorldGenerator");
            if let Some(seed) = seed {
                terrain = terrain.with_attr("seed", seed);
            }
            if *force_reset {
                terrain = terrain.with_attr("forceReset", true);
            }
            terrain
        }
    };
    handlers = handlers.with_child(generator);

    if !server.drawing.is_empty() {
        let mut decorator = Element::new("DrawingDecorator");
        for directive in &server.drawing {
            decorator = decorator.with_child(draw_element(directive));
        }
        handlers = handlers.with_child(decorator);
    }
    if let Some(limit) = server.time_limit_ms {
        handlers = handlers
            .with_child(Element::new("ServerQuitFromTimeUp").with_attr("timeLimitMs", limit));
    }
    if server.quit_when_any_agent_finishes {
        handlers = handlers.with_child(Element::new("ServerQuitWhenAnyAgentFinishes"));
    }
    section.with_child(handlers)
}

fn draw_element(directive: &DrawDirective) -> Element {
    match directive {
        DrawDirective::Block { at, block_type } => Element::new("DrawBlock")
            .with_block_pos(at, "")
            .with_attr("type", block_type),
        DrawDirective::Cuboid {
            from,
            to,
            block_type,
        } => Element::new("DrawCuboid")
            .with_block_pos(from, "1")
            .with_block_pos(to, "2")
            .with_attr("type", block_type),
        DrawDirective::Item { at, item_type } => Element::new("DrawItem")
            .with_block_pos(at, "")
            .with_attr("type", item_type),
        DrawDirective::Sphere {
            center,
            radius,
            block_type,
        } => Element::new("DrawSphere")
            .with_block_pos(center, "")
            .with_attr("radius", radius)
            .with_attr("type", block_type),
        DrawDirective::Line {
            from,
            to,
            block_type,
        } => Element::new("DrawLine")
            .with_block_pos(from, "1")
            .with_block_pos(to, "2")
            .with_attr("type", block_type),
    }
}

fn agent_element(agent: &AgentSection) -> Element {
    let mut start = Element::new("AgentStart");
    if let Some(placement) = &agent.start {
        start = start.with_child(
            Element::new("Placement")
                .with_position(&placement.at)
                .with_optional_attr("yaw", placement.yaw)
                .with_optional_attr("pitch", placement.pitch),
        );
    }

    let mut handlers = Element::new("AgentHandlers");
    for request in &agent.observations {
        handlers = handlers.with_child(observation_element(request));
    }
    if let Some(video) = &agent.video {
        handlers = handlers.with_child(
            Element::new("VideoProducer")
                .with_attr("want_depth", video.want_depth)
                .with_child(Element::new("Width").with_text(video.width))
                .with_child(Element::new("Height").with_text(video.height)),
        );
    }
    if !agent.rewards.is_empty() {
        let mut rewards = Element::new("RewardForReachingPosition");
        for reward in &agent.rewards {
            rewards = rewards.with_child(
                Element::new("Marker")
                    .with_position(&reward.at)
                    .with_attr("reward", reward.amount)
                    .with_attr("tolerance", reward.tolerance),
            );
        }
        handlers = handlers.with_child(rewards);
    }
    for category in agent.command_handlers.configured() {
        let mut handler =
            command_handler_element(category, agent.command_handlers.policy(category));
        if category == CommandCategory::ContinuousMovement {
            handler = handler
                .with_optional_attr("turnSpeedDegs", agent.command_handlers.turn_speed_degs());
        }
        handlers = handlers.with_child(handler);
    }
    if !agent.end_positions.is_empty() {
        let mut quits = Element::new("AgentQuitFromReachingPosition");
        for end in &agent.end_positions {
            quits = quits.with_child(
                Element::new("Marker")
                    .with_position(&end.at)
                    .with_attr("tolerance", end.tolerance),
            );
        }
        handlers = handlers.with_child(quits);
    }

    Element::new("AgentSection")
        .with_attr("mode", agent.mode.as_str())
        .with_child(Element::new("Name").with_text(&agent.name))
        .with_child(start)
        .with_child(handlers)
}

fn observation_element(request: &ObservationRequest) -> Element {
    match request {
        ObservationRequest::FullStats => Element::new("ObservationFromFullStats"),
        ObservationRequest::RecentCommands => Element::new("ObservationFromRecentCommands"),
        ObservationRequest::HotBar => Element::new("ObservationFromHotBar"),
        ObservationRequest::FullInventory => Element::new("ObservationFromFullInventory"),
        ObservationRequest::Chat => Element::new("ObservationFromChat"),
        ObservationRequest::Grid { min, max, name } => Element::new("ObservationFromGrid")
            .with_child(
                Element::new("Grid")
                    .with_attr("name", name)
                    .with_child(Element::new("min").with_block_pos(min, ""))
                    .with_child(Element::new("max").with_block_pos(max, "")),
            ),
        ObservationRequest::Distance { at, name } => Element::new("ObservationFromDistance")
            .with_child(
                Element::new("Marker")
                    .with_attr("name", name)
                    .with_block_pos(at, ""),
            ),
    }
}

fn command_handler_element(category: CommandCategory, policy: &CommandPolicy) -> Element {
    let handler = Element::new(category.element_name());
    let (list_type, verbs) = match policy {
        CommandPolicy::AllowOnly(verbs) => (ALLOW_LIST, verbs),
        CommandPolicy::DenyOnly(verbs) => (DENY_LIST, verbs),
        CommandPolicy::Absent | CommandPolicy::Unrestricted => return handler,
    };
    let mut list = Element::new("ModifierList").with_attr("type", list_type);
    for verb in verbs {
        list = list.with_child(Element::new("command").with_text(verb));
    }
    handler.with_child(list)
}
