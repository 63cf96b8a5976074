//! Mission grammar checks.
//!
//! [`StructuralValidator`] walks the element tree against a table of element
//! rules. Other validators (an XSD engine, a remote service) plug in through
//! [`SchemaValidator`].

use crate::error::SchemaViolation;
use crate::mission::{AgentMode, XML_NAMESPACE};
use crate::xml::{self, parse_bool, Element};

pub trait SchemaValidator {
    fn validate(&self, xml: &str) -> Result<(), SchemaViolation>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&str) -> Result<(), SchemaViolation>,
{
    fn validate(&self, xml: &str) -> Result<(), SchemaViolation> {
        self(xml)
    }
}

/// Attribute and text kinds, matching the numeric types of the model.
#[derive(Debug, Clone, Copy)]
enum Value {
    /// Signed 32-bit integer: block coordinates, radii, ticks.
    Int,
    /// Unsigned 32-bit integer: frame sizes.
    Count,
    Decimal,
    Bool,
    Text,
}

impl Value {
    fn accepts(self, raw: &str) -> bool {
        match self {
            Self::Int => raw.trim().parse::<i32>().is_ok(),
            Self::Count => raw.trim().parse::<u32>().is_ok(),
            Self::Decimal => raw.trim().parse::<f64>().is_ok(),
            Self::Bool => parse_bool(raw).is_some(),
            Self::Text => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Int => "a 32-bit integer",
            Self::Count => "a non-negative 32-bit integer",
            Self::Decimal => "a decimal",
            Self::Bool => "a boolean",
            Self::Text => "text",
        }
    }
}

struct Rule {
    name: &'static str,
    children: &'static [&'static str],
    required_children: &'static [&'static str],
    required_attrs: &'static [(&'static str, Value)],
    optional_attrs: &'static [(&'static str, Value)],
    /// Leaf content type, `None` for container elements.
    content: Option<Value>,
}

const POINT: &[(&str, Value)] = &[("x", Value::Int), ("y", Value::Int), ("z", Value::Int)];
const SPAN: &[(&str, Value)] = &[
    ("x1", Value::Int),
    ("y1", Value::Int),
    ("z1", Value::Int),
    ("x2", Value::Int),
    ("y2", Value::Int),
    ("z2", Value::Int),
    ("type", Value::Text),
];

const fn container(name: &'static str, children: &'static [&'static str]) -> Rule {
    Rule {
        name,
        children,
        required_children: &[],
        required_attrs: &[],
        optional_attrs: &[],
        content: None,
    }
}

const fn leaf(name: &'static str, content: Value) -> Rule {
    Rule {
        name,
        children: &[],
        required_children: &[],
        required_attrs: &[],
        optional_attrs: &[],
        content: Some(content),
    }
}

const fn marker(name: &'static str, attrs: &'static [(&'static str, Value)]) -> Rule {
    Rule {
        name,
        children: &[],
        required_children: &[],
        required_attrs: attrs,
        optional_attrs: &[],
        content: None,
    }
}

const fn command_handler(name: &'static str) -> Rule {
    Rule {
        name,
        children: &["ModifierList"],
        required_children: &[],
        required_attrs: &[],
        optional_attrs: &[],
        content: None,
    }
}

const AGENT_HANDLERS: &[&str] = &[
    "ObservationFromFullStats",
    "ObservationFromRecentCommands",
    "ObservationFromHotBar",
    "ObservationFromFullInventory",
    "ObservationFromGrid",
    "ObservationFromDistance",
    "ObservationFromChat",
    "VideoProducer",
    "RewardForReachingPosition",
    "ContinuousMovementCommands",
    "DiscreteMovementCommands",
    "AbsoluteMovementCommands",
    "InventoryCommands",
    "ChatCommands",
    "AgentQuitFromReachingPosition",
];

const RULES: &[Rule] = &[
    Rule {
        required_children: &["About", "ServerSection", "AgentSection"],
        ..container("Mission", &["About", "ServerSection", "AgentSection"])
    },
    Rule {
        required_children: &["Summary"],
        ..container("About", &["Summary"])
    },
    leaf("Summary", Value::Text),
    Rule {
        required_children: &["ServerHandlers"],
        ..container("ServerSection", &["ServerInitialConditions", "ServerHandlers"])
    },
    container("ServerInitialConditions", &["Time"]),
    Rule {
        required_children: &["StartTime"],
        ..container("Time", &["StartTime", "AllowPassageOfTime"])
    },
    leaf("StartTime", Value::Int),
    leaf("AllowPassageOfTime", Value::Bool),
    container(
        "ServerHandlers",
        &[
            "FlatWorldGenerator",
            "DefaultWorldGenerator",
            "DrawingDecorator",
            "ServerQuitFromTimeUp",
            "ServerQuitWhenAnyAgentFinishes",
        ],
    ),
    Rule {
        optional_attrs: &[("generatorString", Value::Text), ("forceReset", Value::Bool)],
        ..container("FlatWorldGenerator", &[])
    },
    Rule {
        optional_attrs: &[("seed", Value::Text), ("forceReset", Value::Bool)],
        ..container("DefaultWorldGenerator", &[])
    },
    container(
        "DrawingDecorator",
        &["DrawBlock", "DrawCuboid", "DrawItem", "DrawSphere", "DrawLine"],
    ),
    marker(
        "DrawBlock",
        &[("x", Value::Int), ("y", Value::Int), ("z", Value::Int), ("type", Value::Text)],
    ),
    marker("DrawCuboid", SPAN),
    marker(
        "DrawItem",
        &[("x", Value::Int), ("y", Value::Int), ("z", Value::Int), ("type", Value::Text)],
    ),
    marker(
        "DrawSphere",
        &[
            ("x", Value::Int),
            ("y", Value::Int),
            ("z", Value::Int),
            ("radius", Value::Int),
            ("type", Value::Text),
        ],
    ),
    marker("DrawLine", SPAN),
    marker("ServerQuitFromTimeUp", &[("timeLimitMs", Value::Decimal)]),
    container("ServerQuitWhenAnyAgentFinishes", &[]),
    Rule {
        required_children: &["Name", "AgentStart", "AgentHandlers"],
        optional_attrs: &[("mode", Value::Text)],
        ..container("AgentSection", &["Name", "AgentStart", "AgentHandlers"])
    },
    leaf("Name", Value::Text),
    container("AgentStart", &["Placement"]),
    Rule {
        optional_attrs: &[("yaw", Value::Decimal), ("pitch", Value::Decimal)],
        ..marker(
            "Placement",
            &[("x", Value::Decimal), ("y", Value::Decimal), ("z", Value::Decimal)],
        )
    },
    container("AgentHandlers", AGENT_HANDLERS),
    container("ObservationFromFullStats", &[]),
    container("ObservationFromRecentCommands", &[]),
    container("ObservationFromHotBar", &[]),
    container("ObservationFromFullInventory", &[]),
    container("ObservationFromChat", &[]),
    Rule {
        required_children: &["Marker"],
        ..container("ObservationFromDistance", &[])
    },
    Rule {
        required_children: &["Marker"],
        ..container("RewardForReachingPosition", &[])
    },
    Rule {
        required_children: &["Marker"],
        ..container("AgentQuitFromReachingPosition", &[])
    },
    Rule {
        required_children: &["Grid"],
        ..container("ObservationFromGrid", &["Grid"])
    },
    Rule {
        required_children: &["min", "max"],
        required_attrs: &[("name", Value::Text)],
        ..container("Grid", &["min", "max"])
    },
    marker("min", POINT),
    marker("max", POINT),
    Rule {
        required_children: &["Width", "Height"],
        optional_attrs: &[("want_depth", Value::Bool)],
        ..container("VideoProducer", &["Width", "Height"])
    },
    leaf("Width", Value::Count),
    leaf("Height", Value::Count),
    Rule {
        optional_attrs: &[("type", Value::Text)],
        ..container("ModifierList", &["command"])
    },
    leaf("command", Value::Text),
    Rule {
        optional_attrs: &[("turnSpeedDegs", Value::Decimal)],
        ..command_handler("ContinuousMovementCommands")
    },
    command_handler("DiscreteMovementCommands"),
    command_handler("AbsoluteMovementCommands"),
    command_handler("InventoryCommands"),
    command_handler("ChatCommands"),
];

fn rule_for(name: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.name == name)
}

/// Validates mission XML against the built-in grammar table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl SchemaValidator for StructuralValidator {
    fn validate(&self, text: &str) -> Result<(), SchemaViolation> {
        let root = xml::parse_document(text)
            .map_err(|err| SchemaViolation::new("", err.to_string()))?;
        if root.name != "Mission" {
            return Err(SchemaViolation::new(
                root.name.as_str(),
                "root element must be <Mission>",
            ));
        }
        let namespaced = root.attributes.iter().any(|(key, value)| {
            (key == "xmlns" || key.starts_with("xmlns:")) && value == XML_NAMESPACE
        });
        if !namespaced {
            return Err(SchemaViolation::new(
                "Mission",
                format!("root element must be in namespace {XML_NAMESPACE}"),
            ));
        }
        check_element(&root, "Mission")?;
        tracing::debug!("Mission xml passed structural validation");
        Ok(())
    }
}

fn check_element(element: &Element, path: &str) -> Result<(), SchemaViolation> {
    let rule = match element.name.as_str() {
        // Markers differ by parent, checked there.
        "Marker" => return Ok(()),
        name => rule_for(name)
            .ok_or_else(|| SchemaViolation::new(path, format!("unknown element <{name}>")))?,
    };

    for (key, value) in rule.required_attrs {
        match element.attr(key) {
            Some(raw) => check_value(path, key, raw, *value)?,
            None => {
                return Err(SchemaViolation::new(
                    path,
                    format!("missing required attribute `{key}`"),
                ))
            }
        }
    }
    for (key, value) in rule.optional_attrs {
        if let Some(raw) = element.attr(key) {
            check_value(path, key, raw, *value)?;
        }
    }
    let known: Vec<&str> = rule
        .required_attrs
        .iter()
        .chain(rule.optional_attrs)
        .map(|(key, _)| *key)
        .collect();
    check_unknown_attrs(element, path, &known)?;
    if let Some(content) = rule.content {
        if !content.accepts(&element.text) {
            return Err(SchemaViolation::new(
                path,
                format!("content `{}` is not {}", element.text, content.describe()),
            ));
        }
    }
    check_specifics(element, path)?;

    for required in rule.required_children {
        if element.child(required).is_none() {
            return Err(SchemaViolation::new(
                path,
                format!("missing required child <{required}>"),
            ));
        }
    }
    let mut seen: Vec<&str> = Vec::new();
    for child in &element.children {
        let name = child.name.as_str();
        let index = seen.iter().filter(|n| **n == name).count();
        seen.push(name);
        let child_path = format!("{path}/{name}[{index}]");
        if !rule.children.contains(&name) && !marker_allowed(&element.name, name) {
            return Err(SchemaViolation::new(
                path,
                format!("<{name}> is not allowed in <{}>", element.name),
            ));
        }
        if name == "Marker" {
            check_marker(&element.name, child, &child_path)?;
        }
        check_element(child, &child_path)?;
    }
    Ok(())
}

fn check_unknown_attrs(
    element: &Element,
    path: &str,
    known: &[&str],
) -> Result<(), SchemaViolation> {
    let unknown = element
        .attributes
        .iter()
        .map(|(key, _)| key.as_str())
        .find(|key| {
            !known.contains(key)
                && *key != "xmlns"
                && !key.starts_with("xmlns:")
                && !key.starts_with("xsi:")
        });
    match unknown {
        Some(key) => Err(SchemaViolation::new(
            path,
            format!("attribute `{key}` is not allowed on <{}>", element.name),
        )),
        None => Ok(()),
    }
}

fn check_value(path: &str, key: &str, raw: &str, value: Value) -> Result<(), SchemaViolation> {
    if value.accepts(raw) {
        Ok(())
    } else {
        Err(SchemaViolation::new(
            path,
            format!("attribute `{key}` = `{raw}` is not {}", value.describe()),
        ))
    }
}

fn check_specifics(element: &Element, path: &str) -> Result<(), SchemaViolation> {
    match element.name.as_str() {
        "AgentSection" => {
            if let Some(mode) = element.attr("mode") {
                if AgentMode::parse(mode.trim()).is_none() {
                    return Err(SchemaViolation::new(
                        path,
                        format!("mode `{mode}` is not one of Survival, Creative, Spectator"),
                    ));
                }
            }
        }
        "ServerHandlers" => {
            let generators = element
                .children
                .iter()
                .filter(|child| child.name.ends_with("WorldGenerator"))
                .count();
            if generators != 1 {
                return Err(SchemaViolation::new(
                    path,
                    format!("expected exactly one world generator, found {generators}"),
                ));
            }
        }
        "ModifierList" => match element.attr("type") {
            Some("allow-list" | "deny-list") | None => {}
            Some(other) => {
                return Err(SchemaViolation::new(
                    path,
                    format!("modifier list type `{other}` is not allow-list or deny-list"),
                ))
            }
        },
        _ => {}
    }
    Ok(())
}

fn marker_allowed(parent: &str, child: &str) -> bool {
    child == "Marker"
        && matches!(
            parent,
            "ObservationFromDistance"
                | "RewardForReachingPosition"
                | "AgentQuitFromReachingPosition"
        )
}

fn check_marker(parent: &str, marker: &Element, path: &str) -> Result<(), SchemaViolation> {
    let required: &[(&str, Value)] = match parent {
        "ObservationFromDistance" => &[
            ("name", Value::Text),
            ("x", Value::Int),
            ("y", Value::Int),
            ("z", Value::Int),
        ],
        "RewardForReachingPosition" => &[
            ("x", Value::Decimal),
            ("y", Value::Decimal),
            ("z", Value::Decimal),
            ("reward", Value::Decimal),
        ],
        _ => &[("x", Value::Decimal), ("y", Value::Decimal), ("z", Value::Decimal)],
    };
    for (key, value) in required {
        let raw = marker.attr(key).ok_or_else(|| {
            SchemaViolation::new(path, format!("missing required attribute `{key}`"))
        })?;
        check_value(path, key, raw, *value)?;
    }
    if let Some(raw) = marker.attr("tolerance") {
        check_value(path, "tolerance", raw, Value::Decimal)?;
    }
    let mut known: Vec<&str> = required.iter().map(|(key, _)| *key).collect();
    if parent != "ObservationFromDistance" {
        known.push("tolerance");
    }
    check_unknown_attrs(marker, path, &known)?;
    if !marker.children.is_empty() {
        return Err(SchemaViolation::new(path, "<Marker> takes no children"));
    }
    Ok(())
}
