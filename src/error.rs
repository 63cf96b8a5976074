use std::fmt;

use thiserror::Error;

pub type Result<T, E = MissionError> = std::result::Result<T, E>;

/// Detail reported by a [`SchemaValidator`](crate::schema::SchemaValidator) when
/// mission text does not conform to the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Slash separated element path, e.g. `Mission/AgentSection[1]/AgentHandlers`.
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for SchemaViolation {}

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("mission does not conform to the schema: {0}")]
    SchemaViolation(#[from] SchemaViolation),

    #[error("agent role {role} is out of range, mission has {agents} agent(s)")]
    IndexOutOfRange { role: usize, agents: usize },

    #[error("no video was requested for agent role {role}")]
    NotConfigured { role: usize },

    /// Text that is not well-formed XML, or a value that cannot be converted.
    #[error("malformed mission xml: {0}")]
    Malformed(String),
}

impl MissionError {
    pub(crate) fn malformed(details: impl fmt::Display) -> Self {
        Self::Malformed(details.to_string())
    }
}

impl From<quick_xml::Error> for MissionError {
    fn from(error: quick_xml::Error) -> Self {
        Self::malformed(error)
    }
}

impl From<quick_xml::events::attributes::AttrError> for MissionError {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        Self::malformed(error)
    }
}

impl From<std::io::Error> for MissionError {
    fn from(error: std::io::Error) -> Self {
        Self::malformed(error)
    }
}
