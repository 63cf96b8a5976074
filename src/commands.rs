//! Command handler configuration for a single agent.
//!
//! Each command category is in exactly one [`CommandPolicy`] state. Allow and
//! deny lists are variants of the same enum, so a category can never carry both.

use indexmap::IndexSet;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

/// Ordered set of command verbs. Insertion order is kept, duplicates are not.
pub type VerbSet = IndexSet<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    ContinuousMovement,
    DiscreteMovement,
    AbsoluteMovement,
    Inventory,
    Chat,
}

impl CommandCategory {
    pub const ALL: [CommandCategory; 5] = [
        Self::ContinuousMovement,
        Self::DiscreteMovement,
        Self::AbsoluteMovement,
        Self::Inventory,
        Self::Chat,
    ];

    /// Name of the handler element in mission XML.
    pub fn element_name(self) -> &'static str {
        match self {
            Self::ContinuousMovement => "ContinuousMovementCommands",
            Self::DiscreteMovement => "DiscreteMovementCommands",
            Self::AbsoluteMovement => "AbsoluteMovementCommands",
            Self::Inventory => "InventoryCommands",
            Self::Chat => "ChatCommands",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.element_name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "verbs", rename_all = "snake_case")]
pub enum CommandPolicy {
    /// No handler, every command of the category is rejected.
    #[default]
    Absent,
    /// Handler present without a modifier list, every command is accepted.
    Unrestricted,
    AllowOnly(VerbSet),
    DenyOnly(VerbSet),
}

impl CommandPolicy {
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Whether the handler would act on `verb`.
    pub fn permits(&self, verb: &str) -> bool {
        match self {
            Self::Absent => false,
            Self::Unrestricted => true,
            Self::AllowOnly(verbs) => verbs.contains(verb),
            Self::DenyOnly(verbs) => !verbs.contains(verb),
        }
    }

    pub fn allow_list(&self) -> Option<&VerbSet> {
        match self {
            Self::AllowOnly(verbs) => Some(verbs),
            _ => None,
        }
    }

    pub fn deny_list(&self) -> Option<&VerbSet> {
        match self {
            Self::DenyOnly(verbs) => Some(verbs),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Unrestricted => "unrestricted",
            Self::AllowOnly(_) => "allow-only",
            Self::DenyOnly(_) => "deny-only",
        }
    }
}

/// Per-category command handler states of one agent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandHandlers {
    policies: [CommandPolicy; 5],
    turn_speed_degs: Option<f64>,
}

impl CommandHandlers {
    pub fn policy(&self, category: CommandCategory) -> &CommandPolicy {
        &self.policies[category.index()]
    }

    pub fn set_policy(&mut self, category: CommandCategory, policy: CommandPolicy) {
        self.transition(category, policy);
    }

    /// Categories with a handler, in canonical order.
    pub fn configured(&self) -> impl Iterator<Item = CommandCategory> + '_ {
        CommandCategory::ALL
            .into_iter()
            .filter(|category| self.policy(*category).is_configured())
    }

    pub fn is_empty(&self) -> bool {
        self.configured().next().is_none()
    }

    /// Turning speed of the continuous movement handler, in degrees per second.
    pub fn turn_speed_degs(&self) -> Option<f64> {
        self.turn_speed_degs
    }

    /// Has no effect while there is no continuous movement handler. Removing
    /// that handler drops the speed again.
    pub fn set_turn_speed_degs(&mut self, degrees: Option<f64>) {
        if self.policy(CommandCategory::ContinuousMovement).is_configured() {
            self.turn_speed_degs = degrees;
        } else {
            tracing::debug!(?degrees, "No continuous movement handler, ignoring turn speed");
        }
    }

    pub fn clear(&mut self) {
        for category in CommandCategory::ALL {
            self.transition(category, CommandPolicy::Absent);
        }
    }

    /// Adds a handler with no restriction, dropping whichever list was present.
    pub fn allow_all(&mut self, category: CommandCategory) {
        self.transition(category, CommandPolicy::Unrestricted);
    }

    /// Puts `verb` on the allow-list, creating the handler if needed. Any
    /// deny-list is discarded.
    pub fn allow(&mut self, category: CommandCategory, verb: &str) {
        let next = match self.policy(category) {
            CommandPolicy::AllowOnly(verbs) => {
                if verbs.contains(verb) {
                    return;
                }
                let mut verbs = verbs.clone();
                verbs.insert(verb.to_string());
                CommandPolicy::AllowOnly(verbs)
            }
            CommandPolicy::Absent | CommandPolicy::Unrestricted | CommandPolicy::DenyOnly(_) => {
                CommandPolicy::AllowOnly(VerbSet::from([verb.to_string()]))
            }
        };
        self.transition(category, next);
    }

    fn transition(&mut self, category: CommandCategory, next: CommandPolicy) {
        let slot = &mut self.policies[category.index()];
        if *slot != next {
            tracing::debug!(
                %category,
                from = slot.label(),
                to = next.label(),
                "Command handler transition"
            );
        }
        *slot = next;
        if category == CommandCategory::ContinuousMovement && !slot.is_configured() {
            self.turn_speed_degs = None;
        }
    }
}

/// Serialized as a map from configured category to its policy.
impl Serialize for CommandHandlers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for category in self.configured() {
            map.serialize_entry(&category, self.policy(category))?;
        }
        if let Some(degrees) = self.turn_speed_degs {
            map.serialize_entry("turn_speed_degs", &degrees)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn verbs(policy: &CommandPolicy) -> Vec<&str> {
        policy
            .allow_list()
            .or(policy.deny_list())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn default_has_no_handlers() {
        let handlers = CommandHandlers::default();
        assert!(handlers.is_empty());
        for category in CommandCategory::ALL {
            assert_eq!(handlers.policy(category), &CommandPolicy::Absent);
            assert!(!handlers.policy(category).permits("move"));
        }
    }

    #[test]
    fn allow_all_creates_unrestricted_handler() {
        let mut handlers = CommandHandlers::default();
        handlers.allow_all(CommandCategory::Inventory);
        assert_eq!(
            handlers.policy(CommandCategory::Inventory),
            &CommandPolicy::Unrestricted
        );
        assert!(handlers.policy(CommandCategory::Inventory).permits("anything"));
        assert_eq!(
            handlers.configured().collect::<Vec<_>>(),
            vec![CommandCategory::Inventory]
        );
    }

    #[test]
    fn allow_all_clears_existing_lists() {
        let mut handlers = CommandHandlers::default();
        handlers.allow(CommandCategory::DiscreteMovement, "movenorth");
        handlers.allow_all(CommandCategory::DiscreteMovement);
        assert_eq!(
            handlers.policy(CommandCategory::DiscreteMovement),
            &CommandPolicy::Unrestricted
        );

        handlers.set_policy(
            CommandCategory::DiscreteMovement,
            CommandPolicy::DenyOnly(VerbSet::from(["attack".to_string()])),
        );
        handlers.allow_all(CommandCategory::DiscreteMovement);
        assert_eq!(
            handlers.policy(CommandCategory::DiscreteMovement),
            &CommandPolicy::Unrestricted
        );
    }

    #[test]
    fn allow_keeps_verbs_unique_and_ordered() {
        let mut handlers = CommandHandlers::default();
        handlers.allow(CommandCategory::ContinuousMovement, "move");
        handlers.allow(CommandCategory::ContinuousMovement, "turn");
        handlers.allow(CommandCategory::ContinuousMovement, "move");

        let policy = handlers.policy(CommandCategory::ContinuousMovement);
        assert_eq!(verbs(policy), vec!["move", "turn"]);
        assert!(policy.permits("turn"));
        assert!(!policy.permits("jump"));
    }

    #[test]
    fn allow_evicts_deny_list() {
        let mut handlers = CommandHandlers::default();
        handlers.set_policy(
            CommandCategory::AbsoluteMovement,
            CommandPolicy::DenyOnly(VerbSet::from(["tpx".to_string(), "tpy".to_string()])),
        );
        assert!(!handlers.policy(CommandCategory::AbsoluteMovement).permits("tpx"));
        assert!(handlers.policy(CommandCategory::AbsoluteMovement).permits("tpz"));

        handlers.allow(CommandCategory::AbsoluteMovement, "tpx");
        let policy = handlers.policy(CommandCategory::AbsoluteMovement);
        assert!(policy.deny_list().is_none());
        assert_eq!(verbs(policy), vec!["tpx"]);
    }

    #[test]
    fn clear_resets_every_category() {
        let mut handlers = CommandHandlers::default();
        handlers.allow_all(CommandCategory::Chat);
        handlers.allow(CommandCategory::Inventory, "selectInventoryItem");
        handlers.clear();
        assert!(handlers.is_empty());
    }

    #[test]
    fn turn_speed_needs_a_continuous_movement_handler() {
        let mut handlers = CommandHandlers::default();
        handlers.set_turn_speed_degs(Some(180.0));
        assert_eq!(handlers.turn_speed_degs(), None);

        handlers.allow_all(CommandCategory::ContinuousMovement);
        handlers.set_turn_speed_degs(Some(180.0));
        handlers.allow(CommandCategory::ContinuousMovement, "move");
        assert_eq!(handlers.turn_speed_degs(), Some(180.0));

        handlers.clear();
        assert_eq!(handlers.turn_speed_degs(), None);
    }

    #[test]
    fn serializes_configured_categories_only() {
        let mut handlers = CommandHandlers::default();
        handlers.allow(CommandCategory::Inventory, "selectInventoryItem");
        handlers.allow_all(CommandCategory::Chat);
        assert_eq!(
            serde_json::to_value(&handlers).expect("json"),
            serde_json::json!({
                "inventory": { "state": "allow_only", "verbs": ["selectInventoryItem"] },
                "chat": { "state": "unrestricted" },
            })
        );
    }

    #[test]
    fn element_names_round_trip() {
        for category in CommandCategory::ALL {
            assert_eq!(
                CommandCategory::from_element_name(category.element_name()),
                Some(category)
            );
        }
        assert_eq!(CommandCategory::from_element_name("MissionQuitCommands"), None);
    }

    #[test]
    #[traced_test]
    fn transitions_are_logged() {
        let mut handlers = CommandHandlers::default();
        handlers.allow(CommandCategory::ContinuousMovement, "move");
        assert!(logs_contain("Command handler transition"));
        assert!(logs_contain("allow-only"));
    }
}
