use mission_spec::{CommandCategory, CommandPolicy, MissionSpec, VerbSet};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    AllowAll(CommandCategory),
    Allow(CommandCategory, String),
    Deny(CommandCategory, Vec<String>),
    RemoveAll,
}

fn category() -> impl Strategy<Value = CommandCategory> {
    prop_oneof![
        Just(CommandCategory::ContinuousMovement),
        Just(CommandCategory::DiscreteMovement),
        Just(CommandCategory::AbsoluteMovement),
        Just(CommandCategory::Inventory),
        Just(CommandCategory::Chat),
    ]
}

fn verb() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("move".to_string()),
        Just(" move".to_string()),
        Just("move ".to_string()),
        Just("turn".to_string()),
        Just("jump".to_string()),
        "[a-z]{1,8}",
        "[ a-zA-Z0-9<>&\"'._-]{0,8}",
    ]
}

/// Escapes a verb for hand-written command markup.
fn escape(verb: &str) -> String {
    verb.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        category().prop_map(Op::AllowAll),
        (category(), verb()).prop_map(|(c, v)| Op::Allow(c, v)),
        (category(), prop::collection::vec(verb(), 0..4)).prop_map(|(c, v)| Op::Deny(c, v)),
        Just(Op::RemoveAll),
    ]
}

/// Applies `op` through the public mission API. Deny-lists have no mutator, so
/// they are installed by parsing a mission that carries one.
fn apply(mission: &mut MissionSpec, op: &Op) {
    match op {
        Op::AllowAll(category) => match category {
            CommandCategory::ContinuousMovement => {
                mission.allow_all_continuous_movement_commands()
            }
            CommandCategory::DiscreteMovement => mission.allow_all_discrete_movement_commands(),
            CommandCategory::AbsoluteMovement => mission.allow_all_absolute_movement_commands(),
            CommandCategory::Inventory => mission.allow_all_inventory_commands(),
            CommandCategory::Chat => mission.allow_all_chat_commands(),
        },
        Op::Allow(category, verb) => match category {
            CommandCategory::ContinuousMovement => mission.allow_continuous_movement_command(verb),
            CommandCategory::DiscreteMovement => mission.allow_discrete_movement_command(verb),
            CommandCategory::AbsoluteMovement => mission.allow_absolute_movement_command(verb),
            CommandCategory::Inventory => mission.allow_inventory_command(verb),
            CommandCategory::Chat => mission.allow_all_chat_commands(),
        },
        Op::Deny(category, verbs) => {
            let xml = mission.to_xml(false).expect("serialize");
            let element = category.element_name();
            let commands: String = verbs
                .iter()
                .map(|verb| format!("<command>{}</command>", escape(verb)))
                .collect();
            let handler = format!(
                r#"<{element}><ModifierList type="deny-list">{commands}</ModifierList></{element}>"#
            );
            let xml = xml
                .replace(&format!("<{element}/>"), "")
                .replace(&format!("<{element}>"), "<Stale>")
                .replace(&format!("</{element}>"), "</Stale>");
            let xml = strip_stale(&xml)
                .replace("<AgentHandlers>", &format!("<AgentHandlers>{handler}"));
            let xml = if xml.contains("<AgentHandlers/>") {
                xml.replace(
                    "<AgentHandlers/>",
                    &format!("<AgentHandlers>{handler}</AgentHandlers>"),
                )
            } else {
                xml
            };
            *mission = MissionSpec::from_xml(&xml, true).expect("deny-list mission");
        }
        Op::RemoveAll => mission.remove_all_command_handlers(),
    }
}

fn strip_stale(xml: &str) -> String {
    match (xml.find("<Stale>"), xml.find("</Stale>")) {
        (Some(start), Some(end)) => {
            format!("{}{}", &xml[..start], &xml[end + "</Stale>".len()..])
        }
        _ => xml.to_string(),
    }
}

fn assert_well_formed(policy: &CommandPolicy) {
    let verbs: Option<&VerbSet> = policy.allow_list().or(policy.deny_list());
    assert!(policy.allow_list().is_none() || policy.deny_list().is_none());
    if let Some(verbs) = verbs {
        let unique: HashSet<&String> = verbs.iter().collect();
        assert_eq!(unique.len(), verbs.len());
    }
}

proptest! {
    #[test]
    fn prop_categories_never_hold_both_lists(ops in prop::collection::vec(op(), 0..24)) {
        let mut mission = MissionSpec::new();
        for op in &ops {
            apply(&mut mission, op);
            for category in CommandCategory::ALL {
                assert_well_formed(mission.command_policy(0, category).expect("role 0"));
            }
        }
    }

    #[test]
    fn prop_allow_is_idempotent(category in category(), verb in verb(), repeats in 1usize..5) {
        prop_assume!(category != CommandCategory::Chat);
        let mut mission = MissionSpec::new();
        for _ in 0..repeats {
            apply(&mut mission, &Op::Allow(category, verb.clone()));
        }
        let policy = mission.command_policy(0, category).expect("role 0");
        let allowed: Vec<&String> = policy.allow_list().expect("allow list").iter().collect();
        prop_assert_eq!(allowed, vec![&verb]);
    }

    #[test]
    fn prop_allow_supersedes_deny(
        category in category(),
        denied in prop::collection::vec(verb(), 1..4),
        verb in verb(),
    ) {
        prop_assume!(category != CommandCategory::Chat);
        let mut mission = MissionSpec::new();
        apply(&mut mission, &Op::Deny(category, denied));
        prop_assert!(mission.command_policy(0, category).expect("role 0").deny_list().is_some());

        apply(&mut mission, &Op::Allow(category, verb.clone()));
        let policy = mission.command_policy(0, category).expect("role 0");
        prop_assert!(policy.deny_list().is_none());
        prop_assert!(policy.permits(&verb));
    }

    #[test]
    fn prop_handlers_round_trip(
        ops in prop::collection::vec(op(), 0..16),
        pretty in any::<bool>(),
    ) {
        let mut mission = MissionSpec::new();
        for op in &ops {
            apply(&mut mission, op);
        }
        let parsed = MissionSpec::from_xml(&mission.to_xml(pretty).expect("serialize"), true)
            .expect("parse");
        prop_assert_eq!(parsed, mission);
    }
}
