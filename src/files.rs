use color_eyre::eyre::{eyre, Result, WrapErr};
use color_eyre::Help;
use mission_spec::{
    CommandCategory, CommandPolicy, MissionSpec, SchemaValidator, StructuralValidator,
};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

pub fn read_mission(path: &Path, validate: bool) -> Result<MissionSpec> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Could not read mission file at {}", path.display()))?;
    MissionSpec::from_xml(&text, validate)
        .wrap_err_with(|| format!("Could not load mission from {}", path.display()))
}

pub fn validate_file(path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Could not read mission file at {}", path.display()))?;
    StructuralValidator.validate(&text).map_err(|violation| {
        eyre!("{} is not a valid mission", path.display())
            .note(violation.to_string())
            .suggestion("Compare the element against the mission schema")
    })
}

/// Writes to `output`, or to stdout when no path is given.
pub fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = File::create(path)
                .wrap_err_with(|| format!("Could not create {}", path.display()))?;
            file.write_all(text.as_bytes())
                .wrap_err_with(|| format!("Could not write mission to {}", path.display()))?;
            tracing::info!("Wrote mission to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// The mission model as JSON, plus the values the role accessors derive from
/// it.
pub fn describe(mission: &MissionSpec) -> Result<Value> {
    let mut value =
        serde_json::to_value(mission).wrap_err("Could not convert mission to JSON")?;
    for role in 0..mission.get_number_of_agents() {
        if let Some(Value::Object(video)) = value.pointer_mut(&format!("/agents/{role}/video")) {
            video.insert("channels".to_string(), json!(mission.get_video_channels(role)?));
        }
    }
    Ok(value)
}

pub fn print_summary(mission: &MissionSpec) -> Result<()> {
    println!("Agents: {}", mission.get_number_of_agents());
    for role in 0..mission.get_number_of_agents() {
        println!(
            "  [{role}] {} ({})",
            mission.agent_name(role)?,
            mission.agent_mode(role)?.as_str()
        );
        if mission.is_video_requested(role)? {
            println!(
                "      video: {}x{}, {} channels",
                mission.get_video_width(role)?,
                mission.get_video_height(role)?,
                mission.get_video_channels(role)?
            );
        } else {
            println!("      video: not requested");
        }
        for category in CommandCategory::ALL {
            let label = match mission.command_policy(role, category)? {
                CommandPolicy::Absent => continue,
                CommandPolicy::Unrestricted => "all commands".to_string(),
                CommandPolicy::AllowOnly(verbs) => format!(
                    "allow {}",
                    verbs.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
                CommandPolicy::DenyOnly(verbs) => format!(
                    "deny {}",
                    verbs.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
            };
            println!("      {category}: {label}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_reports_video_and_handlers() {
        let mut mission = MissionSpec::new();
        mission.request_video_with_depth(320, 240);
        mission.allow_inventory_command("selectInventoryItem");
        mission.allow_all_chat_commands();

        let value = describe(&mission).expect("describe");
        assert_eq!(value["server"]["time_limit_ms"], json!(10_000.0));
        let agent = &value["agents"][0];
        assert_eq!(
            agent["video"],
            json!({ "width": 320, "height": 240, "want_depth": true, "channels": 4 })
        );
        assert_eq!(agent["mode"], json!("Survival"));
        assert_eq!(agent["start"], Value::Null);
        assert_eq!(
            agent["command_handlers"],
            json!({
                "inventory": { "state": "allow_only", "verbs": ["selectInventoryItem"] },
                "chat": { "state": "unrestricted" },
            })
        );
    }

    #[test]
    fn describe_keeps_placement_orientation() {
        let mission = MissionSpec::from_xml(
            r#"<Mission xmlns="http://ProjectMalmo.microsoft.com">
                 <AgentSection mode="Creative">
                   <Name>Bot</Name>
                   <AgentStart><Placement x="0.5" y="227" z="0.5" yaw="90"/></AgentStart>
                   <AgentHandlers/>
                 </AgentSection>
               </Mission>"#,
            false,
        )
        .expect("parse");
        let value = describe(&mission).expect("describe");
        let agent = &value["agents"][0];
        assert_eq!(
            agent["start"],
            json!({ "at": { "x": 0.5, "y": 227.0, "z": 0.5 }, "yaw": 90.0 })
        );
        assert_eq!(agent["video"], Value::Null);
        assert_eq!(value["agents"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn read_and_write_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("mission.xml");
        let mut mission = MissionSpec::new();
        mission.observe_chat();
        let xml = mission.to_xml(true).expect("serialize");

        write_output(Some(&path), &xml).expect("write");
        validate_file(&path).expect("valid");
        let loaded = read_mission(&path, true).expect("read");
        assert_eq!(loaded, mission);
    }

    #[test]
    fn invalid_files_report_the_violation() {
        let _ = color_eyre::install();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.xml");
        fs::write(&path, "<Mission/>").expect("write");

        let err = validate_file(&path).expect_err("invalid");
        assert!(format!("{err:?}").contains("namespace"));
        assert!(read_mission(&path, true).is_err());
    }

    #[test]
    fn missing_files_have_context() {
        let err = read_mission(Path::new("/nonexistent/mission.xml"), false).expect_err("missing");
        assert!(err.to_string().contains("Could not read mission file"));
    }
}
