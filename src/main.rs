use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use mission_spec::MissionSpec;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{self, EnvFilter};
mod files;

/// Create, validate and inspect Malmo mission XML
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print or write the default mission
    New {
        /// Mission time limit in seconds
        #[arg(long)]
        time_limit: Option<f64>,
        /// Use Minecraft's terrain generator instead of a flat world
        #[arg(long)]
        terrain: bool,
        /// Write without indentation
        #[arg(long)]
        compact: bool,
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a mission file against the mission grammar
    Validate { path: PathBuf },
    /// Re-serialize a mission file
    Format {
        path: PathBuf,
        /// Write without indentation
        #[arg(long)]
        compact: bool,
        /// Accept files that do not pass validation
        #[arg(long)]
        no_validate: bool,
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show agents, video settings and command handlers
    Inspect {
        path: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    match args.command {
        Command::New {
            time_limit,
            terrain,
            compact,
            output,
        } => {
            let mut mission = MissionSpec::new();
            if let Some(seconds) = time_limit {
                mission.time_limit_in_seconds(seconds);
            }
            if terrain {
                mission.create_default_terrain();
            }
            files::write_output(output.as_deref(), &mission.to_xml(!compact)?)
        }
        Command::Validate { path } => {
            files::validate_file(&path)?;
            println!("{} is a valid mission", path.display());
            Ok(())
        }
        Command::Format {
            path,
            compact,
            no_validate,
            output,
        } => {
            let mission = files::read_mission(&path, !no_validate)?;
            files::write_output(output.as_deref(), &mission.to_xml(!compact)?)
        }
        Command::Inspect { path, json } => {
            let mission = files::read_mission(&path, false)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&files::describe(&mission)?)?);
                Ok(())
            } else {
                files::print_summary(&mission)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_format_flags() {
        let args = Args::try_parse_from([
            "mission-spec",
            "format",
            "mission.xml",
            "--compact",
            "--no-validate",
            "-o",
            "out.xml",
        ])
        .expect("parse");
        match args.command {
            Command::Format {
                path,
                compact,
                no_validate,
                output,
            } => {
                assert_eq!(path, PathBuf::from("mission.xml"));
                assert!(compact);
                assert!(no_validate);
                assert_eq!(output, Some(PathBuf::from("out.xml")));
            }
            _ => panic!("expected format command"),
        }
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Args::try_parse_from(["mission-spec", "run"]).is_err());
    }
}
