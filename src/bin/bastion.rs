//! Interactive CLI for driving a bastion-engine session.
//!
//! Loads config/packs from a data directory, then either runs a single
//! subcommand and exits or drops into an interactive prompt when no
//! subcommand is given.

use anyhow::Context;
use bastion_engine::config::validate::Mode;
use bastion_engine::engine::{BastionEngine, EnginePaths};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root of the data directory (base_config.json, settings.json,
    /// facilities/, custom_packs/, sessions/).
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Treat pack validation failures as fatal instead of sanitizing.
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser)]
enum Command {
    #[command(about = "Create a new session and print its filename", alias = "new")]
    NewSession {
        #[arg(required = true)]
        session_name: String,
        #[arg(required = true)]
        bastion_name: String,
        #[arg(long)]
        dm_name: Option<String>,
    },
    #[command(about = "Load the most recently modified session", alias = "latest")]
    LoadLatest,
    #[command(about = "List saved sessions")]
    ListSessions,
    #[command(about = "Print warnings from re-validating all loaded packs", alias = "validate")]
    ValidatePacks,
    #[command(about = "Advance the active session's current turn", alias = "advance")]
    AdvanceTurn,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mode = if cli.strict { Mode::Strict } else { Mode::Sanitize };
    let paths = EnginePaths {
        base_config: cli.data_dir.join("base_config.json"),
        settings: cli.data_dir.join("settings.json"),
        core_packs_dir: cli.data_dir.join("facilities"),
        custom_packs_dir: cli.data_dir.join("custom_packs"),
        sessions_dir: cli.data_dir.join("sessions"),
    };

    let mut engine = BastionEngine::load(paths, mode).context("failed to load engine")?;

    match cli.command {
        Some(Command::NewSession { session_name, bastion_name, dm_name }) => {
            let result = engine
                .create_session(&session_name, dm_name.as_deref(), &bastion_name)
                .context("failed to create session")?;
            let filename = serde_json::to_string_pretty(&result.filename)
                .context("failed to serialize session filename")?;
            println!("{filename}");
        }
        Some(Command::LoadLatest) => {
            let result = engine.load_latest_session().context("failed to load latest session")?;
            println!("{}: {}", result.success, result.message);
        }
        Some(Command::ListSessions) => {
            let sessions = engine.list_sessions().context("failed to list sessions")?;
            for s in sessions {
                println!("{:<28} turn {:<4} {}", s.filename, s.current_turn, s.session_name);
            }
        }
        Some(Command::ValidatePacks) => {
            for message in engine.validate_packs() {
                println!("{message}");
            }
        }
        Some(Command::AdvanceTurn) => {
            let result = engine.advance_turn();
            println!("{}: {}", result.success, result.message);
        }
        None => repl(&mut engine),
    }
    Ok(())
}

fn repl(engine: &mut BastionEngine) {
    use std::io::Write;
    println!("bastion-engine interactive shell. type 'quit' to exit.");
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).unwrap_or(0) == 0 {
            break;
        }
        match input.trim() {
            "quit" | "exit" => break,
            "" => continue,
            "states" => {
                for state in engine.get_facility_states() {
                    println!("{:?}", state);
                }
            }
            "advance" => {
                let result = engine.advance_turn();
                println!("{}: {}", result.success, result.message);
            }
            other => println!("unrecognized command: {other}"),
        }
    }
}
