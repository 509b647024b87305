//! Stillwater CLI - Guided Meditation Engine
//!
//! Command-line interface for rendering and simulating meditation sessions.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use stillwater::cli::commands::{self, SimulateOptions};
use stillwater::cli::{Cli, Commands};
use stillwater::config::MeditationConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Stillwater v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => MeditationConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => MeditationConfig::default(),
    };

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Stillwater v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &MeditationConfig) -> anyhow::Result<()> {
    match cmd {
        Commands::Render {
            output,
            sound,
            seconds,
            tail,
            bit_depth,
        } => {
            commands::render(config, &output, sound, seconds, tail, bit_depth)
                .with_context(|| format!("failed to render {}", output.display()))?;
        }
        Commands::Simulate {
            minutes,
            sound,
            pause_at,
            pause_for,
            json,
        } => {
            let options = SimulateOptions {
                minutes,
                sound,
                pause_at,
                pause_for,
            };
            let (_, snapshot) =
                commands::simulate(config, &options).context("simulated session failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
        }
        Commands::Profiles => commands::list_profiles(),
        Commands::DefaultConfig => commands::print_default_config()?,
    }
    Ok(())
}
