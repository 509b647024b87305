//! CLI Module
//!
//! Command-line interface for rendering and simulating meditation sessions.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::SoundProfile;

/// Stillwater - guided meditation timer with calming sounds
#[derive(Parser, Debug)]
#[command(name = "stillwater")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a meditation's calming sound to a WAV file
    #[command(name = "render")]
    Render {
        /// Output WAV path
        output: PathBuf,

        /// Calming sound (drone or rain)
        #[arg(short, long)]
        sound: Option<SoundProfile>,

        /// Meditation length in seconds
        #[arg(long, default_value_t = 30)]
        seconds: u32,

        /// Seconds of reverb tail rendered after the countdown ends
        #[arg(long, default_value_t = 4.0)]
        tail: f32,

        /// Bit depth: 16, 24 or 32 (float)
        #[arg(short, long, default_value_t = 24)]
        bit_depth: u16,
    },

    /// Run a session second by second and print its timeline
    #[command(name = "simulate")]
    Simulate {
        /// Meditation length in minutes (clamped to 1..=60)
        #[arg(short, long)]
        minutes: Option<u32>,

        /// Calming sound (drone or rain)
        #[arg(short, long)]
        sound: Option<SoundProfile>,

        /// Pause after this many seconds of meditation
        #[arg(long)]
        pause_at: Option<u32>,

        /// How long to stay paused before resuming
        #[arg(long, default_value_t = 10)]
        pause_for: u32,

        /// Print the final session snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the available calming sounds
    #[command(name = "profiles")]
    Profiles,

    /// Print the default configuration as JSON
    #[command(name = "default-config")]
    DefaultConfig,
}
