//! Stillwater - Guided Meditation Audio Engine
//!
//! A countdown timer that drives a small synthesis graph of calming sounds:
//!
//! ```text
//! tone generator / noise -> filter -> shared reverb -> destination
//! ```
//!
//! # Architecture
//!
//! - [`engine::AudioContextGate`]: unlocks platform audio on a user gesture
//! - [`engine::AudioGraphManager`]: builds, switches and tears down sound chains
//! - [`engine::MeditationTimer`]: Idle / Running / Paused / Complete countdown
//! - [`engine::MeditationSession`]: UI facade with status text and snapshots
//!
//! All audio goes through the [`platform::AudioPlatform`] trait;
//! [`platform::OfflinePlatform`] renders it in software.

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod platform;

pub use error::{MeditationError, Result};
