//! Meditation Engine Module
//!
//! Core of the meditation experience:
//! - Audio unlock gate and readiness
//! - Calming sound graph lifecycle
//! - Countdown state machine
//! - Session facade, buffers and WAV export

pub mod buffer;
pub mod gate;
pub mod graph;
pub mod io;
pub mod profile;
pub mod session;
pub mod timer;

pub use buffer::{
    calculate_peak, calculate_rms, db_to_linear, linear_to_db, AudioBuffer, ChannelLayout,
    DEFAULT_SAMPLE_RATE,
};
pub use gate::{AudioContextGate, Readiness, UnlockStatus};
pub use graph::{AudioGraphManager, SetupStatus, StartOutcome};
pub use io::{export_audio, ExportFormat};
pub use profile::SoundProfile;
pub use session::{MeditationSession, SessionSnapshot, StatusLevel, StatusMessage};
pub use timer::{
    ControlAction, MeditationTimer, SoundControl, TimerPhase, TimerState, MAX_DURATION_SECS,
};
