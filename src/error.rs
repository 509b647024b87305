//! Error handling for Stillwater
//!
//! Every error carries enough context to be turned into a status line for the
//! user or a diagnostic for the log. Nothing in the meditation engine is fatal.

use thiserror::Error;

use crate::engine::{ControlAction, TimerPhase};
use crate::platform::PlatformError;

/// Result type alias for Stillwater operations
pub type Result<T> = std::result::Result<T, MeditationError>;

/// Main error type for Stillwater operations
#[derive(Error, Debug)]
pub enum MeditationError {
    // Audio output errors
    #[error("Audio unlock refused: {reason}")]
    AudioUnlock { reason: String },

    #[error("Audio graph initialization failed: {reason}")]
    GraphInit { reason: String },

    #[error("Audio output is not ready")]
    NotReady,

    // Timer errors
    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        action: ControlAction,
        phase: TimerPhase,
    },

    #[error("Invalid duration: {secs}s (expected 1 to 3600 seconds)")]
    InvalidDuration { secs: u32 },

    // Configuration errors
    #[error("Invalid configuration value for {field}: {value} (expected {expected})")]
    InvalidConfig {
        field: String,
        value: String,
        expected: String,
    },

    // Platform errors that do not map onto a higher-level failure
    #[error("Audio platform error: {0}")]
    Platform(#[from] PlatformError),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MeditationError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MeditationError::AudioUnlock { .. } => "AUDIO_UNLOCK",
            MeditationError::GraphInit { .. } => "GRAPH_INIT",
            MeditationError::NotReady => "NOT_READY",
            MeditationError::InvalidTransition { .. } => "INVALID_TRANSITION",
            MeditationError::InvalidDuration { .. } => "INVALID_DURATION",
            MeditationError::InvalidConfig { .. } => "INVALID_CONFIG",
            MeditationError::Platform(_) => "PLATFORM_ERROR",
            MeditationError::Io(_) => "IO_ERROR",
            MeditationError::Wav(_) => "WAV_ERROR",
            MeditationError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Everything the session can hit at runtime is recoverable; only file and
    /// configuration problems need outside intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MeditationError::AudioUnlock { .. } => true,
            MeditationError::GraphInit { .. } => true,
            MeditationError::NotReady => true,
            MeditationError::InvalidTransition { .. } => true,
            MeditationError::InvalidDuration { .. } => true,
            MeditationError::Platform(_) => true,
            _ => false,
        }
    }

    /// Whether the error should be shown to the user as a status message
    ///
    /// Out-of-phase control actions are only logged.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, MeditationError::InvalidTransition { .. })
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MeditationError::AudioUnlock { .. } => vec![
                "Click, tap or press a key anywhere on the page",
                "Use the 'Enable Audio' button to retry",
            ],
            MeditationError::NotReady => vec![
                "Interact with the page once to enable audio",
                "Check that the browser is not muting this tab",
            ],
            MeditationError::GraphInit { .. } => vec![
                "Enable audio first, then pick a sound again",
                "Try the other calming sound",
                "The timer still works without sound",
            ],
            MeditationError::InvalidDuration { .. } => vec![
                "Pick a duration between 1 and 60 minutes",
            ],
            MeditationError::InvalidConfig { .. } => vec![
                "Fix the value in the configuration file",
                "Run 'stillwater-cli default-config' to see a valid example",
            ],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            MeditationError::NotReady => {
                "Audio context not ready. Click anywhere on the page first.".to_string()
            }
            MeditationError::AudioUnlock { .. } => {
                "Audio failed to initialize. Click anywhere or use 'Retry Audio'.".to_string()
            }
            MeditationError::GraphInit { reason } => {
                format!("Audio initialization error: {}", reason)
            }
            MeditationError::InvalidDuration { .. } => {
                "Meditation duration must be between 1 and 60 minutes.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
