//! Calming sound selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Selectable ambient sound for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundProfile {
    /// Sustained consonant chord from sine voices
    #[default]
    Drone,
    /// Low-passed broadband noise
    Rain,
}

impl SoundProfile {
    pub const ALL: [SoundProfile; 2] = [SoundProfile::Drone, SoundProfile::Rain];

    pub fn display_name(&self) -> &'static str {
        match self {
            SoundProfile::Drone => "Soothing Drone",
            SoundProfile::Rain => "Gentle Rain",
        }
    }

    /// Short description of the synthesis recipe
    pub fn recipe(&self) -> &'static str {
        match self {
            SoundProfile::Drone => "AM sine chord -> reverb",
            SoundProfile::Rain => "white noise -> low-pass -> reverb",
        }
    }
}

impl fmt::Display for SoundProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundProfile::Drone => write!(f, "drone"),
            SoundProfile::Rain => write!(f, "rain"),
        }
    }
}

impl FromStr for SoundProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drone" => Ok(SoundProfile::Drone),
            "rain" => Ok(SoundProfile::Rain),
            other => Err(format!("unknown sound '{}' (expected drone or rain)", other)),
        }
    }
}
