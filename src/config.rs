//! Session configuration
//!
//! All tuning values for the calming sounds live here. They are cosmetic: any
//! value inside the validated ranges gives a working session. Configuration is
//! read from an optional JSON file; every field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::SoundProfile;
use crate::error::{MeditationError, Result};

/// Shortest selectable session in minutes
pub const MIN_DURATION_MINUTES: u32 = 1;

/// Longest selectable session in minutes
pub const MAX_DURATION_MINUTES: u32 = 60;

/// Reference pitch for note name conversion
const A4_HZ: f32 = 440.0;

/// Drone synthesis recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneParams {
    /// Chord played while the drone sounds, as note names
    pub chord: Vec<String>,
    /// Envelope attack in seconds
    pub attack_secs: f32,
    /// Envelope decay in seconds
    pub decay_secs: f32,
    /// Sustain level: 0 to 1
    pub sustain: f32,
    /// Envelope release in seconds
    pub release_secs: f32,
    /// Output level in dB
    pub volume_db: f32,
    /// Modulator to carrier frequency ratio
    pub harmonicity: f32,
}

impl Default for DroneParams {
    fn default() -> Self {
        Self {
            chord: ["C3", "E3", "G3", "C4"].iter().map(|n| n.to_string()).collect(),
            attack_secs: 2.0,
            decay_secs: 0.1,
            sustain: 1.0,
            release_secs: 2.0,
            volume_db: -15.0,
            harmonicity: 3.0,
        }
    }
}

impl DroneParams {
    /// Chord frequencies in Hz
    pub fn chord_frequencies(&self) -> Result<Vec<f32>> {
        self.chord.iter().map(|note| note_to_frequency(note)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.chord.is_empty() {
            return Err(invalid("drone.chord", "[]", "at least one note"));
        }
        self.chord_frequencies()?;
        check_range("drone.attack_secs", self.attack_secs, 0.0, 10.0)?;
        check_range("drone.decay_secs", self.decay_secs, 0.0, 10.0)?;
        check_range("drone.sustain", self.sustain, 0.0, 1.0)?;
        check_range("drone.release_secs", self.release_secs, 0.0, 10.0)?;
        check_range("drone.volume_db", self.volume_db, -60.0, 0.0)?;
        check_range("drone.harmonicity", self.harmonicity, 0.0, 16.0)
    }
}

/// Rain synthesis recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RainParams {
    /// Low-pass cutoff in Hz
    pub cutoff_hz: f32,
    /// Low-pass resonance
    pub q: f32,
    /// Output level in dB
    pub volume_db: f32,
    /// Seed for the noise generator
    pub seed: u64,
}

impl Default for RainParams {
    fn default() -> Self {
        Self {
            cutoff_hz: 800.0,
            q: 1.0,
            volume_db: -20.0,
            seed: 0x5eed,
        }
    }
}

impl RainParams {
    pub fn validate(&self) -> Result<()> {
        check_range("rain.cutoff_hz", self.cutoff_hz, 20.0, 20_000.0)?;
        check_range("rain.q", self.q, 0.1, 10.0)?;
        check_range("rain.volume_db", self.volume_db, -60.0, 0.0)
    }
}

/// Shared reverb recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParams {
    /// Decay time in seconds
    pub decay_secs: f32,
    /// Pre-delay in seconds
    pub pre_delay_secs: f32,
    /// Wet/dry balance: 0 (dry) to 1 (wet)
    pub wet: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            decay_secs: 10.0,
            pre_delay_secs: 0.01,
            wet: 0.7,
        }
    }
}

impl ReverbParams {
    pub fn validate(&self) -> Result<()> {
        check_range("reverb.decay_secs", self.decay_secs, 0.1, 30.0)?;
        check_range("reverb.pre_delay_secs", self.pre_delay_secs, 0.0, 0.1)?;
        check_range("reverb.wet", self.wet, 0.0, 1.0)
    }
}

/// All sound recipes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundParams {
    pub drone: DroneParams,
    pub rain: RainParams,
    pub reverb: ReverbParams,
}

impl SoundParams {
    pub fn validate(&self) -> Result<()> {
        self.drone.validate()?;
        self.rain.validate()?;
        self.reverb.validate()
    }
}

/// Top-level configuration for a meditation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeditationConfig {
    /// Timer length offered when the session opens
    pub default_duration_minutes: u32,
    /// Calming sound selected when the session opens
    pub default_profile: SoundProfile,
    /// Sample rate used by the offline renderer
    pub sample_rate: u32,
    pub sound: SoundParams,
}

impl Default for MeditationConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 5,
            default_profile: SoundProfile::Drone,
            sample_rate: 48_000,
            sound: SoundParams::default(),
        }
    }
}

impl MeditationConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&self.default_duration_minutes) {
            return Err(invalid(
                "default_duration_minutes",
                &self.default_duration_minutes.to_string(),
                &format!("{} to {}", MIN_DURATION_MINUTES, MAX_DURATION_MINUTES),
            ));
        }
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(invalid(
                "sample_rate",
                &self.sample_rate.to_string(),
                "8000 to 192000 Hz",
            ));
        }
        self.sound.validate()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Clamp a user-entered duration to the selectable range
pub fn clamp_duration_minutes(minutes: u32) -> u32 {
    minutes.clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES)
}

/// Convert a note name such as `C3`, `F#4` or `Bb2` to Hz
pub fn note_to_frequency(note: &str) -> Result<f32> {
    let bad = || invalid("note", note, "a note name like C3, F#4 or Bb2");

    let mut chars = note.trim().chars().peekable();
    let letter = chars.next().ok_or_else(bad)?;
    let semitone: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(bad()),
    };

    let accidental = match chars.peek() {
        Some('#') => {
            chars.next();
            1
        }
        Some('b') => {
            chars.next();
            -1
        }
        _ => 0,
    };

    let octave: i32 = chars.collect::<String>().parse().map_err(|_| bad())?;
    if !(0..=8).contains(&octave) {
        return Err(bad());
    }

    // MIDI numbering: C4 = 60, A4 = 69
    let midi = (octave + 1) * 12 + semitone + accidental;
    Ok(A4_HZ * 2.0_f32.powf((midi - 69) as f32 / 12.0))
}

fn check_range(field: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(invalid(field, &value.to_string(), &format!("{} to {}", min, max)));
    }
    Ok(())
}

fn invalid(field: &str, value: &str, expected: &str) -> MeditationError {
    MeditationError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}
