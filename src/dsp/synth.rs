//! Sound sources
//!
//! - [`PolySynth`]: amplitude-modulated sine voices for the sustained drone
//! - [`WhiteNoise`]: broadband noise for the rain texture

use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::envelope::Envelope;
use crate::config::DroneParams;
use crate::engine::db_to_linear;

/// One AM voice: sine carrier modulated by a sine at `harmonicity` times the pitch
#[derive(Debug, Clone)]
struct AmVoice {
    frequency: f32,
    carrier_phase: f32,
    modulator_phase: f32,
    envelope: Envelope,
}

impl AmVoice {
    fn next_sample(&mut self, harmonicity: f32, sample_rate: f32) -> f32 {
        let level = self.envelope.next_level();
        if level == 0.0 && self.envelope.is_idle() {
            return 0.0;
        }

        let carrier = (self.carrier_phase * TAU).sin();
        let modulator = (self.modulator_phase * TAU).sin();

        self.carrier_phase = (self.carrier_phase + self.frequency / sample_rate).fract();
        self.modulator_phase =
            (self.modulator_phase + self.frequency * harmonicity / sample_rate).fract();

        // Modulator mapped to 0..1 so the voice never inverts
        carrier * (0.5 + 0.5 * modulator) * level
    }
}

/// Polyphonic AM synth
#[derive(Debug, Clone)]
pub struct PolySynth {
    params: DroneParams,
    sample_rate: u32,
    gain: f32,
    voices: Vec<AmVoice>,
}

impl PolySynth {
    pub fn new(params: DroneParams, sample_rate: u32) -> Self {
        Self {
            gain: db_to_linear(params.volume_db),
            params,
            sample_rate,
            voices: Vec::new(),
        }
    }

    /// Start the attack for every frequency
    ///
    /// A frequency that is already sounding is re-triggered from its current
    /// level instead of stacking a second voice.
    pub fn trigger_attack(&mut self, frequencies: &[f32]) {
        for &frequency in frequencies {
            if let Some(voice) = self
                .voices
                .iter_mut()
                .find(|v| (v.frequency - frequency).abs() < f32::EPSILON)
            {
                voice.envelope.trigger();
                continue;
            }

            let mut envelope = Envelope::new(
                self.params.attack_secs,
                self.params.decay_secs,
                self.params.sustain,
                self.params.release_secs,
                self.sample_rate,
            );
            envelope.trigger();
            self.voices.push(AmVoice {
                frequency,
                carrier_phase: 0.0,
                modulator_phase: 0.0,
                envelope,
            });
        }
    }

    /// Release every sounding voice
    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.envelope.release();
        }
    }

    /// Voices that are not idle
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.envelope.is_idle()).count()
    }

    pub fn next_sample(&mut self) -> f32 {
        let harmonicity = self.params.harmonicity;
        let sample_rate = self.sample_rate as f32;
        let sum: f32 = self
            .voices
            .iter_mut()
            .map(|v| v.next_sample(harmonicity, sample_rate))
            .sum();

        // Drop voices whose release has finished
        self.voices.retain(|v| !v.envelope.is_idle());

        sum * self.gain
    }
}

/// Seeded white noise generator
#[derive(Debug, Clone)]
pub struct WhiteNoise {
    rng: StdRng,
    gain: f32,
    running: bool,
}

impl WhiteNoise {
    pub fn new(volume_db: f32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            gain: db_to_linear(volume_db),
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn next_sample(&mut self) -> f32 {
        if !self.running {
            return 0.0;
        }
        self.rng.gen_range(-1.0_f32..=1.0) * self.gain
    }
}
