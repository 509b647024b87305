//! Reverb (Freeverb)
//!
//! The shared room reverb every calming sound is routed through:
//! - 8 parallel comb filters for early reflections
//! - 4 series allpass filters for diffusion
//! - Pre-delay buffer
//!
//! Processing is mono; the offline renderer mixes to a single channel.

use crate::config::ReverbParams;

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for Freeverb delays
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz (8 filters)
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz (4 filters)
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Fixed gain for allpass filters (standard Freeverb value)
const ALLPASS_GAIN: f32 = 0.5;

/// Input attenuation before the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Makeup gain on the wet signal
const WET_SCALE: f32 = 3.0;

/// Scale factor for room size parameter to feedback
const ROOM_SCALE: f32 = 0.28;

/// Offset for room size parameter to feedback
const ROOM_OFFSET: f32 = 0.7;

/// Decay time mapped to the largest room
const MAX_DECAY_SECS: f32 = 12.0;

/// Damping applied in the comb feedback path
const DAMPING: f32 = 0.5;

/// Scale factor for damping parameter
const DAMP_SCALE: f32 = 0.4;

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass comb filter
///
/// Implements: y[n] = x[n - delay] + feedback * lowpass(y[n - delay])
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    /// Buffer size mask for efficient wrapping
    mask: usize,
    delay: usize,
    /// Filter state for damping (low-pass)
    filter_state: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
}

impl CombFilter {
    fn new(delay: usize) -> Self {
        // Round up to next power of 2 for efficient wrapping
        let size = (delay + 1).next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
            delay,
            filter_state: 0.0,
            feedback: 0.5,
            damp1: 0.5,
            damp2: 0.5,
        }
    }

    fn set_coefficients(&mut self, feedback: f32, damp1: f32, damp2: f32) {
        self.feedback = feedback;
        self.damp1 = damp1;
        self.damp2 = damp2;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let read_pos = (self.write_pos + self.mask + 1 - self.delay) & self.mask;
        let output = self.buffer[read_pos];

        // One-pole low-pass in the feedback path
        self.filter_state = output * self.damp1 + self.filter_state * self.damp2;
        self.buffer[self.write_pos] = input + self.filter_state * self.feedback;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

/// Allpass filter for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
    delay: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        let size = (delay + 1).next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
            delay,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let read_pos = (self.write_pos + self.mask + 1 - self.delay) & self.mask;
        let delayed = self.buffer[read_pos];

        let output = delayed - ALLPASS_GAIN * input;
        self.buffer[self.write_pos] = input + ALLPASS_GAIN * output;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Pre-delay line
#[derive(Debug, Clone)]
struct PreDelayBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
    delay: usize,
}

impl PreDelayBuffer {
    fn new(delay: usize) -> Self {
        let size = (delay + 1).next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
            delay,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        if self.delay == 0 {
            return input;
        }
        self.buffer[self.write_pos] = input;
        let read_pos = (self.write_pos + self.mask + 1 - self.delay) & self.mask;
        let output = self.buffer[read_pos];
        self.write_pos = (self.write_pos + 1) & self.mask;
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

// ============================================================================
// Main Reverb
// ============================================================================

/// Mono Freeverb tuned from [`ReverbParams`]
#[derive(Debug, Clone)]
pub struct Reverb {
    params: ReverbParams,
    sample_rate: u32,
    combs: [CombFilter; 8],
    allpasses: [AllpassFilter; 4],
    pre_delay: PreDelayBuffer,
}

impl Reverb {
    pub fn new(params: ReverbParams, sample_rate: u32) -> Self {
        let scale = sample_rate as f64 / REFERENCE_SAMPLE_RATE;
        let scaled = |delay: usize| ((delay as f64 * scale) as usize).max(1);

        let pre_delay_samples = (params.pre_delay_secs * sample_rate as f32) as usize;

        let mut reverb = Self {
            combs: std::array::from_fn(|i| CombFilter::new(scaled(COMB_DELAYS[i]))),
            allpasses: std::array::from_fn(|i| AllpassFilter::new(scaled(ALLPASS_DELAYS[i]))),
            pre_delay: PreDelayBuffer::new(pre_delay_samples),
            params,
            sample_rate,
        };
        reverb.update_coefficients();
        reverb
    }

    pub fn params(&self) -> &ReverbParams {
        &self.params
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Room size (0 to 1) derived from the decay time
    pub fn room_size(&self) -> f32 {
        (self.params.decay_secs / MAX_DECAY_SECS).clamp(0.0, 1.0)
    }

    fn update_coefficients(&mut self) {
        let feedback = self.room_size() * ROOM_SCALE + ROOM_OFFSET;
        let damp2 = DAMPING * DAMP_SCALE;
        let damp1 = 1.0 - damp2;
        for comb in &mut self.combs {
            comb.set_coefficients(feedback, damp1, damp2);
        }
    }

    /// Process one sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.pre_delay.process(input) * FIXED_GAIN;

        let mut output: f32 = self.combs.iter_mut().map(|comb| comb.process(delayed)).sum();
        for allpass in &mut self.allpasses {
            output = allpass.process(output);
        }

        let wet = self.params.wet;
        input * (1.0 - wet) + output * wet * WET_SCALE
    }

    /// Process a block in place
    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Clear the tail
    pub fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.clear();
        }
        for allpass in &mut self.allpasses {
            allpass.clear();
        }
        self.pre_delay.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(params: ReverbParams, len: usize) -> Vec<f32> {
        let mut reverb = Reverb::new(params, 48000);
        let mut samples = vec![0.0; len];
        samples[0] = 1.0;
        reverb.process_block(&mut samples);
        samples
    }

    #[test]
    fn test_silence_in_silence_out() {
        let mut reverb = Reverb::new(ReverbParams::default(), 48000);
        let mut samples = vec![0.0; 4800];
        reverb.process_block(&mut samples);
        assert!(samples.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_impulse_produces_tail() {
        let response = impulse_response(ReverbParams::default(), 48000);
        let tail_energy: f32 = response[24000..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0, "reverb tail should still ring after 0.5s");
        assert!(response.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_longer_decay_rings_longer() {
        let short = impulse_response(
            ReverbParams {
                decay_secs: 1.0,
                ..ReverbParams::default()
            },
            96000,
        );
        let long = impulse_response(ReverbParams::default(), 96000);
        let energy = |r: &[f32]| r[48000..].iter().map(|s| s * s).sum::<f32>();
        assert!(energy(&long) > energy(&short));
    }

    #[test]
    fn test_dry_signal_with_zero_wet() {
        let mut reverb = Reverb::new(
            ReverbParams {
                wet: 0.0,
                pre_delay_secs: 0.0,
                ..ReverbParams::default()
            },
            48000,
        );
        assert_eq!(reverb.process(0.5), 0.5);
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut reverb = Reverb::new(ReverbParams::default(), 48000);
        let mut samples = vec![1.0; 4800];
        reverb.process_block(&mut samples);
        reverb.reset();
        assert_eq!(reverb.process(0.0), 0.0);
    }
}
