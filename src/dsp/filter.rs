//! Low-pass biquad filter
//!
//! Second-order Butterworth-style low-pass used to muffle the rain noise.
//! Coefficients follow the Audio EQ Cookbook.

use std::f64::consts::PI;

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    fn low_pass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        // Clamp frequency to valid range (below Nyquist)
        let freq = frequency.clamp(20.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha;
        BiquadCoeffs {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64, // x[n-1]
    x2: f64, // x[n-2]
    y1: f64, // y[n-1]
    y2: f64, // y[n-2]
}

impl BiquadState {
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Mono low-pass filter
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    cutoff_hz: f32,
    q: f32,
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f32, q: f32, sample_rate: u32) -> Self {
        Self {
            cutoff_hz,
            q,
            coeffs: BiquadCoeffs::low_pass(sample_rate as f64, cutoff_hz as f64, q as f64),
            state: BiquadState::default(),
        }
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.state.process(input as f64, &self.coeffs) as f32
    }

    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }
}
