//! Audio Buffer
//!
//! Rendered audio handed out by the offline platform and written to WAV.
//! Samples are 32-bit float, one `Vec` per channel.

/// Default sample rate for rendering (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Threshold below which audio is considered silent (-80dBFS)
pub const SILENCE_THRESHOLD_DB: f32 = -80.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// RMS level of a buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Peak level of a buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    #[default]
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Multi-channel float audio
///
/// ```
/// use stillwater::engine::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(48000, ChannelLayout::Mono, 48000);
/// assert_eq!(buffer.num_channels(), 1);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Silent buffer of `num_samples` per channel
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Wrap mono samples
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Samples per channel
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sample_rate as f64
    }

    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Append another buffer with the same channel count
    ///
    /// Returns false (and leaves `self` untouched) on a layout mismatch.
    pub fn append(&mut self, other: &AudioBuffer) -> bool {
        if self.num_channels() != other.num_channels() || self.sample_rate != other.sample_rate {
            return false;
        }
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            dst.extend_from_slice(src);
        }
        true
    }

    /// Samples in interleaved order (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_samples = self.num_samples();
        let mut interleaved = Vec::with_capacity(self.num_channels() * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Whether all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Whether the RMS level is below the silence threshold
    pub fn is_silent(&self) -> bool {
        calculate_rms(self) <= SILENCE_THRESHOLD_DB
    }

    /// Clamp all samples to [-1.0, 1.0]
    pub fn clamp(&mut self) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Mono, DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_conversions() {
        assert_relative_eq!(db_to_linear(0.0), 1.0);
        assert_relative_eq!(db_to_linear(-20.0), 0.1, epsilon = 1e-6);
        assert_relative_eq!(linear_to_db(0.5), -6.0206, epsilon = 1e-3);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = AudioBuffer::new(480, ChannelLayout::Stereo, 48000);
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_samples(), 480);
        assert!(buffer.is_silent());
        assert_eq!(calculate_peak(&buffer), f32::NEG_INFINITY);
    }

    #[test]
    fn test_append() {
        let mut a = AudioBuffer::from_mono(vec![0.1, 0.2], 48000);
        let b = AudioBuffer::from_mono(vec![0.3], 48000);
        assert!(a.append(&b));
        assert_eq!(a.channel(0), &[0.1, 0.2, 0.3]);

        let stereo = AudioBuffer::new(4, ChannelLayout::Stereo, 48000);
        assert!(!a.append(&stereo));
        assert_eq!(a.num_samples(), 3);
    }

    #[test]
    fn test_interleave_and_clamp() {
        let mut buffer = AudioBuffer {
            samples: vec![vec![1.5, 0.0], vec![-2.0, 0.25]],
            sample_rate: 48000,
        };
        buffer.clamp();
        assert_eq!(buffer.to_interleaved(), vec![1.0, -1.0, 0.0, 0.25]);
    }

    #[test]
    fn test_rms_of_full_scale_square() {
        let buffer = AudioBuffer::from_mono(vec![1.0, -1.0, 1.0, -1.0], 48000);
        assert_relative_eq!(calculate_rms(&buffer), 0.0, epsilon = 1e-6);
        assert!(buffer.is_finite());
    }
}
