//! WAV export for rendered sessions

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::error::{MeditationError, Result};

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Bit depth: 16, 24, or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 24 }
    }
}

impl ExportFormat {
    pub fn new(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(ExportFormat { bit_depth }),
            _ => Err(MeditationError::InvalidConfig {
                field: "bit_depth".to_string(),
                value: bit_depth.to_string(),
                expected: "16, 24 or 32".to_string(),
            }),
        }
    }
}

/// Write a buffer to a WAV file at the buffer's own sample rate
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let format = ExportFormat::new(format.bit_depth)?;

    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let mut writer = WavWriter::create(path, spec)?;
    let interleaved = buffer.to_interleaved();

    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled)?;
            }
        }
        _ => {
            for sample in interleaved {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    log::info!(
        "Exported {:.1}s of audio to {}",
        buffer.duration_secs(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_export_16_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let buffer = AudioBuffer::from_mono(vec![0.0, 0.5, -0.5, 1.0], 48000);

        export_audio(&buffer, &path, ExportFormat::new(16).unwrap()).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 48000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, 32767]);
    }

    #[test]
    fn test_export_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let buffer = AudioBuffer::from_mono(vec![0.25; 10], 44100);

        export_audio(&buffer, &path, ExportFormat::new(32).unwrap()).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_format, SampleFormat::Float);
        assert_eq!(reader.len(), 10);
    }

    #[test]
    fn test_unsupported_bit_depth() {
        assert!(ExportFormat::new(12).is_err());
    }
}
