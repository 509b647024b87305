//! Synthesis and effects
//!
//! Building blocks the offline platform renders calming sounds with.
//! Sources produce one sample at a time; effects process in place.

mod envelope;
mod filter;
mod reverb;
mod synth;

pub use envelope::{Envelope, EnvelopeStage};
pub use filter::LowPassFilter;
pub use reverb::Reverb;
pub use synth::{PolySynth, WhiteNoise};
