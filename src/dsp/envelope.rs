//! ADSR envelope
//!
//! Linear attack, decay and release segments. Release always starts from the
//! current level so a voice released mid-attack never jumps.

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Attack/decay/sustain/release envelope generator
#[derive(Debug, Clone)]
pub struct Envelope {
    attack_secs: f32,
    decay_secs: f32,
    sustain: f32,
    release_secs: f32,
    sample_rate: f32,
    stage: EnvelopeStage,
    level: f32,
    /// Per-sample decrement for the current release
    release_step: f32,
}

impl Envelope {
    pub fn new(attack_secs: f32, decay_secs: f32, sustain: f32, release_secs: f32, sample_rate: u32) -> Self {
        Self {
            attack_secs,
            decay_secs,
            sustain: sustain.clamp(0.0, 1.0),
            release_secs,
            sample_rate: sample_rate as f32,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            release_step: 0.0,
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    /// Start (or restart) the attack from the current level
    pub fn trigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    /// Enter the release stage
    pub fn release(&mut self) {
        if self.stage == EnvelopeStage::Idle {
            return;
        }
        self.stage = EnvelopeStage::Release;
        self.release_step = self.level / self.samples(self.release_secs);
    }

    fn samples(&self, secs: f32) -> f32 {
        (secs * self.sample_rate).max(1.0)
    }

    /// Advance one sample and return the new level
    pub fn next_level(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                self.level += 1.0 / self.samples(self.attack_secs);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= (1.0 - self.sustain) / self.samples(self.decay_secs);
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.sustain;
            }
            EnvelopeStage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }
}
