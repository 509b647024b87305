//! Audio unlock gate
//!
//! Platforms refuse to produce sound before the user has interacted with the
//! page. The gate turns that restriction into a single readiness flag:
//! - gestures (click/touch/key) are forwarded to the platform until unlocked
//! - after unlocking it stops listening and never calls resume again
//! - a closed context is an explicit failure and re-arms the listener

use crate::error::{MeditationError, Result};
use crate::platform::{
    Activation, AudioPlatform, ContextState, PlatformError, ResumeOutcome, UserGesture,
};

/// Anything that can answer "may we make sound now?"
///
/// Injected into the timer so tests can fake both answers.
pub trait Readiness {
    fn is_ready(&self) -> bool;
}

impl Readiness for bool {
    fn is_ready(&self) -> bool {
        *self
    }
}

/// Outcome of an unlock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockStatus {
    Ready,
    /// The platform accepted the request; `poll()` resolves it
    Pending,
}

/// Tracks whether the platform audio output has been unlocked
#[derive(Debug)]
pub struct AudioContextGate<P: AudioPlatform> {
    platform: P,
    ready: bool,
    listening: bool,
    pending: bool,
    last_state: ContextState,
}

impl<P: AudioPlatform> AudioContextGate<P> {
    /// Create a gate; a context that already runs counts as unlocked
    pub fn new(platform: P) -> Self {
        let last_state = platform.current_state();
        let ready = last_state == ContextState::Running;
        if ready {
            log::info!("Audio context already running");
        }
        Self {
            platform,
            ready,
            listening: !ready,
            pending: false,
            last_state,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether gestures are still forwarded to the platform
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Try to unlock the audio output
    ///
    /// Idempotent: once the platform runs, this reports `Ready` without
    /// calling resume again.
    pub fn attempt_unlock(&mut self, activation: Activation) -> Result<UnlockStatus> {
        if self.platform.current_state() == ContextState::Running {
            self.mark_ready();
            return Ok(UnlockStatus::Ready);
        }

        match self.platform.resume_or_start(activation) {
            Ok(ResumeOutcome::Running) => {
                self.mark_ready();
                Ok(UnlockStatus::Ready)
            }
            Ok(ResumeOutcome::Pending) => {
                log::debug!("Audio unlock pending");
                self.pending = true;
                Ok(UnlockStatus::Pending)
            }
            Err(err) => {
                log::warn!("Audio unlock failed: {}", err);
                self.pending = false;
                self.ready = false;
                // Retry on the next gesture
                self.listening = true;
                Err(unlock_error(err))
            }
        }
    }

    /// Gesture listener
    ///
    /// Once unlocked, gestures are ignored and simply report `Ready`.
    pub fn handle_gesture(&mut self, gesture: UserGesture) -> Result<UnlockStatus> {
        if !self.listening {
            if self.ready {
                return Ok(UnlockStatus::Ready);
            }
            if self.pending {
                return Ok(UnlockStatus::Pending);
            }
        }
        log::debug!("User interaction detected: {}", gesture);
        self.attempt_unlock(Activation::Gesture(gesture))
    }

    /// Resolve a pending unlock and pick up state changes; returns readiness
    pub fn poll(&mut self) -> bool {
        let state = self.platform.current_state();
        if self.pending || state != self.last_state {
            self.on_state_change(state);
        }
        self.ready
    }

    /// Platform state notification
    pub fn on_state_change(&mut self, state: ContextState) {
        self.last_state = state;
        match state {
            ContextState::Running => {
                if !self.ready {
                    self.mark_ready();
                }
            }
            ContextState::Closed => {
                if self.ready || self.pending {
                    log::warn!("Audio context closed; audio is no longer available");
                }
                self.ready = false;
                self.pending = false;
                self.listening = true;
            }
            ContextState::Suspended => {
                if self.ready {
                    log::warn!("Audio context suspended after unlock");
                }
            }
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn mark_ready(&mut self) {
        self.last_state = ContextState::Running;
        if !self.ready {
            log::info!("Audio context ready");
        }
        self.ready = true;
        self.pending = false;
        self.listening = false;
    }
}

impl<P: AudioPlatform> Readiness for AudioContextGate<P> {
    fn is_ready(&self) -> bool {
        self.ready
    }
}

fn unlock_error(err: PlatformError) -> MeditationError {
    MeditationError::AudioUnlock {
        reason: err.to_string(),
    }
}
