//! Meditation session
//!
//! The UI-facing facade: composes the audio gate, the sound graph and the
//! countdown, turns errors into status text and exposes a serializable
//! snapshot of everything a view needs to render.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::gate::{AudioContextGate, Readiness};
use super::graph::{AudioGraphManager, SetupStatus};
use super::profile::SoundProfile;
use super::timer::{ControlAction, MeditationTimer, TimerPhase, TimerState};
use crate::config::{clamp_duration_minutes, MeditationConfig};
use crate::error::{MeditationError, Result};
use crate::platform::{Activation, AudioPlatform, UserGesture};

/// Tone of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// Latest message shown below the controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    /// What the user can do about an error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusMessage {
    pub fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level,
            hints: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Error status with the error's recovery suggestions
    pub fn from_error(err: &MeditationError) -> Self {
        Self {
            hints: err
                .recovery_suggestions()
                .into_iter()
                .map(String::from)
                .collect(),
            ..Self::new(StatusLevel::Error, err.friendly_message())
        }
    }
}

/// Everything a view needs to render the meditation panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub ready: bool,
    pub timer: TimerState,
    /// Remaining time as `MM:SS`
    pub display: String,
    pub sound_playing: bool,
    pub profile: SoundProfile,
    pub status: Option<StatusMessage>,
}

/// A guided meditation: audio unlock, calming sound and countdown
#[derive(Debug)]
pub struct MeditationSession<P: AudioPlatform + Clone> {
    gate: AudioContextGate<P>,
    graph: AudioGraphManager<P>,
    timer: MeditationTimer,
    profile: SoundProfile,
    status: Option<StatusMessage>,
}

impl<P: AudioPlatform + Clone> MeditationSession<P> {
    pub fn new(platform: P, config: &MeditationConfig) -> Result<Self> {
        config.validate()?;

        let mut session = Self {
            gate: AudioContextGate::new(platform.clone()),
            graph: AudioGraphManager::new(platform, config.sound.clone()),
            timer: MeditationTimer::new(config.default_duration_minutes * 60)?,
            profile: config.default_profile,
            status: None,
        };

        if session.gate.is_ready() {
            session.configure_selected();
        }
        Ok(session)
    }

    // ========================================================================
    // Audio unlock
    // ========================================================================

    /// Page-wide gesture listener; returns readiness
    pub fn handle_gesture(&mut self, gesture: UserGesture) -> bool {
        let was_ready = self.gate.is_ready();
        if let Err(err) = self.gate.handle_gesture(gesture) {
            self.report(err);
        }
        self.sync_readiness(was_ready);
        self.gate.is_ready()
    }

    /// Manual "enable audio" retry
    pub fn retry_unlock(&mut self) -> Result<bool> {
        let was_ready = self.gate.is_ready();
        self.gate
            .attempt_unlock(Activation::Gesture(UserGesture::Click))
            .map_err(|err| self.report(err))?;
        self.sync_readiness(was_ready);
        Ok(self.gate.is_ready())
    }

    // ========================================================================
    // Controls
    // ========================================================================

    /// Change the calming sound; not while a meditation runs
    pub fn select_profile(&mut self, profile: SoundProfile) -> Result<()> {
        if self.timer.is_running() {
            return Err(self.reject(ControlAction::SelectSound));
        }
        if profile == self.profile {
            return Ok(());
        }

        self.profile = profile;
        if self.gate.is_ready() {
            self.configure_selected();
        } else {
            self.graph.dispose();
        }
        self.set_status(StatusLevel::Info, format!("Sound type changed to {}", profile));
        Ok(())
    }

    /// Set the meditation length, clamped to 1..=60 minutes; only while idle
    pub fn set_duration_minutes(&mut self, minutes: u32) -> Result<u32> {
        let minutes = clamp_duration_minutes(minutes);
        self.timer
            .set_duration(minutes * 60)
            .map_err(|err| self.report(err))?;
        Ok(minutes)
    }

    /// Start or resume the meditation
    pub fn start(&mut self) -> Result<()> {
        let startable = matches!(self.timer.phase(), TimerPhase::Idle | TimerPhase::Paused);
        if startable && self.gate.is_ready() {
            self.resume_if_suspended();
            self.ensure_configured();
        }

        self.timer
            .start(&self.gate, &mut self.graph)
            .map_err(|err| self.report(err))?;
        self.set_status(StatusLevel::Success, "Meditation timer started!");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.timer
            .pause(&mut self.graph)
            .map_err(|err| self.report(err))?;
        self.set_status(StatusLevel::Info, "Meditation paused.");
        Ok(())
    }

    pub fn reset(&mut self) {
        self.timer.reset(&mut self.graph);
        self.set_status(StatusLevel::Info, "Meditation reset.");
    }

    /// Play or stop the calming sound outside a meditation
    ///
    /// Returns whether the sound is now on (or queued to start).
    pub fn toggle_sound(&mut self) -> Result<bool> {
        if self.timer.is_running() {
            return Err(self.reject(ControlAction::ToggleSound));
        }

        if self.graph.is_sound_playing() || self.graph.is_start_queued() {
            self.graph.stop().map_err(|err| self.report(err))?;
            self.set_status(StatusLevel::Info, "Calming sound stopped.");
            return Ok(false);
        }

        if !self.gate.is_ready() {
            return Err(self.report(MeditationError::NotReady));
        }
        self.resume_if_suspended();
        self.ensure_configured();
        self.graph.start().map_err(|err| self.report(err))?;
        self.set_status(
            StatusLevel::Info,
            format!("Calming sound ({}) started.", self.profile),
        );
        Ok(true)
    }

    /// Let time pass: resolve pending audio work, then run the countdown
    pub fn advance(&mut self, elapsed: Duration) -> TimerPhase {
        let was_ready = self.gate.is_ready();
        self.gate.poll();
        self.sync_readiness(was_ready);

        if let Err(err) = self.graph.poll() {
            self.report(err);
        }

        let before = self.timer.phase();
        let phase = self.timer.advance(elapsed, &mut self.graph);
        if before == TimerPhase::Running && phase == TimerPhase::Complete {
            self.set_status(StatusLevel::Success, "Meditation complete!");
        }
        phase
    }

    /// Stop everything and release every audio node
    pub fn shutdown(&mut self) {
        self.timer.reset(&mut self.graph);
        self.graph.shutdown();
        log::info!("Meditation session shut down");
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        let timer = self.timer.state();
        SessionSnapshot {
            ready: self.gate.is_ready(),
            display: timer.to_string(),
            timer,
            sound_playing: self.graph.is_sound_playing(),
            profile: self.profile,
            status: self.status.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn profile(&self) -> SoundProfile {
        self.profile
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn timer(&self) -> &MeditationTimer {
        &self.timer
    }

    pub fn graph(&self) -> &AudioGraphManager<P> {
        &self.graph
    }

    pub fn gate(&self) -> &AudioContextGate<P> {
        &self.gate
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn sync_readiness(&mut self, was_ready: bool) {
        let ready = self.gate.is_ready();
        if ready && !was_ready {
            self.configure_selected();
        } else if was_ready && !ready {
            log::warn!("Audio output lost; interact with the page to re-enable it");
        }
    }

    fn configure_selected(&mut self) {
        if let Err(err) = self.graph.configure(self.profile) {
            self.report(err);
        }
    }

    fn ensure_configured(&mut self) {
        let current = self.graph.active_profile() == Some(self.profile)
            && self.graph.setup_status() != SetupStatus::Unconfigured;
        if !current {
            self.configure_selected();
        }
    }

    /// A context suspended after unlock is resumed from the click that started us
    fn resume_if_suspended(&mut self) {
        if self.gate.platform().is_running() {
            return;
        }
        if let Err(err) = self
            .gate
            .attempt_unlock(Activation::Gesture(UserGesture::Click))
        {
            self.report(err);
        }
    }

    fn reject(&mut self, action: ControlAction) -> MeditationError {
        self.report(MeditationError::InvalidTransition {
            action,
            phase: self.timer.phase(),
        })
    }

    /// Log an error and surface it as status text when the user should see it
    fn report(&mut self, err: MeditationError) -> MeditationError {
        if err.is_user_visible() {
            if err.is_recoverable() {
                log::warn!("[{}] {}", err.error_code(), err);
            } else {
                log::error!("[{}] {}", err.error_code(), err);
            }
            let message = StatusMessage::from_error(&err);
            log::debug!("Status: {}", message.text);
            self.status = Some(message);
        } else {
            log::debug!("Ignored: {}", err);
        }
        err
    }

    fn set_status(&mut self, level: StatusLevel, text: impl Into<String>) {
        let message = StatusMessage::new(level, text);
        log::debug!("Status: {}", message.text);
        self.status = Some(message);
    }
}

impl<P: AudioPlatform + Clone> Readiness for MeditationSession<P> {
    fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }
}
