//! Meditation Timer State Machine
//!
//! Countdown that drives the calming sound:
//!
//! ```text
//! Idle --start--> Running --pause--> Paused --start--> Running
//!                    |
//!                    +--(reaches 0)--> Complete
//! any --reset--> Idle
//! ```
//!
//! Sound is started once when entering Running and stopped on pause, reset
//! and completion. Out-of-phase calls are no-ops that return
//! `InvalidTransition`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::gate::Readiness;
use crate::error::{MeditationError, Result};

/// Longest countdown the timer accepts (one hour)
pub const MAX_DURATION_SECS: u32 = 60 * 60;

const TICK: Duration = Duration::from_secs(1);

/// Timer phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// Waiting to start (default state)
    #[default]
    Idle,
    /// Counting down
    Running,
    /// Stopped mid-countdown; start resumes
    Paused,
    /// Reached zero; only reset leaves this phase
    Complete,
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerPhase::Idle => write!(f, "idle"),
            TimerPhase::Running => write!(f, "running"),
            TimerPhase::Paused => write!(f, "paused"),
            TimerPhase::Complete => write!(f, "complete"),
        }
    }
}

/// User-facing control actions, used to report rejected transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Pause,
    Reset,
    SetDuration,
    SelectSound,
    ToggleSound,
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAction::Start => write!(f, "start"),
            ControlAction::Pause => write!(f, "pause"),
            ControlAction::Reset => write!(f, "reset"),
            ControlAction::SetDuration => write!(f, "change duration"),
            ControlAction::SelectSound => write!(f, "change sound"),
            ControlAction::ToggleSound => write!(f, "toggle sound"),
        }
    }
}

/// Snapshot of the countdown, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub duration_secs: u32,
    pub remaining_secs: u32,
    pub phase: TimerPhase,
}

impl fmt::Display for TimerState {
    /// `MM:SS`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}",
            self.remaining_secs / 60,
            self.remaining_secs % 60
        )
    }
}

/// What the timer needs from the audio side
pub trait SoundControl {
    fn start_sound(&mut self) -> Result<()>;
    fn stop_sound(&mut self) -> Result<()>;
}

/// Countdown clock with one-second resolution
///
/// Exists only while the timer is Running. Sub-second time carries over
/// between `advance` calls.
#[derive(Debug, Clone, Default)]
struct CountdownClock {
    carry: Duration,
}

impl CountdownClock {
    /// Whole seconds elapsed, keeping the remainder
    fn advance(&mut self, elapsed: Duration) -> u32 {
        self.carry += elapsed;
        let whole = self.carry.as_secs();
        self.carry -= Duration::from_secs(whole);
        whole.min(u32::MAX as u64) as u32
    }
}

/// Countdown state machine for a meditation session
#[derive(Debug, Clone)]
pub struct MeditationTimer {
    duration_secs: u32,
    remaining_secs: u32,
    phase: TimerPhase,
    clock: Option<CountdownClock>,
}

impl Default for MeditationTimer {
    fn default() -> Self {
        Self {
            duration_secs: 5 * 60,
            remaining_secs: 5 * 60,
            phase: TimerPhase::Idle,
            clock: None,
        }
    }
}

impl MeditationTimer {
    /// Create an idle timer
    ///
    /// ```
    /// use stillwater::engine::{MeditationTimer, TimerPhase};
    /// let timer = MeditationTimer::new(300).unwrap();
    /// assert_eq!(timer.phase(), TimerPhase::Idle);
    /// assert_eq!(timer.state().to_string(), "05:00");
    /// ```
    pub fn new(duration_secs: u32) -> Result<Self> {
        validate_duration(duration_secs)?;
        Ok(Self {
            duration_secs,
            remaining_secs: duration_secs,
            ..Self::default()
        })
    }

    // ========================================================================
    // Controls
    // ========================================================================

    /// Change the countdown length; only while Idle
    pub fn set_duration(&mut self, duration_secs: u32) -> Result<()> {
        if self.phase != TimerPhase::Idle {
            return Err(self.reject(ControlAction::SetDuration));
        }
        validate_duration(duration_secs)?;
        self.duration_secs = duration_secs;
        self.remaining_secs = duration_secs;
        log::debug!("[TIMER] Duration set to {}s", duration_secs);
        Ok(())
    }

    /// Start or resume the countdown
    ///
    /// State transitions: Idle -> Running, Paused -> Running.
    /// Without audio readiness this fails with `NotReady` and nothing changes.
    /// A sound that fails to start is logged; the countdown still runs.
    pub fn start(&mut self, readiness: &impl Readiness, sound: &mut impl SoundControl) -> Result<()> {
        match self.phase {
            TimerPhase::Idle | TimerPhase::Paused => {}
            TimerPhase::Running | TimerPhase::Complete => {
                return Err(self.reject(ControlAction::Start));
            }
        }

        if !readiness.is_ready() {
            log::warn!("[TIMER] Start refused: audio not ready");
            return Err(MeditationError::NotReady);
        }

        let resumed = self.phase == TimerPhase::Paused;
        self.phase = TimerPhase::Running;
        self.clock = Some(CountdownClock::default());

        if let Err(err) = sound.start_sound() {
            log::warn!("[TIMER] Calming sound did not start: {}", err);
        }

        log::debug!(
            "[TIMER] {} at {}s remaining",
            if resumed { "Resumed" } else { "Started" },
            self.remaining_secs
        );
        Ok(())
    }

    /// Pause the countdown
    ///
    /// State transition: Running -> Paused. A partial second is discarded.
    pub fn pause(&mut self, sound: &mut impl SoundControl) -> Result<()> {
        if self.phase != TimerPhase::Running {
            return Err(self.reject(ControlAction::Pause));
        }
        self.clock = None;
        self.phase = TimerPhase::Paused;
        stop_quietly(sound);
        log::debug!("[TIMER] Paused at {}s remaining", self.remaining_secs);
        Ok(())
    }

    /// Back to the full duration
    ///
    /// State transitions: Any -> Idle. Idempotent.
    pub fn reset(&mut self, sound: &mut impl SoundControl) {
        self.clock = None;
        self.remaining_secs = self.duration_secs;
        self.phase = TimerPhase::Idle;
        stop_quietly(sound);
        log::debug!("[TIMER] Reset to {}s", self.duration_secs);
    }

    /// One elapsed second
    pub fn tick(&mut self, sound: &mut impl SoundControl) -> TimerPhase {
        self.advance(TICK, sound)
    }

    /// Let wall-clock time pass
    ///
    /// Does nothing unless Running. Entering Complete drops the clock and
    /// stops the sound exactly once.
    pub fn advance(&mut self, elapsed: Duration, sound: &mut impl SoundControl) -> TimerPhase {
        let Some(clock) = self.clock.as_mut() else {
            return self.phase;
        };

        let seconds = clock.advance(elapsed);
        self.remaining_secs = self.remaining_secs.saturating_sub(seconds);

        if self.remaining_secs == 0 {
            self.clock = None;
            self.phase = TimerPhase::Complete;
            stop_quietly(sound);
            log::info!("[TIMER] Meditation complete");
        }
        self.phase
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TimerState {
        TimerState {
            duration_secs: self.duration_secs,
            remaining_secs: self.remaining_secs,
            phase: self.phase,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Whether a countdown clock exists
    pub fn has_clock(&self) -> bool {
        self.clock.is_some()
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    fn reject(&self, action: ControlAction) -> MeditationError {
        log::debug!("[TIMER] Ignoring {} while {}", action, self.phase);
        MeditationError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }
}

fn validate_duration(duration_secs: u32) -> Result<()> {
    if duration_secs == 0 || duration_secs > MAX_DURATION_SECS {
        return Err(MeditationError::InvalidDuration {
            secs: duration_secs,
        });
    }
    Ok(())
}

fn stop_quietly(sound: &mut impl SoundControl) {
    if let Err(err) = sound.stop_sound() {
        log::warn!("[TIMER] Calming sound did not stop: {}", err);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
