//! Integration Tests
//!
//! End-to-end tests for the meditation engine: timer transitions, graph
//! lifecycle on the offline platform and rendered audio.

use std::time::Duration;

#[macro_use]
extern crate pretty_assertions;
use test_case::test_case;

use stillwater::config::SoundParams;
use stillwater::engine::{
    AudioContextGate, AudioGraphManager, MeditationTimer, SetupStatus, SoundControl, SoundProfile,
    StartOutcome, TimerPhase, TimerState,
};
use stillwater::platform::{
    Activation, AudioPlatform, AutoplayPolicy, NodeKind, OfflinePlatform, UserGesture,
};
use stillwater::{MeditationError, Result};

/// Sound double that records what the timer asked for
#[derive(Default)]
struct RecordingSound {
    starts: u32,
    stops: u32,
}

impl SoundControl for RecordingSound {
    fn start_sound(&mut self) -> Result<()> {
        self.starts += 1;
        Ok(())
    }

    fn stop_sound(&mut self) -> Result<()> {
        self.stops += 1;
        Ok(())
    }
}

fn running_platform() -> OfflinePlatform {
    let platform = OfflinePlatform::new(48000).with_policy(AutoplayPolicy::Allowed);
    platform.resume_or_start(Activation::None).unwrap();
    platform
}

fn node_kinds(platform: &OfflinePlatform) -> Vec<NodeKind> {
    platform.live_nodes().into_iter().map(|(_, kind)| kind).collect()
}

// === Timer Transition Table ===

#[derive(Debug, Clone, Copy)]
enum Act {
    Start,
    Pause,
    Reset,
    Tick,
    SetDuration,
}

/// A 5 second timer brought into `phase`
fn timer_in(phase: TimerPhase, sound: &mut RecordingSound) -> MeditationTimer {
    let mut timer = MeditationTimer::new(5).unwrap();
    match phase {
        TimerPhase::Idle => {}
        TimerPhase::Running => timer.start(&true, sound).unwrap(),
        TimerPhase::Paused => {
            timer.start(&true, sound).unwrap();
            timer.tick(sound);
            timer.pause(sound).unwrap();
        }
        TimerPhase::Complete => {
            timer.start(&true, sound).unwrap();
            for _ in 0..5 {
                timer.tick(sound);
            }
        }
    }
    assert_eq!(timer.phase(), phase);
    timer
}

#[test_case(TimerPhase::Idle, Act::Start => (TimerPhase::Running, true) ; "idle start")]
#[test_case(TimerPhase::Idle, Act::Pause => (TimerPhase::Idle, false) ; "idle pause")]
#[test_case(TimerPhase::Idle, Act::Reset => (TimerPhase::Idle, true) ; "idle reset")]
#[test_case(TimerPhase::Idle, Act::Tick => (TimerPhase::Idle, true) ; "idle tick")]
#[test_case(TimerPhase::Idle, Act::SetDuration => (TimerPhase::Idle, true) ; "idle set duration")]
#[test_case(TimerPhase::Running, Act::Start => (TimerPhase::Running, false) ; "running start")]
#[test_case(TimerPhase::Running, Act::Pause => (TimerPhase::Paused, true) ; "running pause")]
#[test_case(TimerPhase::Running, Act::Reset => (TimerPhase::Idle, true) ; "running reset")]
#[test_case(TimerPhase::Running, Act::Tick => (TimerPhase::Running, true) ; "running tick")]
#[test_case(TimerPhase::Running, Act::SetDuration => (TimerPhase::Running, false) ; "running set duration")]
#[test_case(TimerPhase::Paused, Act::Start => (TimerPhase::Running, true) ; "paused start")]
#[test_case(TimerPhase::Paused, Act::Pause => (TimerPhase::Paused, false) ; "paused pause")]
#[test_case(TimerPhase::Paused, Act::Reset => (TimerPhase::Idle, true) ; "paused reset")]
#[test_case(TimerPhase::Paused, Act::Tick => (TimerPhase::Paused, true) ; "paused tick")]
#[test_case(TimerPhase::Paused, Act::SetDuration => (TimerPhase::Paused, false) ; "paused set duration")]
#[test_case(TimerPhase::Complete, Act::Start => (TimerPhase::Complete, false) ; "complete start")]
#[test_case(TimerPhase::Complete, Act::Pause => (TimerPhase::Complete, false) ; "complete pause")]
#[test_case(TimerPhase::Complete, Act::Reset => (TimerPhase::Idle, true) ; "complete reset")]
#[test_case(TimerPhase::Complete, Act::Tick => (TimerPhase::Complete, true) ; "complete tick")]
#[test_case(TimerPhase::Complete, Act::SetDuration => (TimerPhase::Complete, false) ; "complete set duration")]
fn test_transition_table(from: TimerPhase, act: Act) -> (TimerPhase, bool) {
    let mut sound = RecordingSound::default();
    let mut timer = timer_in(from, &mut sound);
    let before = timer.state();

    let accepted = match act {
        Act::Start => timer.start(&true, &mut sound).is_ok(),
        Act::Pause => timer.pause(&mut sound).is_ok(),
        Act::Reset => {
            timer.reset(&mut sound);
            true
        }
        Act::Tick => {
            timer.tick(&mut sound);
            true
        }
        Act::SetDuration => timer.set_duration(42).is_ok(),
    };

    if !accepted {
        assert_eq!(timer.state(), before, "rejected action must not change state");
    }
    (timer.phase(), accepted)
}

// === Timer Properties ===

#[test]
fn test_reset_twice_equals_once() {
    let mut sound = RecordingSound::default();
    let mut timer = timer_in(TimerPhase::Paused, &mut sound);

    timer.reset(&mut sound);
    let once = timer.state();
    timer.reset(&mut sound);
    assert_eq!(timer.state(), once);
    assert!(!timer.has_clock());
}

#[test]
fn test_five_second_meditation_completes() {
    let mut sound = RecordingSound::default();
    let mut timer = MeditationTimer::new(5).unwrap();
    timer.start(&true, &mut sound).unwrap();

    for _ in 0..5 {
        timer.tick(&mut sound);
    }

    assert_eq!(
        timer.state(),
        TimerState {
            duration_secs: 5,
            remaining_secs: 0,
            phase: TimerPhase::Complete,
        }
    );
    assert_eq!(sound.stops, 1);
}

#[test]
fn test_start_before_readiness() {
    let platform = OfflinePlatform::new(48000);
    let gate = AudioContextGate::new(platform.clone());
    let mut graph = AudioGraphManager::new(platform, SoundParams::default());
    let mut timer = MeditationTimer::new(60).unwrap();

    let err = timer.start(&gate, &mut graph).unwrap_err();
    assert!(matches!(err, MeditationError::NotReady));
    assert_eq!(timer.phase(), TimerPhase::Idle);
    assert!(!timer.has_clock());
}

#[test]
fn test_pause_then_resume_keeps_remaining_time() {
    let mut sound = RecordingSound::default();
    let mut timer = MeditationTimer::new(10).unwrap();
    timer.start(&true, &mut sound).unwrap();
    timer.advance(Duration::from_secs(4), &mut sound);
    timer.pause(&mut sound).unwrap();

    timer.start(&true, &mut sound).unwrap();
    assert_eq!(timer.state().remaining_secs, 6);
    assert_eq!(timer.phase(), TimerPhase::Running);
}

#[test]
fn test_set_duration_while_running_is_noop() {
    let mut sound = RecordingSound::default();
    let mut timer = timer_in(TimerPhase::Running, &mut sound);
    let before = timer.state();

    assert!(timer.set_duration(600).is_err());
    assert_eq!(timer.state(), before);
}

// === Graph Lifecycle ===

#[test]
fn test_configure_then_dispose_keeps_reverb() {
    let platform = running_platform();
    let mut graph = AudioGraphManager::new(platform.clone(), SoundParams::default());

    graph.configure(SoundProfile::Drone).unwrap();
    graph.dispose();

    assert!(graph.has_reverb());
    assert_eq!(graph.setup_status(), SetupStatus::Unconfigured);
    assert_eq!(graph.active_profile(), None);
    assert_eq!(node_kinds(&platform), vec![NodeKind::Reverb]);
}

#[test]
fn test_switch_profile_while_playing_leaves_no_orphans() {
    let platform = running_platform();
    let mut graph = AudioGraphManager::new(platform.clone(), SoundParams::default());

    graph.configure(SoundProfile::Rain).unwrap();
    assert_eq!(graph.start().unwrap(), StartOutcome::Started);
    let before = platform.live_nodes();

    graph.configure(SoundProfile::Drone).unwrap();
    assert!(!graph.is_sound_playing());

    let after = platform.live_nodes();
    assert_eq!(after.len(), 2);
    // The shared reverb survives; the rain nodes are gone
    assert_eq!(after[0], before[0]);
    for (id, kind) in &before[1..] {
        assert!(platform.node_kind(*id).is_none(), "orphan {:?} node {}", kind, id);
    }
    assert_eq!(after[1].1, NodeKind::PolySynth);
}

#[test]
fn test_gate_unlock_then_timer_drives_graph() {
    let platform = OfflinePlatform::new(48000);
    let mut gate = AudioContextGate::new(platform.clone());
    let mut graph = AudioGraphManager::new(platform.clone(), SoundParams::default());
    let mut timer = MeditationTimer::new(3).unwrap();

    gate.handle_gesture(UserGesture::Click).unwrap();
    graph.configure(SoundProfile::Drone).unwrap();

    timer.start(&gate, &mut graph).unwrap();
    assert!(graph.is_sound_playing());

    timer.advance(Duration::from_secs(3), &mut graph);
    assert_eq!(timer.phase(), TimerPhase::Complete);
    assert!(!graph.is_sound_playing());
}

#[test]
fn test_start_racing_reverb_generation_is_queued() {
    let platform = running_platform().with_reverb_latency(8);
    let mut gate = AudioContextGate::new(platform.clone());
    gate.attempt_unlock(Activation::None).unwrap();
    let mut graph = AudioGraphManager::new(platform.clone(), SoundParams::default());
    let mut timer = MeditationTimer::new(30).unwrap();

    assert_eq!(graph.configure(SoundProfile::Rain).unwrap(), SetupStatus::Pending);
    timer.start(&gate, &mut graph).unwrap();
    assert!(graph.is_start_queued());
    assert!(!graph.is_sound_playing());

    platform.render(128 * 8);
    graph.poll().unwrap();
    assert!(graph.is_sound_playing());
}

// === Offline Rendering ===

fn play(profile: SoundProfile) -> (OfflinePlatform, AudioGraphManager<OfflinePlatform>) {
    let platform = running_platform();
    let mut graph = AudioGraphManager::new(platform.clone(), SoundParams::default());
    graph.configure(profile).unwrap();
    graph.start().unwrap();
    (platform, graph)
}

#[test_case(SoundProfile::Drone ; "drone")]
#[test_case(SoundProfile::Rain ; "rain")]
fn test_playing_sound_is_audible(profile: SoundProfile) {
    let (platform, _graph) = play(profile);
    let out = platform.render_secs(1.0);
    assert!(!out.is_silent());
    assert!(out.is_finite());
    assert!(out.channel(0).iter().all(|s| s.abs() <= 1.0));
}

#[test]
fn test_suspended_context_is_silent() {
    let (platform, graph) = play(SoundProfile::Rain);
    platform.suspend();
    assert!(platform.render_secs(0.5).is_silent());
    assert!(graph.is_sound_playing());
}

#[test]
fn test_reverb_tail_after_stop() {
    let (platform, mut graph) = play(SoundProfile::Rain);
    platform.render_secs(1.0);

    graph.stop().unwrap();
    let tail = platform.render_secs(0.25);
    assert!(!tail.is_silent(), "reverb should ring out after the noise stops");
}

#[test]
fn test_drone_release_fades_out() {
    let (platform, mut graph) = play(SoundProfile::Drone);
    platform.render_secs(2.5);

    graph.stop().unwrap();
    // Release is 2 s, then the reverb decays
    platform.render_secs(30.0);
    assert!(platform.render_secs(0.5).is_silent());
}
