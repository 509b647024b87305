//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command. Everything runs on the
//! offline platform, so sessions are deterministic and need no sound card.

use std::path::Path;
use std::time::Duration;

use log::info;

use crate::config::MeditationConfig;
use crate::engine::{
    calculate_peak, calculate_rms, export_audio, AudioBuffer, AudioContextGate, AudioGraphManager,
    ChannelLayout, ExportFormat, MeditationSession, MeditationTimer, SessionSnapshot, SoundProfile,
    TimerPhase,
};
use crate::error::{MeditationError, Result};
use crate::platform::{OfflinePlatform, UserGesture};

/// Countdown resolution used while rendering
const RENDER_STEP: Duration = Duration::from_millis(100);

/// Render a meditation's calming sound to a WAV file
///
/// Returns the rendered audio so callers can inspect it.
pub fn render(
    config: &MeditationConfig,
    output: &Path,
    sound: Option<SoundProfile>,
    seconds: u32,
    tail_secs: f32,
    bit_depth: u16,
) -> Result<AudioBuffer> {
    let format = ExportFormat::new(bit_depth)?;
    let profile = sound.unwrap_or(config.default_profile);
    info!(
        "Rendering {}s of {} to {}",
        seconds,
        profile.display_name(),
        output.display()
    );

    let platform = OfflinePlatform::new(config.sample_rate);
    let mut gate = AudioContextGate::new(platform.clone());
    gate.handle_gesture(UserGesture::Click)?;

    let mut graph = AudioGraphManager::new(platform.clone(), config.sound.clone());
    graph.configure(profile)?;

    let mut timer = MeditationTimer::new(seconds)?;
    timer.start(&gate, &mut graph)?;

    let step_frames = (config.sample_rate as f64 * RENDER_STEP.as_secs_f64()).round() as usize;
    let mut rendered = AudioBuffer::new(0, ChannelLayout::Mono, config.sample_rate);
    while timer.phase() == TimerPhase::Running {
        graph.poll()?;
        rendered.append(&platform.render(step_frames));
        timer.advance(RENDER_STEP, &mut graph);
    }
    rendered.append(&platform.render_secs(tail_secs.max(0.0)));
    graph.shutdown();

    rendered.clamp();
    export_audio(&rendered, output, format)?;

    println!("Rendered: {}", output.display());
    println!("  Sound:    {}", profile.display_name());
    println!("  Length:   {:.1}s", rendered.duration_secs());
    println!("  Peak:     {:.1} dBFS", calculate_peak(&rendered));
    println!("  RMS:      {:.1} dBFS", calculate_rms(&rendered));

    Ok(rendered)
}

/// Options for a simulated session
#[derive(Debug, Clone, Default)]
pub struct SimulateOptions {
    pub minutes: Option<u32>,
    pub sound: Option<SoundProfile>,
    pub pause_at: Option<u32>,
    pub pause_for: u32,
}

/// Run a session second by second, printing every status change
///
/// Returns the timeline lines and the final snapshot.
pub fn simulate(
    config: &MeditationConfig,
    options: &SimulateOptions,
) -> Result<(Vec<String>, SessionSnapshot)> {
    let platform = OfflinePlatform::new(config.sample_rate);
    let mut session = MeditationSession::new(platform.clone(), config)?;
    let mut timeline = Vec::new();
    let mut last_status = None;
    let mut elapsed = 0u32;

    let mut record = |session: &MeditationSession<OfflinePlatform>, elapsed: u32| {
        let snapshot = session.snapshot();
        let text = snapshot.status.as_ref().map(|status| status.text.clone());
        if text.is_some() && text != last_status {
            let line = format!(
                "[{:02}:{:02}] {} {}",
                elapsed / 60,
                elapsed % 60,
                snapshot.display,
                text.clone().unwrap_or_default()
            );
            println!("{}", line);
            timeline.push(line);
            last_status = text;
        }
    };

    // An unready start shows the interaction prompt
    match session.start() {
        Err(MeditationError::NotReady) => info!("Start before unlock refused as expected"),
        result => result?,
    }
    record(&session, elapsed);

    session.handle_gesture(UserGesture::Click);
    if let Some(profile) = options.sound {
        session.select_profile(profile)?;
        record(&session, elapsed);
    }
    if let Some(minutes) = options.minutes {
        session.set_duration_minutes(minutes)?;
    }

    session.start()?;
    record(&session, elapsed);

    let mut meditated = 0u32;
    let mut paused_for = 0u32;
    loop {
        let phase = session.timer().phase();
        if phase == TimerPhase::Complete {
            break;
        }

        if phase == TimerPhase::Running && options.pause_at == Some(meditated) && paused_for == 0 {
            session.pause()?;
            record(&session, elapsed);
        } else if phase == TimerPhase::Paused {
            if paused_for >= options.pause_for {
                session.start()?;
                record(&session, elapsed);
                // Mark the pause as done so it is not repeated
                paused_for = u32::MAX;
            } else {
                paused_for += 1;
            }
        }

        platform.render_secs(1.0);
        if session.advance(Duration::from_secs(1)) == TimerPhase::Running
            || session.timer().phase() == TimerPhase::Complete
        {
            meditated += 1;
        }
        elapsed += 1;
        record(&session, elapsed);
    }

    let snapshot = session.snapshot();
    session.shutdown();
    Ok((timeline, snapshot))
}

/// List the calming sounds
pub fn list_profiles() {
    println!("Calming sounds:");
    println!("{:-<60}", "");
    for profile in SoundProfile::ALL {
        println!(
            "  {:<8} {:<16} {}",
            profile.to_string(),
            profile.display_name(),
            profile.recipe()
        );
    }
}

/// Print the default configuration
pub fn print_default_config() -> Result<()> {
    println!("{}", MeditationConfig::default().to_json_pretty()?);
    Ok(())
}
