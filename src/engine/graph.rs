//! Calming sound graph
//!
//! Owns the synthesis nodes for the selected sound and their lifecycle:
//!
//! ```text
//! Drone:  PolySynth ---------------> Reverb -> Destination
//! Rain:   Noise -> LowPass --------> Reverb -> Destination
//! ```
//!
//! At most one source chain exists at a time. The reverb is created on the
//! first `configure` and shared by every chain until `shutdown`. Reverb
//! generation can be asynchronous; until it completes the chain stays
//! pending and a `start` is queued rather than dropped.

use super::profile::SoundProfile;
use super::timer::SoundControl;
use crate::config::SoundParams;
use crate::error::{MeditationError, Result};
use crate::platform::{AudioPlatform, NodeCommand, NodeId, NodeSpec, PlatformError, Sink};

/// Where the source chain is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    /// No chain configured
    Unconfigured,
    /// Waiting for the reverb to finish generating
    Pending,
    /// Chain built and connected
    Ready,
}

/// Result of `AudioGraphManager::start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Sound was already playing; nothing was sent
    AlreadyPlaying,
    /// Setup is still in flight; the sound starts once it completes
    Queued,
}

#[derive(Debug)]
struct ReverbSlot {
    node: NodeId,
    generated: bool,
    /// Released by `shutdown` while still generating; disposed once ready
    doomed: bool,
}

#[derive(Debug)]
struct SourceChain {
    profile: SoundProfile,
    source: NodeId,
    filter: Option<NodeId>,
    chord: Vec<f32>,
    playing: bool,
}

#[derive(Debug)]
enum Setup {
    Empty,
    Pending {
        profile: SoundProfile,
        start_queued: bool,
    },
    Ready(SourceChain),
}

/// Lifecycle manager for the calming sound nodes
#[derive(Debug)]
pub struct AudioGraphManager<P: AudioPlatform> {
    platform: P,
    params: SoundParams,
    reverb: Option<ReverbSlot>,
    setup: Setup,
    shut_down: bool,
}

impl<P: AudioPlatform> AudioGraphManager<P> {
    pub fn new(platform: P, params: SoundParams) -> Self {
        Self {
            platform,
            params,
            reverb: None,
            setup: Setup::Empty,
            shut_down: false,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Build the chain for `profile`, replacing any existing one
    ///
    /// The platform must be running. A playing chain is stopped and disposed
    /// first; the new chain is never started implicitly.
    pub fn configure(&mut self, profile: SoundProfile) -> Result<SetupStatus> {
        if self.shut_down {
            return Err(MeditationError::GraphInit {
                reason: "audio graph has been shut down".to_string(),
            });
        }
        if !self.platform.is_running() {
            log::warn!("Cannot configure {} before audio is unlocked", profile);
            return Err(MeditationError::GraphInit {
                reason: format!(
                    "audio context is {}; unlock audio first",
                    self.platform.current_state()
                ),
            });
        }

        self.dispose();
        self.ensure_reverb()?;

        if self.reverb_generated() {
            self.build(profile)?;
            Ok(SetupStatus::Ready)
        } else {
            log::debug!("Reverb still generating; {} setup pending", profile);
            self.setup = Setup::Pending {
                profile,
                start_queued: false,
            };
            Ok(SetupStatus::Pending)
        }
    }

    /// Complete asynchronous work
    ///
    /// Finishes a pending setup once the reverb is generated (starting the
    /// sound if a start was queued) and releases a reverb that `shutdown`
    /// left behind mid-generation.
    pub fn poll(&mut self) -> Result<SetupStatus> {
        self.collect_doomed_reverb();

        if let Setup::Pending {
            profile,
            start_queued,
        } = self.setup
        {
            if self.reverb_generated() {
                log::debug!("Reverb generated; finishing {} setup", profile);
                self.build(profile)?;
                if start_queued {
                    self.start()?;
                }
            }
        }
        Ok(self.setup_status())
    }

    /// Start the calming sound
    pub fn start(&mut self) -> Result<StartOutcome> {
        let running = self.platform.is_running();
        match &mut self.setup {
            Setup::Empty => Err(MeditationError::GraphInit {
                reason: "Sound not initialized".to_string(),
            }),
            Setup::Pending { start_queued, .. } => {
                *start_queued = true;
                log::debug!("Start queued until setup completes");
                Ok(StartOutcome::Queued)
            }
            Setup::Ready(chain) => {
                if chain.playing {
                    return Ok(StartOutcome::AlreadyPlaying);
                }
                if !running {
                    log::warn!("Cannot start {}: audio context not running", chain.profile);
                    return Err(MeditationError::NotReady);
                }

                let command = match chain.profile {
                    SoundProfile::Drone => NodeCommand::TriggerAttack(chain.chord.clone()),
                    SoundProfile::Rain => NodeCommand::Start,
                };
                self.platform.send(chain.source, command).map_err(|err| {
                    log::warn!("Failed to start {}: {}", chain.profile, err);
                    MeditationError::from(err)
                })?;
                chain.playing = true;
                log::info!("Playing {}", chain.profile.display_name());
                Ok(StartOutcome::Started)
            }
        }
    }

    /// Stop the calming sound; idempotent
    ///
    /// The drone enters its release phase, so its tail keeps sounding
    /// through the reverb.
    pub fn stop(&mut self) -> Result<()> {
        match &mut self.setup {
            Setup::Empty => Ok(()),
            Setup::Pending { start_queued, .. } => {
                *start_queued = false;
                Ok(())
            }
            Setup::Ready(chain) => {
                if !chain.playing {
                    return Ok(());
                }
                chain.playing = false;
                let command = match chain.profile {
                    SoundProfile::Drone => NodeCommand::ReleaseAll,
                    SoundProfile::Rain => NodeCommand::Stop,
                };
                self.platform.send(chain.source, command).map_err(|err| {
                    log::warn!("Failed to stop {}: {}", chain.profile, err);
                    MeditationError::from(err)
                })?;
                log::debug!("Stopped {}", chain.profile);
                Ok(())
            }
        }
    }

    /// Release the source chain; the shared reverb stays alive
    ///
    /// Cancels an in-flight setup. Safe to call at any time.
    pub fn dispose(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("Error stopping sound during dispose: {}", err);
        }

        match std::mem::replace(&mut self.setup, Setup::Empty) {
            Setup::Empty => {}
            Setup::Pending { profile, .. } => {
                log::debug!("Cancelled pending {} setup", profile);
            }
            Setup::Ready(chain) => {
                self.release_node(chain.source);
                if let Some(filter) = chain.filter {
                    self.release_node(filter);
                }
                log::debug!("Disposed {} chain", chain.profile);
            }
        }
    }

    /// Final teardown, including the shared reverb
    ///
    /// A reverb that is still generating is disposed as soon as it is ready,
    /// observed by `poll()`.
    pub fn shutdown(&mut self) {
        self.dispose();
        self.shut_down = true;

        let Some(slot) = self.reverb.as_mut() else {
            return;
        };
        if slot.doomed {
            return;
        }

        let generated = slot.generated
            || self.platform.poll_ready(slot.node).unwrap_or(true);
        if generated {
            let node = slot.node;
            self.reverb = None;
            self.release_node(node);
            log::info!("Audio graph shut down");
        } else {
            slot.doomed = true;
            log::debug!("Reverb {} still generating; disposal deferred", slot.node);
        }
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn is_sound_playing(&self) -> bool {
        matches!(&self.setup, Setup::Ready(chain) if chain.playing)
    }

    /// Profile of the configured (or pending) chain
    pub fn active_profile(&self) -> Option<SoundProfile> {
        match &self.setup {
            Setup::Empty => None,
            Setup::Pending { profile, .. } => Some(*profile),
            Setup::Ready(chain) => Some(chain.profile),
        }
    }

    pub fn setup_status(&self) -> SetupStatus {
        match self.setup {
            Setup::Empty => SetupStatus::Unconfigured,
            Setup::Pending { .. } => SetupStatus::Pending,
            Setup::Ready(_) => SetupStatus::Ready,
        }
    }

    /// Whether the shared reverb exists and is not scheduled for disposal
    pub fn has_reverb(&self) -> bool {
        self.reverb.as_ref().is_some_and(|slot| !slot.doomed)
    }

    /// Whether a start is waiting for setup to complete
    pub fn is_start_queued(&self) -> bool {
        matches!(self.setup, Setup::Pending { start_queued: true, .. })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_reverb(&mut self) -> Result<()> {
        if self.reverb.is_some() {
            return Ok(());
        }

        let node = self
            .platform
            .create_node(NodeSpec::Reverb(self.params.reverb.clone()))
            .map_err(graph_error)?;
        if let Err(err) = self.platform.connect(node, Sink::Destination) {
            self.release_node(node);
            return Err(graph_error(err));
        }

        log::info!("Created shared reverb {}", node);
        self.reverb = Some(ReverbSlot {
            node,
            generated: false,
            doomed: false,
        });
        Ok(())
    }

    /// Refresh and report whether the reverb finished generating
    fn reverb_generated(&mut self) -> bool {
        let Some(slot) = self.reverb.as_mut() else {
            return false;
        };
        if !slot.generated {
            slot.generated = self.platform.poll_ready(slot.node).unwrap_or(false);
        }
        slot.generated
    }

    fn collect_doomed_reverb(&mut self) {
        let node = match &self.reverb {
            Some(slot) if slot.doomed => slot.node,
            _ => return,
        };
        // An unknown node counts as ready: there is nothing left to wait for
        if self.platform.poll_ready(node).unwrap_or(true) {
            self.reverb = None;
            self.release_node(node);
            log::debug!("Released deferred reverb {}", node);
        }
    }

    fn build(&mut self, profile: SoundProfile) -> Result<()> {
        let Some(reverb) = self.reverb.as_ref().map(|slot| slot.node) else {
            return Err(MeditationError::GraphInit {
                reason: "reverb missing".to_string(),
            });
        };

        let chain = match profile {
            SoundProfile::Drone => self.build_drone(reverb),
            SoundProfile::Rain => self.build_rain(reverb),
        };

        match chain {
            Ok(chain) => {
                log::info!("Configured {}", profile.display_name());
                self.setup = Setup::Ready(chain);
                Ok(())
            }
            Err(err) => {
                log::warn!("Failed to build {} chain: {}", profile, err);
                self.setup = Setup::Empty;
                Err(err)
            }
        }
    }

    fn build_drone(&mut self, reverb: NodeId) -> Result<SourceChain> {
        let chord = self.params.drone.chord_frequencies().map_err(|err| {
            MeditationError::GraphInit {
                reason: err.to_string(),
            }
        })?;

        let synth = self
            .platform
            .create_node(NodeSpec::PolySynth(self.params.drone.clone()))
            .map_err(graph_error)?;
        if let Err(err) = self.platform.connect(synth, Sink::Node(reverb)) {
            self.release_node(synth);
            return Err(graph_error(err));
        }

        Ok(SourceChain {
            profile: SoundProfile::Drone,
            source: synth,
            filter: None,
            chord,
            playing: false,
        })
    }

    fn build_rain(&mut self, reverb: NodeId) -> Result<SourceChain> {
        let filter = self
            .platform
            .create_node(NodeSpec::LowPass {
                cutoff_hz: self.params.rain.cutoff_hz,
                q: self.params.rain.q,
            })
            .map_err(graph_error)?;

        let noise = match self.platform.create_node(NodeSpec::Noise(self.params.rain.clone())) {
            Ok(noise) => noise,
            Err(err) => {
                self.release_node(filter);
                return Err(graph_error(err));
            }
        };

        let wired = self
            .platform
            .connect(filter, Sink::Node(reverb))
            .and_then(|_| self.platform.connect(noise, Sink::Node(filter)));
        if let Err(err) = wired {
            self.release_node(noise);
            self.release_node(filter);
            return Err(graph_error(err));
        }

        Ok(SourceChain {
            profile: SoundProfile::Rain,
            source: noise,
            filter: Some(filter),
            chord: Vec::new(),
            playing: false,
        })
    }

    fn release_node(&self, node: NodeId) {
        if let Err(err) = self.platform.dispose(node) {
            log::warn!("Failed to dispose node {}: {}", node, err);
        }
    }
}

impl<P: AudioPlatform> SoundControl for AudioGraphManager<P> {
    fn start_sound(&mut self) -> Result<()> {
        self.start().map(|_| ())
    }

    fn stop_sound(&mut self) -> Result<()> {
        self.stop()
    }
}

impl<P: AudioPlatform> Drop for AudioGraphManager<P> {
    fn drop(&mut self) {
        self.shutdown();
        // Nobody will poll any more; release a generating reverb right away
        if let Some(slot) = self.reverb.take() {
            self.release_node(slot.node);
        }
    }
}

fn graph_error(err: PlatformError) -> MeditationError {
    MeditationError::GraphInit {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Activation, AutoplayPolicy, NodeKind, OfflinePlatform};
    use pretty_assertions::assert_eq;

    fn running_platform() -> OfflinePlatform {
        let platform = OfflinePlatform::new(48000).with_policy(AutoplayPolicy::Allowed);
        platform.resume_or_start(Activation::None).unwrap();
        platform
    }

    fn manager(platform: &OfflinePlatform) -> AudioGraphManager<OfflinePlatform> {
        AudioGraphManager::new(platform.clone(), SoundParams::default())
    }

    fn kinds(platform: &OfflinePlatform) -> Vec<NodeKind> {
        platform.live_nodes().into_iter().map(|(_, kind)| kind).collect()
    }

    #[test]
    fn test_configure_requires_running_platform() {
        let platform = OfflinePlatform::new(48000);
        let mut graph = manager(&platform);
        let err = graph.configure(SoundProfile::Drone).unwrap_err();
        assert_eq!(err.error_code(), "GRAPH_INIT");
        assert_eq!(platform.live_node_count(), 0);
    }

    #[test]
    fn test_configure_drone() {
        let platform = running_platform();
        let mut graph = manager(&platform);

        assert_eq!(graph.configure(SoundProfile::Drone).unwrap(), SetupStatus::Ready);
        assert_eq!(graph.active_profile(), Some(SoundProfile::Drone));
        assert!(graph.has_reverb());
        assert!(!graph.is_sound_playing());
        assert_eq!(kinds(&platform), vec![NodeKind::Reverb, NodeKind::PolySynth]);
    }

    #[test]
    fn test_configure_rain_routes_through_filter() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Rain).unwrap();

        let nodes = platform.live_nodes();
        let find = |kind| nodes.iter().find(|(_, k)| *k == kind).map(|(id, _)| *id).unwrap();
        let reverb = find(NodeKind::Reverb);
        let filter = find(NodeKind::LowPass);
        let noise = find(NodeKind::Noise);

        assert_eq!(platform.sink_of(reverb), Some(Sink::Destination));
        assert_eq!(platform.sink_of(filter), Some(Sink::Node(reverb)));
        assert_eq!(platform.sink_of(noise), Some(Sink::Node(filter)));
    }

    #[test]
    fn test_dispose_keeps_reverb() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Rain).unwrap();
        graph.start().unwrap();

        graph.dispose();
        assert!(graph.has_reverb());
        assert_eq!(graph.setup_status(), SetupStatus::Unconfigured);
        assert_eq!(kinds(&platform), vec![NodeKind::Reverb]);
    }

    #[test]
    fn test_switch_while_playing_does_not_start_new_chain() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Drone).unwrap();
        assert_eq!(graph.start().unwrap(), StartOutcome::Started);

        graph.configure(SoundProfile::Rain).unwrap();
        assert!(!graph.is_sound_playing());
        assert_eq!(
            kinds(&platform),
            vec![NodeKind::Reverb, NodeKind::LowPass, NodeKind::Noise]
        );
    }

    #[test]
    fn test_reverb_created_once() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        for profile in [SoundProfile::Drone, SoundProfile::Rain, SoundProfile::Drone] {
            graph.configure(profile).unwrap();
        }
        let reverbs = kinds(&platform)
            .into_iter()
            .filter(|kind| *kind == NodeKind::Reverb)
            .count();
        assert_eq!(reverbs, 1);
    }

    #[test]
    fn test_start_without_configure() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        let err = graph.start().unwrap_err();
        assert!(err.friendly_message().contains("Sound not initialized"));
    }

    #[test]
    fn test_start_is_idempotent() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Drone).unwrap();
        assert_eq!(graph.start().unwrap(), StartOutcome::Started);
        assert_eq!(graph.start().unwrap(), StartOutcome::AlreadyPlaying);
    }

    #[test]
    fn test_start_on_suspended_platform() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Drone).unwrap();
        platform.suspend();
        assert!(matches!(graph.start(), Err(MeditationError::NotReady)));
        assert!(!graph.is_sound_playing());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        graph.stop().unwrap();
        graph.configure(SoundProfile::Rain).unwrap();
        graph.start().unwrap();
        graph.stop().unwrap();
        graph.stop().unwrap();
        assert!(!graph.is_sound_playing());
    }

    #[test]
    fn test_queued_start_runs_after_reverb_generation() {
        let platform = running_platform().with_reverb_latency(2);
        let mut graph = manager(&platform);

        assert_eq!(graph.configure(SoundProfile::Drone).unwrap(), SetupStatus::Pending);
        assert_eq!(graph.start().unwrap(), StartOutcome::Queued);
        assert!(graph.is_start_queued());
        assert_eq!(graph.poll().unwrap(), SetupStatus::Pending);

        platform.settle();
        assert_eq!(graph.poll().unwrap(), SetupStatus::Ready);
        assert!(graph.is_sound_playing());
    }

    #[test]
    fn test_stop_cancels_queued_start() {
        let platform = running_platform().with_reverb_latency(2);
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Rain).unwrap();
        graph.start().unwrap();
        graph.stop().unwrap();

        platform.settle();
        graph.poll().unwrap();
        assert_eq!(graph.setup_status(), SetupStatus::Ready);
        assert!(!graph.is_sound_playing());
    }

    #[test]
    fn test_dispose_cancels_pending_setup() {
        let platform = running_platform().with_reverb_latency(2);
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Drone).unwrap();
        graph.dispose();

        platform.settle();
        assert_eq!(graph.poll().unwrap(), SetupStatus::Unconfigured);
        assert_eq!(kinds(&platform), vec![NodeKind::Reverb]);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let platform = running_platform();
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Rain).unwrap();
        graph.start().unwrap();

        graph.shutdown();
        assert!(!graph.has_reverb());
        assert_eq!(platform.live_node_count(), 0);
        assert!(graph.configure(SoundProfile::Drone).is_err());
    }

    #[test]
    fn test_shutdown_mid_generation_defers_reverb_disposal() {
        let platform = running_platform().with_reverb_latency(4);
        let mut graph = manager(&platform);
        graph.configure(SoundProfile::Drone).unwrap();

        graph.shutdown();
        assert!(!graph.has_reverb());
        assert_eq!(kinds(&platform), vec![NodeKind::Reverb]);

        platform.settle();
        graph.poll().unwrap();
        assert_eq!(platform.live_node_count(), 0);
    }

    #[test]
    fn test_drop_releases_nodes() {
        let platform = running_platform().with_reverb_latency(4);
        {
            let mut graph = manager(&platform);
            graph.configure(SoundProfile::Rain).unwrap();
        }
        assert_eq!(platform.live_node_count(), 0);
    }
}
