//! Audio Platform Abstraction
//!
//! The meditation engine never talks to an audio device directly. Everything it
//! needs from the outside world goes through [`AudioPlatform`]:
//! - context state and resume/start (autoplay unlock)
//! - node factories for tone generators, noise, filters and reverb
//! - wiring nodes to each other or to the destination
//! - per-node commands (attack, release, start, stop) and disposal
//!
//! Platform handles are cheap clones over shared single-threaded state, the
//! same way a browser audio context is shared by everything on a page.

pub mod offline;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DroneParams, RainParams, ReverbParams};

pub use offline::{AutoplayPolicy, OfflinePlatform};

/// Result alias for platform calls
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Errors reported by an audio platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform refused to start audio: {reason}")]
    Refused { reason: String },

    #[error("audio context is closed")]
    Closed,

    #[error("unknown audio node {0}")]
    UnknownNode(NodeId),

    #[error("unsupported operation: {what}")]
    Unsupported { what: String },
}

/// State of the platform audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Created but not producing sound (no user gesture yet)
    #[default]
    Suspended,
    /// Producing sound
    Running,
    /// Permanently shut down
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextState::Suspended => write!(f, "suspended"),
            ContextState::Running => write!(f, "running"),
            ContextState::Closed => write!(f, "closed"),
        }
    }
}

/// Result of asking the platform to resume its audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The context is running now
    Running,
    /// The request was accepted and will complete later
    Pending,
}

/// User interactions that count as activation for the autoplay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserGesture {
    Click,
    Touch,
    Key,
}

impl fmt::Display for UserGesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserGesture::Click => write!(f, "click"),
            UserGesture::Touch => write!(f, "touchstart"),
            UserGesture::Key => write!(f, "keydown"),
        }
    }
}

/// Whether a resume request happens inside a user gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Gesture(UserGesture),
    None,
}

impl Activation {
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, Activation::Gesture(_))
    }
}

/// Opaque handle to a node owned by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node recipes the engine can request
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    /// Polyphonic AM synth used for the drone chord
    PolySynth(DroneParams),
    /// Broadband noise source
    Noise(RainParams),
    /// Low-pass filter at the given cutoff
    LowPass { cutoff_hz: f32, q: f32 },
    /// Reverb; may need asynchronous generation before it is usable
    Reverb(ReverbParams),
}

impl NodeSpec {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSpec::PolySynth(_) => NodeKind::PolySynth,
            NodeSpec::Noise(_) => NodeKind::Noise,
            NodeSpec::LowPass { .. } => NodeKind::LowPass,
            NodeSpec::Reverb(_) => NodeKind::Reverb,
        }
    }
}

/// Coarse node classification for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    PolySynth,
    Noise,
    LowPass,
    Reverb,
}

/// Where a node's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Node(NodeId),
    Destination,
}

/// Commands sent to source nodes
#[derive(Debug, Clone, PartialEq)]
pub enum NodeCommand {
    /// Start the attack phase for every frequency (Hz)
    TriggerAttack(Vec<f32>),
    /// Enter the release phase for all sounding voices
    ReleaseAll,
    /// Start a free-running source (noise)
    Start,
    /// Stop a free-running source
    Stop,
}

/// Platform audio output as seen by the meditation engine
pub trait AudioPlatform {
    /// Current state of the audio context
    fn current_state(&self) -> ContextState;

    /// Resume (or start) the audio context
    ///
    /// Platforms with an autoplay policy refuse unless the call happens inside
    /// a user gesture.
    fn resume_or_start(&self, activation: Activation) -> PlatformResult<ResumeOutcome>;

    /// Create a node from a recipe
    fn create_node(&self, spec: NodeSpec) -> PlatformResult<NodeId>;

    /// Route a node's output
    fn connect(&self, node: NodeId, sink: Sink) -> PlatformResult<()>;

    /// Send a command to a source node
    fn send(&self, node: NodeId, command: NodeCommand) -> PlatformResult<()>;

    /// Whether a node has finished any asynchronous setup
    fn poll_ready(&self, node: NodeId) -> PlatformResult<bool>;

    /// Release a node and everything it holds
    fn dispose(&self, node: NodeId) -> PlatformResult<()>;

    fn is_running(&self) -> bool {
        self.current_state() == ContextState::Running
    }
}
