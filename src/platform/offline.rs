//! Offline (software) audio platform
//!
//! A deterministic audio context that renders the synthesis graph into
//! buffers instead of a sound card. It simulates what a browser audio context
//! does to the engine:
//! - an autoplay policy that refuses to start without a user gesture
//! - resume and reverb generation that complete some render blocks later
//! - node ownership, so leaked nodes show up in `live_nodes()`
//!
//! Rendering is block based (128 frames, the web audio render quantum).
//! The graph is feed-forward by node kind: sources, then filters, then
//! reverbs, then the destination.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{
    Activation, AudioPlatform, ContextState, NodeCommand, NodeId, NodeKind, NodeSpec,
    PlatformError, PlatformResult, ResumeOutcome, Sink,
};
use crate::dsp::{LowPassFilter, PolySynth, Reverb, WhiteNoise};
use crate::engine::{AudioBuffer, DEFAULT_SAMPLE_RATE};

/// Frames rendered per block
pub const BLOCK_SIZE: usize = 128;

/// How the context reacts to resume requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayPolicy {
    /// Resume always succeeds
    Allowed,
    /// Resume succeeds only inside a user gesture
    #[default]
    RequiresGesture,
    /// Resume always fails
    Blocked,
}

enum Processor {
    PolySynth(PolySynth),
    Noise(WhiteNoise),
    LowPass(LowPassFilter),
    Reverb {
        reverb: Box<Reverb>,
        blocks_until_ready: u32,
    },
}

struct OfflineNode {
    kind: NodeKind,
    sink: Option<Sink>,
    processor: Processor,
    input: Vec<f32>,
}

impl OfflineNode {
    fn render(&mut self, block: &mut [f32]) {
        match &mut self.processor {
            Processor::PolySynth(synth) => {
                for sample in block.iter_mut() {
                    *sample = synth.next_sample();
                }
            }
            Processor::Noise(noise) => {
                for sample in block.iter_mut() {
                    *sample = noise.next_sample();
                }
            }
            Processor::LowPass(filter) => {
                for (sample, input) in block.iter_mut().zip(&self.input) {
                    *sample = filter.process(*input);
                }
            }
            Processor::Reverb {
                reverb,
                blocks_until_ready,
            } => {
                if *blocks_until_ready > 0 {
                    block.fill(0.0);
                } else {
                    block.copy_from_slice(&self.input[..block.len()]);
                    reverb.process_block(block);
                }
            }
        }
    }

    fn is_active(&self) -> bool {
        match &self.processor {
            Processor::PolySynth(synth) => synth.active_voices() > 0,
            Processor::Noise(noise) => noise.is_running(),
            _ => false,
        }
    }
}

fn render_rank(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::PolySynth | NodeKind::Noise => 0,
        NodeKind::LowPass => 1,
        NodeKind::Reverb => 2,
    }
}

struct OfflineContext {
    sample_rate: u32,
    state: ContextState,
    policy: AutoplayPolicy,
    resume_latency_blocks: u32,
    reverb_latency_blocks: u32,
    pending_resume: Option<u32>,
    next_id: u64,
    nodes: BTreeMap<NodeId, OfflineNode>,
    resume_calls: u32,
}

impl OfflineContext {
    fn node_mut(&mut self, id: NodeId) -> PlatformResult<&mut OfflineNode> {
        self.nodes.get_mut(&id).ok_or(PlatformError::UnknownNode(id))
    }

    /// Progress resume and reverb generation by one block
    fn advance_pending(&mut self) {
        if let Some(remaining) = self.pending_resume {
            if remaining <= 1 {
                self.pending_resume = None;
                if self.state == ContextState::Suspended {
                    self.state = ContextState::Running;
                    log::debug!("Offline context resumed");
                }
            } else {
                self.pending_resume = Some(remaining - 1);
            }
        }

        for node in self.nodes.values_mut() {
            if let Processor::Reverb {
                blocks_until_ready, ..
            } = &mut node.processor
            {
                *blocks_until_ready = blocks_until_ready.saturating_sub(1);
            }
        }
    }

    fn render_block(&mut self, out: &mut [f32]) {
        for node in self.nodes.values_mut() {
            node.input.clear();
            node.input.resize(out.len(), 0.0);
        }

        let mut order: Vec<(u8, NodeId)> = self
            .nodes
            .iter()
            .map(|(id, node)| (render_rank(node.kind), *id))
            .collect();
        order.sort();

        let mut block = vec![0.0; out.len()];
        for (_, id) in order {
            let sink = match self.nodes.get_mut(&id) {
                Some(node) => {
                    node.render(&mut block);
                    node.sink
                }
                None => continue,
            };

            match sink {
                Some(Sink::Destination) => mix_into(out, &block),
                Some(Sink::Node(target)) => {
                    if let Some(target) = self.nodes.get_mut(&target) {
                        mix_into(&mut target.input, &block);
                    }
                }
                None => {}
            }
        }
    }
}

fn mix_into(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s;
    }
}

/// Shared handle to an offline audio context
#[derive(Clone)]
pub struct OfflinePlatform {
    inner: Rc<RefCell<OfflineContext>>,
}

impl std::fmt::Debug for OfflinePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctx = self.inner.borrow();
        f.debug_struct("OfflinePlatform")
            .field("sample_rate", &ctx.sample_rate)
            .field("state", &ctx.state)
            .field("policy", &ctx.policy)
            .field("live_nodes", &ctx.nodes.len())
            .finish()
    }
}

impl Default for OfflinePlatform {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl OfflinePlatform {
    /// Suspended context with a gesture-gated autoplay policy
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Rc::new(RefCell::new(OfflineContext {
                sample_rate,
                state: ContextState::Suspended,
                policy: AutoplayPolicy::default(),
                resume_latency_blocks: 0,
                reverb_latency_blocks: 0,
                pending_resume: None,
                next_id: 1,
                nodes: BTreeMap::new(),
                resume_calls: 0,
            })),
        }
    }

    pub fn with_policy(self, policy: AutoplayPolicy) -> Self {
        self.inner.borrow_mut().policy = policy;
        self
    }

    /// Accepted resumes complete after this many render blocks
    pub fn with_resume_latency(self, blocks: u32) -> Self {
        self.inner.borrow_mut().resume_latency_blocks = blocks;
        self
    }

    /// Reverbs finish generating after this many render blocks
    pub fn with_reverb_latency(self, blocks: u32) -> Self {
        self.inner.borrow_mut().reverb_latency_blocks = blocks;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.borrow().sample_rate
    }

    pub fn set_policy(&self, policy: AutoplayPolicy) {
        self.inner.borrow_mut().policy = policy;
    }

    /// Number of resume requests received so far
    pub fn resume_calls(&self) -> u32 {
        self.inner.borrow().resume_calls
    }

    /// Interrupt a running context (e.g. the OS took the audio device)
    pub fn suspend(&self) {
        let mut ctx = self.inner.borrow_mut();
        if ctx.state == ContextState::Running {
            ctx.state = ContextState::Suspended;
        }
    }

    /// Close the context for good
    pub fn close(&self) {
        let mut ctx = self.inner.borrow_mut();
        ctx.state = ContextState::Closed;
        ctx.pending_resume = None;
    }

    /// Complete every pending resume and reverb generation immediately
    pub fn settle(&self) {
        let mut ctx = self.inner.borrow_mut();
        if ctx.pending_resume.take().is_some() && ctx.state == ContextState::Suspended {
            ctx.state = ContextState::Running;
        }
        for node in ctx.nodes.values_mut() {
            if let Processor::Reverb {
                blocks_until_ready, ..
            } = &mut node.processor
            {
                *blocks_until_ready = 0;
            }
        }
    }

    /// Render `frames` of mono output
    ///
    /// A context that is not running produces silence but still advances
    /// pending resume and reverb generation.
    pub fn render(&self, frames: usize) -> AudioBuffer {
        let mut ctx = self.inner.borrow_mut();
        let mut output = vec![0.0_f32; frames];

        for chunk in output.chunks_mut(BLOCK_SIZE) {
            if ctx.state == ContextState::Running {
                ctx.render_block(chunk);
            }
            ctx.advance_pending();
        }

        AudioBuffer::from_mono(output, ctx.sample_rate)
    }

    /// Render whole seconds of output
    pub fn render_secs(&self, secs: f32) -> AudioBuffer {
        let frames = (secs * self.sample_rate() as f32).round() as usize;
        self.render(frames)
    }

    pub fn live_nodes(&self) -> Vec<(NodeId, NodeKind)> {
        self.inner
            .borrow()
            .nodes
            .iter()
            .map(|(id, node)| (*id, node.kind))
            .collect()
    }

    pub fn live_node_count(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        self.inner.borrow().nodes.get(&id).map(|node| node.kind)
    }

    /// Whether a source node is currently producing sound
    pub fn is_node_active(&self, id: NodeId) -> bool {
        self.inner
            .borrow()
            .nodes
            .get(&id)
            .map(OfflineNode::is_active)
            .unwrap_or(false)
    }

    pub fn sink_of(&self, id: NodeId) -> Option<Sink> {
        self.inner.borrow().nodes.get(&id).and_then(|node| node.sink)
    }
}

impl AudioPlatform for OfflinePlatform {
    fn current_state(&self) -> ContextState {
        self.inner.borrow().state
    }

    fn resume_or_start(&self, activation: Activation) -> PlatformResult<ResumeOutcome> {
        let mut ctx = self.inner.borrow_mut();
        ctx.resume_calls += 1;

        match ctx.state {
            ContextState::Closed => return Err(PlatformError::Closed),
            ContextState::Running => return Ok(ResumeOutcome::Running),
            ContextState::Suspended => {}
        }

        if ctx.pending_resume.is_some() {
            return Ok(ResumeOutcome::Pending);
        }

        match ctx.policy {
            AutoplayPolicy::Blocked => {
                return Err(PlatformError::Refused {
                    reason: "autoplay is blocked".to_string(),
                })
            }
            AutoplayPolicy::RequiresGesture if !activation.is_user_initiated() => {
                return Err(PlatformError::Refused {
                    reason: "no user activation".to_string(),
                })
            }
            _ => {}
        }

        if ctx.resume_latency_blocks == 0 {
            ctx.state = ContextState::Running;
            Ok(ResumeOutcome::Running)
        } else {
            ctx.pending_resume = Some(ctx.resume_latency_blocks);
            Ok(ResumeOutcome::Pending)
        }
    }

    fn create_node(&self, spec: NodeSpec) -> PlatformResult<NodeId> {
        let mut ctx = self.inner.borrow_mut();
        if ctx.state == ContextState::Closed {
            return Err(PlatformError::Closed);
        }

        let sample_rate = ctx.sample_rate;
        let kind = spec.kind();
        let processor = match spec {
            NodeSpec::PolySynth(params) => Processor::PolySynth(PolySynth::new(params, sample_rate)),
            NodeSpec::Noise(params) => Processor::Noise(WhiteNoise::new(params.volume_db, params.seed)),
            NodeSpec::LowPass { cutoff_hz, q } => {
                Processor::LowPass(LowPassFilter::new(cutoff_hz, q, sample_rate))
            }
            NodeSpec::Reverb(params) => Processor::Reverb {
                reverb: Box::new(Reverb::new(params, sample_rate)),
                blocks_until_ready: ctx.reverb_latency_blocks,
            },
        };

        let id = NodeId(ctx.next_id);
        ctx.next_id += 1;
        ctx.nodes.insert(
            id,
            OfflineNode {
                kind,
                sink: None,
                processor,
                input: Vec::with_capacity(BLOCK_SIZE),
            },
        );
        log::debug!("Created {:?} node {}", kind, id);
        Ok(id)
    }

    fn connect(&self, node: NodeId, sink: Sink) -> PlatformResult<()> {
        let mut ctx = self.inner.borrow_mut();
        if let Sink::Node(target) = sink {
            if !ctx.nodes.contains_key(&target) {
                return Err(PlatformError::UnknownNode(target));
            }
        }
        ctx.node_mut(node)?.sink = Some(sink);
        Ok(())
    }

    fn send(&self, node: NodeId, command: NodeCommand) -> PlatformResult<()> {
        let mut ctx = self.inner.borrow_mut();
        let target = ctx.node_mut(node)?;
        match (&mut target.processor, command) {
            (Processor::PolySynth(synth), NodeCommand::TriggerAttack(frequencies)) => {
                synth.trigger_attack(&frequencies)
            }
            (Processor::PolySynth(synth), NodeCommand::ReleaseAll) => synth.release_all(),
            (Processor::Noise(noise), NodeCommand::Start) => noise.start(),
            (Processor::Noise(noise), NodeCommand::Stop) => noise.stop(),
            (_, command) => {
                return Err(PlatformError::Unsupported {
                    what: format!("{:?} on {:?} node", command, target.kind),
                })
            }
        }
        Ok(())
    }

    fn poll_ready(&self, node: NodeId) -> PlatformResult<bool> {
        let ctx = self.inner.borrow();
        let target = ctx.nodes.get(&node).ok_or(PlatformError::UnknownNode(node))?;
        Ok(match target.processor {
            Processor::Reverb {
                blocks_until_ready, ..
            } => blocks_until_ready == 0,
            _ => true,
        })
    }

    fn dispose(&self, node: NodeId) -> PlatformResult<()> {
        let mut ctx = self.inner.borrow_mut();
        ctx.nodes
            .remove(&node)
            .ok_or(PlatformError::UnknownNode(node))?;

        // Anything routed into the disposed node is now disconnected
        for other in ctx.nodes.values_mut() {
            if other.sink == Some(Sink::Node(node)) {
                other.sink = None;
            }
        }
        log::debug!("Disposed node {}", node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DroneParams, RainParams, ReverbParams};
    use crate::platform::UserGesture;

    fn running_platform() -> OfflinePlatform {
        let platform = OfflinePlatform::new(48000).with_policy(AutoplayPolicy::Allowed);
        platform.resume_or_start(Activation::None).unwrap();
        platform
    }

    #[test]
    fn test_gesture_policy() {
        let platform = OfflinePlatform::new(48000);
        assert_eq!(platform.current_state(), ContextState::Suspended);

        let err = platform.resume_or_start(Activation::None).unwrap_err();
        assert!(matches!(err, PlatformError::Refused { .. }));

        let outcome = platform
            .resume_or_start(Activation::Gesture(UserGesture::Click))
            .unwrap();
        assert_eq!(outcome, ResumeOutcome::Running);
        assert!(platform.is_running());
        assert_eq!(platform.resume_calls(), 2);
    }

    #[test]
    fn test_blocked_policy_always_refuses() {
        let platform = OfflinePlatform::new(48000).with_policy(AutoplayPolicy::Blocked);
        assert!(platform
            .resume_or_start(Activation::Gesture(UserGesture::Key))
            .is_err());
    }

    #[test]
    fn test_resume_latency() {
        let platform = OfflinePlatform::new(48000)
            .with_policy(AutoplayPolicy::Allowed)
            .with_resume_latency(2);
        assert_eq!(
            platform.resume_or_start(Activation::None).unwrap(),
            ResumeOutcome::Pending
        );
        platform.render(BLOCK_SIZE);
        assert!(!platform.is_running());
        platform.render(BLOCK_SIZE);
        assert!(platform.is_running());
    }

    #[test]
    fn test_closed_context_rejects_everything() {
        let platform = running_platform();
        platform.close();
        assert_eq!(
            platform.resume_or_start(Activation::None).unwrap_err(),
            PlatformError::Closed
        );
        assert!(platform
            .create_node(NodeSpec::Reverb(ReverbParams::default()))
            .is_err());
    }

    #[test]
    fn test_noise_through_filter_reaches_destination() {
        let platform = running_platform();
        let filter = platform
            .create_node(NodeSpec::LowPass {
                cutoff_hz: 800.0,
                q: 1.0,
            })
            .unwrap();
        let noise = platform
            .create_node(NodeSpec::Noise(RainParams::default()))
            .unwrap();
        platform.connect(filter, Sink::Destination).unwrap();
        platform.connect(noise, Sink::Node(filter)).unwrap();

        assert!(platform.render(4800).is_silent());

        platform.send(noise, NodeCommand::Start).unwrap();
        assert!(platform.is_node_active(noise));
        let out = platform.render(4800);
        assert!(!out.is_silent());
        assert!(out.is_finite());
    }

    #[test]
    fn test_suspended_context_renders_silence() {
        let platform = OfflinePlatform::new(48000);
        let synth = platform
            .create_node(NodeSpec::PolySynth(DroneParams::default()))
            .unwrap();
        platform.connect(synth, Sink::Destination).unwrap();
        platform
            .send(synth, NodeCommand::TriggerAttack(vec![220.0]))
            .unwrap();
        assert!(platform.render(4800).is_silent());
    }

    #[test]
    fn test_reverb_generation_latency() {
        let platform = running_platform().with_reverb_latency(3);
        let reverb = platform
            .create_node(NodeSpec::Reverb(ReverbParams::default()))
            .unwrap();
        assert!(!platform.poll_ready(reverb).unwrap());
        platform.render(BLOCK_SIZE * 3);
        assert!(platform.poll_ready(reverb).unwrap());
    }

    #[test]
    fn test_unsupported_command() {
        let platform = running_platform();
        let noise = platform
            .create_node(NodeSpec::Noise(RainParams::default()))
            .unwrap();
        let err = platform.send(noise, NodeCommand::ReleaseAll).unwrap_err();
        assert!(matches!(err, PlatformError::Unsupported { .. }));
    }

    #[test]
    fn test_dispose_disconnects_upstream() {
        let platform = running_platform();
        let reverb = platform
            .create_node(NodeSpec::Reverb(ReverbParams::default()))
            .unwrap();
        let synth = platform
            .create_node(NodeSpec::PolySynth(DroneParams::default()))
            .unwrap();
        platform.connect(synth, Sink::Node(reverb)).unwrap();

        platform.dispose(reverb).unwrap();
        assert_eq!(platform.sink_of(synth), None);
        assert_eq!(platform.live_node_count(), 1);
        assert_eq!(
            platform.dispose(reverb).unwrap_err(),
            PlatformError::UnknownNode(reverb)
        );
    }
}
