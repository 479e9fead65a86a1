//! Control-side node handles.
//!
//! A handle owns its node: dropping it removes the node from the graph (and
//! with it every connection into or out of the node). Parameters are shared
//! with the render thread through atomics, so automating a node never takes
//! the graph lock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::context::ContextShared;
use super::envelope::EnvelopeTrigger;
use super::param::{AtomicF32, AudioParam};
use crate::error::Result;

/// Index of a node in its context's graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const DESTINATION: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Destination,
    Source,
    Gain,
    Pan,
    Analyzer,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Destination => "destination",
            Self::Source => "source",
            Self::Gain => "gain",
            Self::Pan => "pan",
            Self::Analyzer => "analyzer",
        };
        f.write_str(name)
    }
}

/// Periodic waveform shape for tone sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformShape {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl WaveformShape {
    /// Waveform value at `phase` (0.0 - 1.0), peak amplitude 1.0
    #[inline]
    pub fn sample_at(self, phase: f32) -> f32 {
        match self {
            Self::Sine => (2.0 * std::f32::consts::PI * phase).sin(),
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Self::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

impl std::str::FromStr for WaveformShape {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sine" => Ok(Self::Sine),
            "square" => Ok(Self::Square),
            "triangle" => Ok(Self::Triangle),
            "sawtooth" | "saw" => Ok(Self::Sawtooth),
            _ => Err(format!("Unknown waveform shape: {}", s)),
        }
    }
}

/// Start/stop switch of a source, shared with its render voice
#[derive(Debug)]
pub struct SourceControl {
    running: AtomicBool,
    frequency: f32,
}

impl SourceControl {
    pub(crate) fn new(frequency: f32) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            frequency,
        })
    }

    pub(crate) fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Band levels published by the render thread after every block
#[derive(Debug)]
pub struct AnalyzerReadout {
    levels: Box<[AtomicF32]>,
    reset_requested: AtomicBool,
}

impl AnalyzerReadout {
    pub(crate) fn new(band_count: usize) -> Arc<Self> {
        Arc::new(Self {
            levels: (0..band_count).map(|_| AtomicF32::zero()).collect(),
            reset_requested: AtomicBool::new(false),
        })
    }

    pub(crate) fn store(&self, levels: &[f32]) {
        for (slot, &level) in self.levels.iter().zip(levels) {
            slot.store(level, Ordering::Relaxed);
        }
    }

    pub(crate) fn take_reset(&self) -> bool {
        self.reset_requested.swap(false, Ordering::AcqRel)
    }

    /// Clear published levels now and the analysis history on the next block
    pub fn request_reset(&self) {
        for slot in self.levels.iter() {
            slot.store(0.0, Ordering::Relaxed);
        }
        self.reset_requested.store(true, Ordering::Release);
    }

    pub fn band_count(&self) -> usize {
        self.levels.len()
    }

    /// Copy current levels (0.0 - 1.0) into `out`; returns bands written
    pub fn read_into(&self, out: &mut [f32]) -> usize {
        let mut written = 0;
        for (dst, src) in out.iter_mut().zip(self.levels.iter()) {
            *dst = src.load(Ordering::Relaxed);
            written += 1;
        }
        written
    }
}

/// Owning reference to a node in a processing context
pub struct NodeHandle {
    id: NodeId,
    kind: NodeKind,
    context: Arc<ContextShared>,
}

impl NodeHandle {
    pub(crate) fn new(id: NodeId, kind: NodeKind, context: Arc<ContextShared>) -> Self {
        Self { id, kind, context }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Route this node's output into `destination`, replacing any previous connection
    pub fn connect(&self, destination: &NodeHandle) -> Result<()> {
        self.context.connect(self.id, destination.id)
    }

    /// Route this node's output straight to the output sink
    pub fn connect_to_destination(&self) -> Result<()> {
        self.context.connect(self.id, NodeId::DESTINATION)
    }

    pub fn disconnect(&self) {
        self.context.disconnect(self.id);
    }

    pub fn output(&self) -> Option<NodeId> {
        self.context.output_of(self.id)
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.context.release(self.id);
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Anything that wraps a node handle
pub trait AudioNode {
    fn node(&self) -> &NodeHandle;

    fn connect<N: AudioNode>(&self, destination: &N) -> Result<()>
    where
        Self: Sized,
    {
        self.node().connect(destination.node())
    }

    fn disconnect(&self) {
        self.node().disconnect();
    }
}

/// Tone or noise generator
#[derive(Debug)]
pub struct SourceNode {
    pub(crate) node: NodeHandle,
    pub(crate) control: Arc<SourceControl>,
}

impl SourceNode {
    pub fn start(&self) {
        self.control.start();
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Frequency fixed at creation (0 for noise)
    pub fn frequency(&self) -> f32 {
        self.control.frequency
    }
}

/// Linear gain stage with an optional pulse envelope
#[derive(Debug)]
pub struct GainNode {
    pub(crate) node: NodeHandle,
    pub(crate) gain: Arc<AudioParam>,
    pub(crate) envelope: Arc<EnvelopeTrigger>,
}

impl GainNode {
    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }

    pub fn envelope(&self) -> &Arc<EnvelopeTrigger> {
        &self.envelope
    }
}

/// Equal-power stereo panner
#[derive(Debug)]
pub struct PanNode {
    pub(crate) node: NodeHandle,
    pub(crate) pan: Arc<AudioParam>,
}

impl PanNode {
    pub fn pan(&self) -> &AudioParam {
        &self.pan
    }
}

/// Pass-through node exposing the spectrum of its signal
#[derive(Debug)]
pub struct AnalyzerNode {
    pub(crate) node: NodeHandle,
    pub(crate) readout: Arc<AnalyzerReadout>,
}

impl AnalyzerNode {
    /// Shared read-only view of the published band levels
    pub fn readout(&self) -> Arc<AnalyzerReadout> {
        Arc::clone(&self.readout)
    }

    pub fn band_count(&self) -> usize {
        self.readout.band_count()
    }
}

impl AudioNode for SourceNode {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl AudioNode for GainNode {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl AudioNode for PanNode {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl AudioNode for AnalyzerNode {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_shapes() {
        assert!(WaveformShape::Sine.sample_at(0.0).abs() < 1e-6);
        assert!((WaveformShape::Sine.sample_at(0.25) - 1.0).abs() < 1e-6);
        assert_eq!(WaveformShape::Square.sample_at(0.25), 1.0);
        assert_eq!(WaveformShape::Square.sample_at(0.75), -1.0);
        assert_eq!(WaveformShape::Triangle.sample_at(0.5), 1.0);
        assert_eq!(WaveformShape::Triangle.sample_at(0.0), -1.0);
        assert_eq!(WaveformShape::Sawtooth.sample_at(0.0), -1.0);
        assert_eq!(WaveformShape::Sawtooth.sample_at(0.5), 0.0);
    }

    #[test]
    fn test_waveform_parse() {
        assert_eq!("saw".parse::<WaveformShape>().unwrap(), WaveformShape::Sawtooth);
        assert!("wobble".parse::<WaveformShape>().is_err());
    }

    #[test]
    fn test_readout_reset() {
        let readout = AnalyzerReadout::new(4);
        readout.store(&[0.5, 0.5, 0.5, 0.5]);
        readout.request_reset();
        let mut out = [1.0f32; 4];
        assert_eq!(readout.read_into(&mut out), 4);
        assert_eq!(out, [0.0; 4]);
        assert!(readout.take_reset());
        assert!(!readout.take_reset());
    }
}
