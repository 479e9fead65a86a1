//! Render-side signal graph.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Every node has at most one
//! output connection, so the graph is a forest rooted at the destination. The
//! render order is rebuilt on every topology change (control thread) and walked
//! once per frame on the audio thread without allocating.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use super::buffer::{self, StereoSample};
use super::envelope::EnvelopeFollower;
use super::nodes::{AnalyzerReadout, NodeId, NodeKind, SourceControl, WaveformShape};
use super::param::ParamFollower;
use super::spectrum::SpectrumAnalyzer;
use crate::error::{EngineError, Result};

/// Oscillator / noise generator
pub(crate) enum Generator {
    Tone {
        shape: WaveformShape,
        phase: f32,
        increment: f32,
    },
    Noise { rng: StdRng },
}

impl Generator {
    pub fn tone(shape: WaveformShape, frequency: f32, sample_rate: u32) -> Self {
        Self::Tone {
            shape,
            phase: 0.0,
            increment: frequency / sample_rate.max(1) as f32,
        }
    }

    pub fn noise() -> Self {
        Self::Noise {
            rng: StdRng::from_entropy(),
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        match self {
            Self::Tone {
                shape,
                phase,
                increment,
            } => {
                let value = shape.sample_at(*phase);
                *phase += *increment;
                if *phase >= 1.0 {
                    *phase -= phase.floor();
                }
                value
            }
            Self::Noise { rng } => rng.gen_range(-1.0f32..1.0),
        }
    }
}

pub(crate) struct SourceVoice {
    pub control: Arc<SourceControl>,
    pub generator: Generator,
}

pub(crate) struct GainStage {
    pub gain: ParamFollower,
    pub envelope: EnvelopeFollower,
}

pub(crate) struct PanStage {
    pub pan: ParamFollower,
}

pub(crate) struct AnalyzerStage {
    pub analyzer: SpectrumAnalyzer,
    pub readout: Arc<AnalyzerReadout>,
}

impl AnalyzerStage {
    /// Run the transform and publish levels for lock-free readers
    fn publish(&mut self) {
        if self.readout.take_reset() {
            self.analyzer.reset();
        } else {
            self.analyzer.analyze();
        }
        self.readout.store(self.analyzer.levels());
    }
}

pub(crate) enum NodeProcessor {
    Destination,
    Source(SourceVoice),
    Gain(GainStage),
    Pan(PanStage),
    Analyzer(AnalyzerStage),
}

impl NodeProcessor {
    #[inline]
    fn process(&mut self, input: StereoSample) -> StereoSample {
        match self {
            Self::Destination => input,
            Self::Source(voice) => {
                if voice.control.is_running() {
                    StereoSample::mono(voice.generator.next_sample())
                } else {
                    StereoSample::silence()
                }
            }
            Self::Gain(stage) => {
                let gain = stage.gain.next();
                let envelope = stage.envelope.next();
                input * (gain * envelope)
            }
            Self::Pan(stage) => {
                let (left, right) = constant_power(stage.pan.next());
                let mid = input.mid();
                StereoSample::new(mid * left, mid * right)
            }
            Self::Analyzer(stage) => {
                stage.analyzer.push_sample(input.mid());
                input
            }
        }
    }
}

/// Equal-power pan law for pan in -1..1
#[inline]
pub fn constant_power(pan: f32) -> (f32, f32) {
    let angle = ((pan.clamp(-1.0, 1.0) + 1.0) * 0.5) * std::f32::consts::FRAC_PI_2;
    (angle.cos(), angle.sin())
}

struct NodeSlot {
    kind: NodeKind,
    processor: NodeProcessor,
    output: Option<usize>,
}

struct RenderStep {
    node: usize,
    inputs: Vec<usize>,
}

pub(crate) struct Graph {
    slots: Vec<Option<NodeSlot>>,
    free: Vec<usize>,
    schedule: Vec<RenderStep>,
    /// Output of each slot for the frame being rendered
    frame: Vec<StereoSample>,
}

impl Graph {
    pub fn new() -> Self {
        let mut graph = Self {
            slots: Vec::new(),
            free: Vec::new(),
            schedule: Vec::new(),
            frame: Vec::new(),
        };
        let destination = graph.insert(NodeKind::Destination, NodeProcessor::Destination);
        debug_assert_eq!(destination, NodeId::DESTINATION);
        graph
    }

    pub fn insert(&mut self, kind: NodeKind, processor: NodeProcessor) -> NodeId {
        let slot = NodeSlot {
            kind,
            processor,
            output: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.frame.push(StereoSample::silence());
                self.slots.len() - 1
            }
        };
        NodeId(index)
    }

    /// Remove a node and every connection into or out of it
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == NodeId::DESTINATION || !self.contains(id) {
            return false;
        }
        self.slots[id.0] = None;
        self.frame[id.0] = StereoSample::silence();
        for slot in self.slots.iter_mut().flatten() {
            if slot.output == Some(id.0) {
                slot.output = None;
            }
        }
        self.free.push(id.0);
        self.rebuild_schedule();
        true
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.slots.get(id.0).and_then(|s| s.as_ref()).map(|s| s.kind)
    }

    /// Number of nodes excluding the destination
    pub fn node_count(&self) -> usize {
        self.slots.iter().flatten().count().saturating_sub(1)
    }

    pub fn output_of(&self, id: NodeId) -> Option<NodeId> {
        self.slots
            .get(id.0)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.output)
            .map(NodeId)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if from == NodeId::DESTINATION {
            return Err(EngineError::InvalidConnection(
                "the destination has no output".to_string(),
            ));
        }
        if !self.contains(from) || !self.contains(to) {
            return Err(EngineError::InvalidConnection(format!(
                "unknown node in {} -> {}",
                from, to
            )));
        }
        if self.kind(to) == Some(NodeKind::Source) {
            return Err(EngineError::InvalidConnection(format!(
                "source node {} takes no input",
                to
            )));
        }

        // Walking downstream from `to` must not reach `from`
        let mut cursor = Some(to);
        while let Some(node) = cursor {
            if node == from {
                return Err(EngineError::InvalidConnection(format!(
                    "{} -> {} would create a cycle",
                    from, to
                )));
            }
            cursor = self.output_of(node);
        }

        if let Some(Some(slot)) = self.slots.get_mut(from.0) {
            slot.output = Some(to.0);
        }
        self.rebuild_schedule();
        Ok(())
    }

    pub fn disconnect(&mut self, from: NodeId) {
        if let Some(Some(slot)) = self.slots.get_mut(from.0) {
            if slot.output.take().is_some() {
                self.rebuild_schedule();
            }
        }
    }

    /// Post-order walk from the destination: every node is scheduled after its inputs.
    /// Nodes that do not reach the destination are not rendered.
    fn rebuild_schedule(&mut self) {
        let mut inputs: Vec<Vec<usize>> = vec![Vec::new(); self.slots.len()];
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                if let Some(output) = slot.output {
                    inputs[output].push(index);
                }
            }
        }

        let mut order = Vec::new();
        // (node, inputs expanded)
        let mut stack = vec![(NodeId::DESTINATION.0, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(RenderStep {
                    node,
                    inputs: inputs[node].clone(),
                });
            } else {
                stack.push((node, true));
                for &input in inputs[node].iter().rev() {
                    stack.push((input, false));
                }
            }
        }
        self.schedule = order;
    }

    /// Render one frame and return what reaches the destination
    #[inline]
    pub fn render_frame(&mut self) -> StereoSample {
        for step in &self.schedule {
            let mut input = StereoSample::silence();
            for &source in &step.inputs {
                input += self.frame[source];
            }
            let output = match self.slots[step.node].as_mut() {
                Some(slot) => slot.processor.process(input),
                None => StereoSample::silence(),
            };
            self.frame[step.node] = output;
        }
        self.frame[NodeId::DESTINATION.0]
    }

    /// Render an interleaved block, apply the safety limiter, then publish analyzer levels.
    /// Returns true if the limiter engaged.
    pub fn render(&mut self, data: &mut [f32], channels: usize) -> bool {
        let channels = channels.max(1);
        for chunk in data.chunks_mut(channels) {
            let frame = self.render_frame();
            buffer::write_frame(chunk, frame);
        }
        let clipped = buffer::limit(data);

        for slot in self.slots.iter_mut().flatten() {
            if let NodeProcessor::Analyzer(stage) = &mut slot.processor {
                stage.publish();
            }
        }
        clipped
    }

    /// Source nodes whose generator is currently running
    pub fn running_sources(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| match &slot.processor {
                NodeProcessor::Source(voice) => voice.control.is_running(),
                _ => false,
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::param::AudioParam;

    fn source(graph: &mut Graph, control: &Arc<SourceControl>) -> NodeId {
        graph.insert(
            NodeKind::Source,
            NodeProcessor::Source(SourceVoice {
                control: Arc::clone(control),
                generator: Generator::tone(WaveformShape::Square, 100.0, 1000),
            }),
        )
    }

    fn gain(graph: &mut Graph, value: f32) -> (NodeId, Arc<AudioParam>) {
        let param = AudioParam::new(value);
        let id = graph.insert(
            NodeKind::Gain,
            NodeProcessor::Gain(GainStage {
                gain: ParamFollower::new(Arc::clone(&param), 1000),
                envelope: EnvelopeFollower::new(crate::audio::envelope::EnvelopeTrigger::new(), 1000),
            }),
        );
        (id, param)
    }

    #[test]
    fn test_chain_reaches_destination() {
        let mut graph = Graph::new();
        let control = SourceControl::new(100.0);
        let src = source(&mut graph, &control);
        let (g, _param) = gain(&mut graph, 0.5);
        graph.connect(src, g).unwrap();
        graph.connect(g, NodeId::DESTINATION).unwrap();

        // Not started yet
        assert_eq!(graph.render_frame(), StereoSample::silence());

        control.start();
        // Square wave starts at +1
        assert_eq!(graph.render_frame(), StereoSample::mono(0.5));
    }

    #[test]
    fn test_inputs_sum() {
        let mut graph = Graph::new();
        let (bus, _param) = gain(&mut graph, 1.0);
        graph.connect(bus, NodeId::DESTINATION).unwrap();
        for _ in 0..3 {
            let control = SourceControl::new(100.0);
            control.start();
            let src = source(&mut graph, &control);
            graph.connect(src, bus).unwrap();
        }
        assert_eq!(graph.render_frame(), StereoSample::mono(3.0));
    }

    #[test]
    fn test_remove_clears_connections() {
        let mut graph = Graph::new();
        let control = SourceControl::new(100.0);
        control.start();
        let src = source(&mut graph, &control);
        let (g, _param) = gain(&mut graph, 1.0);
        graph.connect(src, g).unwrap();
        graph.connect(g, NodeId::DESTINATION).unwrap();
        assert_eq!(graph.node_count(), 2);

        assert!(graph.remove(g));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.output_of(src), None);
        assert_eq!(graph.render_frame(), StereoSample::silence());

        // Slot is reused
        let (g2, _param) = gain(&mut graph, 1.0);
        assert_eq!(g2, g);
    }

    #[test]
    fn test_rejects_cycles_and_bad_edges() {
        let mut graph = Graph::new();
        let (a, _pa) = gain(&mut graph, 1.0);
        let (b, _pb) = gain(&mut graph, 1.0);
        graph.connect(a, b).unwrap();
        assert!(graph.connect(b, a).is_err());
        assert!(graph.connect(a, a).is_err());
        assert!(graph.connect(NodeId::DESTINATION, a).is_err());

        let control = SourceControl::new(100.0);
        let src = source(&mut graph, &control);
        assert!(graph.connect(a, src).is_err());
        assert!(!graph.remove(NodeId::DESTINATION));
    }

    #[test]
    fn test_constant_power() {
        let (l, r) = constant_power(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-6);

        let (l, r) = constant_power(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);

        let (l, r) = constant_power(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_limiter_applied_to_block() {
        let mut graph = Graph::new();
        let (bus, _param) = gain(&mut graph, 1.0);
        graph.connect(bus, NodeId::DESTINATION).unwrap();
        for _ in 0..4 {
            let control = SourceControl::new(100.0);
            control.start();
            let src = source(&mut graph, &control);
            graph.connect(src, bus).unwrap();
        }
        let mut block = [0.0f32; 8];
        assert!(graph.render(&mut block, 2));
        assert!(block.iter().all(|s| s.abs() <= 1.0));
    }
}
