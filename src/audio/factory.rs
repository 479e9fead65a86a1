//! Node construction bound to a processing context

use std::sync::Arc;

use super::context::ProcessingContext;
use super::envelope::{EnvelopeFollower, EnvelopeTrigger};
use super::graph::{AnalyzerStage, GainStage, Generator, NodeProcessor, PanStage, SourceVoice};
use super::nodes::{
    AnalyzerNode, AnalyzerReadout, GainNode, NodeKind, PanNode, SourceControl, SourceNode,
    WaveformShape,
};
use super::param::{AudioParam, ParamFollower};
use super::spectrum::SpectrumAnalyzer;
use crate::error::{EngineError, Result};

/// Creates nodes in one processing context. Holds nothing but the context handle.
#[derive(Clone)]
pub struct SignalNodeFactory {
    context: ProcessingContext,
}

impl SignalNodeFactory {
    pub fn new(context: ProcessingContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ProcessingContext {
        &self.context
    }

    pub fn nyquist(&self) -> f32 {
        self.context.sample_rate() as f32 / 2.0
    }

    /// Tone frequencies must be positive and below Nyquist
    pub fn check_frequency(&self, frequency: f32) -> Result<()> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(EngineError::InvalidParameter {
                name: "frequency",
                reason: format!("{} Hz is not a positive frequency", frequency),
            });
        }
        let nyquist = self.nyquist();
        if frequency >= nyquist {
            return Err(EngineError::out_of_range("frequency", frequency, 0.0, nyquist));
        }
        Ok(())
    }

    /// Periodic waveform generator; frequency is fixed for the node's lifetime
    pub fn create_source(&self, shape: WaveformShape, frequency: f32) -> Result<SourceNode> {
        self.check_frequency(frequency)?;

        let control = SourceControl::new(frequency);
        let voice_control = Arc::clone(&control);
        let node = self.context.create_node(NodeKind::Source, move |sample_rate| {
            NodeProcessor::Source(SourceVoice {
                control: voice_control,
                generator: Generator::tone(shape, frequency, sample_rate),
            })
        })?;
        Ok(SourceNode { node, control })
    }

    /// White noise generator
    pub fn create_noise_source(&self) -> Result<SourceNode> {
        let control = SourceControl::new(0.0);
        let voice_control = Arc::clone(&control);
        let node = self.context.create_node(NodeKind::Source, move |_| {
            NodeProcessor::Source(SourceVoice {
                control: voice_control,
                generator: Generator::noise(),
            })
        })?;
        Ok(SourceNode { node, control })
    }

    /// Linear 0 - 1 gain stage
    pub fn create_gain(&self, initial_level: f32) -> Result<GainNode> {
        if !(0.0..=1.0).contains(&initial_level) {
            return Err(EngineError::out_of_range("gain", initial_level, 0.0, 1.0));
        }

        let gain = AudioParam::new(initial_level);
        let envelope = EnvelopeTrigger::new();
        let (stage_gain, stage_envelope) = (Arc::clone(&gain), Arc::clone(&envelope));
        let node = self.context.create_node(NodeKind::Gain, move |sample_rate| {
            NodeProcessor::Gain(GainStage {
                gain: ParamFollower::new(stage_gain, sample_rate),
                envelope: EnvelopeFollower::new(stage_envelope, sample_rate),
            })
        })?;
        Ok(GainNode {
            node,
            gain,
            envelope,
        })
    }

    /// Stereo position stage, -1 (left) .. +1 (right)
    pub fn create_pan(&self, initial_pan: f32) -> Result<PanNode> {
        if !(-1.0..=1.0).contains(&initial_pan) {
            return Err(EngineError::out_of_range("pan", initial_pan, -1.0, 1.0));
        }

        let pan = AudioParam::new(initial_pan);
        let stage_pan = Arc::clone(&pan);
        let node = self.context.create_node(NodeKind::Pan, move |sample_rate| {
            NodeProcessor::Pan(PanStage {
                pan: ParamFollower::new(stage_pan, sample_rate),
            })
        })?;
        Ok(PanNode { node, pan })
    }

    /// Spectrum analyzer with `band_count` bands (transform window of twice that)
    pub fn create_analyzer(&self, band_count: usize) -> Result<AnalyzerNode> {
        if band_count == 0 {
            return Err(EngineError::InvalidParameter {
                name: "band_count",
                reason: "an analyzer needs at least one band".to_string(),
            });
        }

        let readout = AnalyzerReadout::new(band_count);
        let stage_readout = Arc::clone(&readout);
        let node = self.context.create_node(NodeKind::Analyzer, move |_| {
            NodeProcessor::Analyzer(AnalyzerStage {
                analyzer: SpectrumAnalyzer::new(band_count),
                readout: stage_readout,
            })
        })?;
        Ok(AnalyzerNode { node, readout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::context::ContextOptions;
    use crate::audio::nodes::AudioNode;

    fn factory() -> SignalNodeFactory {
        SignalNodeFactory::new(ProcessingContext::offline(ContextOptions::default()).unwrap())
    }

    #[test]
    fn test_creates_bound_nodes() {
        let factory = factory();
        let source = factory.create_source(WaveformShape::Sine, 220.0).unwrap();
        let gain = factory.create_gain(0.5).unwrap();
        let pan = factory.create_pan(-0.25).unwrap();
        let analyzer = factory.create_analyzer(32).unwrap();

        assert_eq!(factory.context().live_node_count(), 4);
        assert_eq!(source.frequency(), 220.0);
        assert!(!source.is_running());
        assert_eq!(gain.gain().target(), 0.5);
        assert_eq!(pan.pan().target(), -0.25);
        assert_eq!(analyzer.band_count(), 32);

        source.connect(&gain).unwrap();
        assert_eq!(source.node().output(), Some(gain.node().id()));
    }

    #[test]
    fn test_rejects_invalid_arguments() {
        let factory = factory();
        assert!(factory.create_source(WaveformShape::Sine, 0.0).is_err());
        assert!(factory.create_source(WaveformShape::Sine, f32::NAN).is_err());
        assert!(factory.create_source(WaveformShape::Sine, 30000.0).is_err());
        assert!(factory.check_frequency(factory.nyquist()).is_err());
        assert!(factory.check_frequency(factory.nyquist() - 1.0).is_ok());
        assert!(factory.create_gain(1.5).is_err());
        assert!(factory.create_pan(-1.01).is_err());
        assert!(factory.create_analyzer(0).is_err());
        assert_eq!(factory.context().live_node_count(), 0);
    }

    #[test]
    fn test_rendered_chain() {
        let factory = factory();
        let source = factory.create_source(WaveformShape::Square, 100.0).unwrap();
        let gain = factory.create_gain(0.5).unwrap();
        let pan = factory.create_pan(-1.0).unwrap();
        source.connect(&gain).unwrap();
        gain.connect(&pan).unwrap();
        pan.node().connect_to_destination().unwrap();
        source.start();

        let mut block = [0.0f32; 2];
        factory.context().render(&mut block);
        // Hard left: everything on the left channel
        assert!((block[0] - 0.5).abs() < 1e-6);
        assert!(block[1].abs() < 1e-6);
    }
}
