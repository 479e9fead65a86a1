//! The session's mixing bus: master gain → analyzer → output sink

use parking_lot::Mutex;
use std::sync::Arc;

use super::factory::SignalNodeFactory;
use super::nodes::{AnalyzerNode, AnalyzerReadout, AudioNode, GainNode, PanNode};
use super::spectrum::NUM_BANDS;
use crate::error::{EngineError, Result};

pub const DEFAULT_MASTER_LEVEL: f32 = 0.8;

pub struct MixBus {
    master: GainNode,
    analyzer: AnalyzerNode,
    /// Serializes master level writes
    level: Mutex<f32>,
    ramp_seconds: f32,
}

impl MixBus {
    /// Create the bus nodes and wire them to the output sink
    pub fn new(factory: &SignalNodeFactory, master_level: f32, ramp_seconds: f32) -> Result<Self> {
        let master = factory.create_gain(master_level)?;
        let analyzer = factory.create_analyzer(NUM_BANDS)?;
        master.connect(&analyzer)?;
        analyzer.node().connect_to_destination()?;

        log::info!(
            "MixBus: master {} -> analyzer {} -> sink (level {:.2})",
            master.node().id(),
            analyzer.node().id(),
            master_level
        );

        Ok(Self {
            master,
            analyzer,
            level: Mutex::new(master_level),
            ramp_seconds,
        })
    }

    /// Route a track's pan stage into the master gain
    pub fn connect(&self, pan: &PanNode) -> Result<()> {
        pan.connect(&self.master)
    }

    pub fn disconnect(&self, pan: &PanNode) {
        if pan.node().output() == Some(self.master.node().id()) {
            pan.disconnect();
        }
    }

    pub fn master_level(&self) -> f32 {
        *self.level.lock()
    }

    /// The single writer for the master level (0.0 - 1.0)
    pub fn set_master_level(&self, level: f32) -> Result<()> {
        if !level.is_finite() || !(0.0..=1.0).contains(&level) {
            return Err(EngineError::out_of_range("master level", level, 0.0, 1.0));
        }
        let mut current = self.level.lock();
        *current = level;
        self.master.gain().set_target(level, self.ramp_seconds);
        Ok(())
    }

    pub fn master(&self) -> &GainNode {
        &self.master
    }

    pub fn analyzer(&self) -> &AnalyzerNode {
        &self.analyzer
    }

    pub fn analyzer_readout(&self) -> Arc<AnalyzerReadout> {
        self.analyzer.readout()
    }

    /// Nodes owned by the bus itself
    pub const NODE_COUNT: usize = 2;
}
