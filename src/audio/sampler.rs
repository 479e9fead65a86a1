//! Periodic spectrum readout for display.
//!
//! Reads the bus analyzer's published levels (atomics, no graph lock) on a
//! fixed cadence and replaces the shared snapshot wholesale each tick.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use super::nodes::AnalyzerReadout;
use super::spectrum::{SpectrumSnapshot, NUM_BANDS};
use super::ticker::PeriodicWorker;
use crate::error::Result;

/// Fastest allowed cadence (60 Hz)
pub const MIN_INTERVAL: Duration = Duration::from_micros(16_667);

pub struct SpectrumSampler {
    interval: Duration,
    snapshot: Arc<RwLock<SpectrumSnapshot>>,
    worker: Option<PeriodicWorker>,
}

impl SpectrumSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            snapshot: Arc::new(RwLock::new(SpectrumSnapshot::baseline())),
            worker: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start a fresh sampling loop; restarts one already running
    pub fn start(&mut self, readout: Arc<AnalyzerReadout>) -> Result<()> {
        self.stop();
        readout.request_reset();

        let snapshot = Arc::clone(&self.snapshot);
        let worker = PeriodicWorker::spawn("spectrum-sampler", self.interval, true, move || {
            let next = Self::sample(&readout);
            *snapshot.write() = next;
        })?;
        self.worker = Some(worker);
        log::debug!("SpectrumSampler: sampling every {:?}", self.interval);
        Ok(())
    }

    /// Stop sampling and reset the snapshot to baseline.
    /// No tick runs after this returns.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel();
        }
        *self.snapshot.write() = SpectrumSnapshot::baseline();
    }

    /// One reading of the analyzer, normalized to 0 - 100
    pub fn sample(readout: &AnalyzerReadout) -> SpectrumSnapshot {
        let mut levels = [0.0f32; NUM_BANDS];
        readout.read_into(&mut levels);
        SpectrumSnapshot::from_levels(&levels)
    }

    pub fn snapshot(&self) -> SpectrumSnapshot {
        *self.snapshot.read()
    }
}

impl Drop for SpectrumSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
