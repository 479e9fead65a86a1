//! Playback state machine and per-track live node lifecycle.
//!
//! `play()` builds every track's source → gain → pan chain into the bus and
//! only then reports Playing; `stop()` tears every chain down before reporting
//! Stopped. A `TrackRuntime` owns its nodes and pulse scheduler, so dropping it
//! is the teardown: rollback after a failed play is just dropping the partial set.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::bus::MixBus;
use super::envelope::{PulseScheduler, PulseSettings};
use super::factory::SignalNodeFactory;
use super::mixer::{MixTarget, MixerController};
use super::nodes::{AudioNode, GainNode, PanNode, SourceNode};
use super::track::{SourceKind, TrackConfig, TrackId, TrackList};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Stopped,
    Playing,
}

/// Cosmetic playback behaviour
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Random detune applied to each tone source per play, as a ratio (0.01 = ±1%)
    pub frequency_jitter: f32,
    pub pulse: PulseSettings,
    /// Track names containing one of these get a pulse envelope
    pub percussive_roles: Vec<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            frequency_jitter: 0.01,
            pulse: PulseSettings::default(),
            percussive_roles: vec!["kick".to_string()],
        }
    }
}

/// Live nodes of one playing track
#[derive(Debug)]
pub struct TrackRuntime {
    // Declared first so the scheduler is cancelled before the nodes go away
    pulse: Option<PulseScheduler>,
    pub(crate) source: SourceNode,
    pub(crate) gain: GainNode,
    pub(crate) pan: PanNode,
}

impl TrackRuntime {
    pub fn source(&self) -> &SourceNode {
        &self.source
    }

    pub fn gain(&self) -> &GainNode {
        &self.gain
    }

    pub fn pan(&self) -> &PanNode {
        &self.pan
    }

    pub fn has_pulse(&self) -> bool {
        self.pulse.is_some()
    }

    /// Stop the source and unwire every node; dropping releases them
    fn teardown(self, bus: &MixBus) {
        self.source.stop();
        bus.disconnect(&self.pan);
        self.gain.disconnect();
        self.source.disconnect();
    }
}

impl Drop for TrackRuntime {
    fn drop(&mut self) {
        self.pulse.take();
        self.source.stop();
    }
}

pub struct Transport {
    state: TransportState,
    runtimes: BTreeMap<TrackId, TrackRuntime>,
    options: TransportOptions,
    rng: StdRng,
    #[cfg(test)]
    started_pulses: Vec<std::sync::Arc<super::envelope::EnvelopeTrigger>>,
}

impl Transport {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            state: TransportState::Stopped,
            runtimes: BTreeMap::new(),
            options,
            rng: StdRng::from_entropy(),
            #[cfg(test)]
            started_pulses: Vec::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn runtimes(&self) -> &BTreeMap<TrackId, TrackRuntime> {
        &self.runtimes
    }

    pub fn runtime(&self, id: TrackId) -> Option<&TrackRuntime> {
        self.runtimes.get(&id)
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Wire every track and start playback. No-op when already playing.
    pub fn play(
        &mut self,
        tracks: &TrackList,
        mixer: &mut MixerController,
        factory: &SignalNodeFactory,
        bus: &MixBus,
    ) -> Result<TransportState> {
        if self.state == TransportState::Playing {
            log::debug!("Transport: play() while playing ignored");
            return Ok(self.state);
        }

        let targets = mixer.resolve(tracks).clone();
        let mut wired = BTreeMap::new();
        for track in tracks {
            let target = targets.get(&track.id()).copied().unwrap_or(MixTarget {
                gain: 0.0,
                pan: 0.0,
            });
            match self.wire(track, target, factory, bus) {
                Ok(runtime) => {
                    wired.insert(track.id(), runtime);
                }
                Err(e) => {
                    log::warn!(
                        "Transport: play failed on track {} ({}), rolling back {} wired tracks: {}",
                        track.id(),
                        track.name(),
                        wired.len(),
                        e
                    );
                    Self::teardown_all(wired, bus);
                    return Err(e);
                }
            }
        }

        // Everything is wired; start the sources together
        for runtime in wired.values() {
            runtime.source.start();
        }
        self.runtimes = wired;
        self.state = TransportState::Playing;
        log::info!("Transport: playing {} tracks", self.runtimes.len());
        Ok(self.state)
    }

    /// Tear every track down. No-op when already stopped.
    pub fn stop(&mut self, bus: &MixBus) -> TransportState {
        if self.state == TransportState::Stopped {
            log::debug!("Transport: stop() while stopped ignored");
            return self.state;
        }

        let runtimes = std::mem::take(&mut self.runtimes);
        let count = runtimes.len();
        Self::teardown_all(runtimes, bus);
        self.state = TransportState::Stopped;
        log::info!("Transport: stopped, {} tracks torn down", count);
        self.state
    }

    /// Wire a track added while playing
    pub fn attach(
        &mut self,
        track: &TrackConfig,
        target: MixTarget,
        factory: &SignalNodeFactory,
        bus: &MixBus,
    ) -> Result<()> {
        if self.state != TransportState::Playing {
            return Ok(());
        }
        if self.runtimes.contains_key(&track.id()) {
            return Err(EngineError::InvalidParameter {
                name: "track id",
                reason: format!("track {} is already live", track.id()),
            });
        }
        let runtime = self.wire(track, target, factory, bus)?;
        runtime.source.start();
        self.runtimes.insert(track.id(), runtime);
        Ok(())
    }

    /// Tear down a removed track's nodes
    pub fn detach(&mut self, id: TrackId, bus: &MixBus) {
        if let Some(runtime) = self.runtimes.remove(&id) {
            runtime.teardown(bus);
        }
    }

    fn teardown_all(runtimes: BTreeMap<TrackId, TrackRuntime>, bus: &MixBus) {
        for runtime in runtimes.into_values() {
            runtime.teardown(bus);
        }
    }

    /// Build, configure and connect one track's chain. On error every node
    /// created here is released by drop.
    fn wire(
        &mut self,
        track: &TrackConfig,
        target: MixTarget,
        factory: &SignalNodeFactory,
        bus: &MixBus,
    ) -> Result<TrackRuntime> {
        let source = match track.source() {
            SourceKind::Tone { shape, frequency } => {
                factory.create_source(shape, self.jitter(frequency, factory.nyquist()))?
            }
            SourceKind::Noise => factory.create_noise_source()?,
        };
        // Initial values are set, not ramped
        let gain = factory.create_gain(target.gain.clamp(0.0, 1.0))?;
        let pan = factory.create_pan(target.pan.clamp(-1.0, 1.0))?;

        source.connect(&gain)?;
        gain.connect(&pan)?;
        bus.connect(&pan)?;

        let pulse = if self.options.pulse.enabled && track.has_role(&self.options.percussive_roles)
        {
            let scheduler = PulseScheduler::start(
                &format!("track-{}", track.id()),
                std::sync::Arc::clone(gain.envelope()),
                &self.options.pulse,
            )?;
            #[cfg(test)]
            self.started_pulses
                .push(std::sync::Arc::clone(scheduler.trigger()));
            Some(scheduler)
        } else {
            None
        };

        Ok(TrackRuntime {
            pulse,
            source,
            gain,
            pan,
        })
    }

    /// Detuned frequency, kept below `nyquist` whenever `frequency` is
    fn jitter(&mut self, frequency: f32, nyquist: f32) -> f32 {
        let ratio = self.options.frequency_jitter.abs();
        if ratio > 0.0 {
            let detuned = frequency * (1.0 + self.rng.gen_range(-ratio..=ratio));
            detuned.min((nyquist * 0.999).max(frequency))
        } else {
            frequency
        }
    }
}
