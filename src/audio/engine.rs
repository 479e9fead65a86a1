//! Mixing engine: the roster, transport, mixer and spectrum sampler behind one handle.
//!
//! All control operations go through a single mutex, so a configuration change
//! and the mixer re-application it triggers are atomic with respect to every
//! other control operation. The render thread never takes that lock.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::bus::MixBus;
use super::context::{ContextOptions, OutputStream, ProcessingContext, RenderPump};
use super::factory::SignalNodeFactory;
use super::mixer::{MixTarget, MixerController};
use super::sampler::SpectrumSampler;
use super::spectrum::SpectrumSnapshot;
use super::track::{default_roster, SourceKind, TrackConfig, TrackId, TrackList};
use super::transport::{Transport, TransportOptions, TransportState};
use crate::config::EngineSettings;
use crate::error::{EngineError, Result};

/// Control-plane state, guarded as a unit
struct ControlState {
    tracks: TrackList,
    transport: Transport,
    mixer: MixerController,
    sampler: SpectrumSampler,
}

struct SharedState {
    control: Mutex<ControlState>,
    factory: SignalNodeFactory,
    bus: MixBus,
}

/// Per-track entry of [`EngineStatus`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackStatus {
    pub config: TrackConfig,
    pub effective: MixTarget,
    pub live: bool,
}

/// Serializable snapshot of the whole engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: TransportState,
    pub master_level: f32,
    pub sample_rate: u32,
    pub tracks: Vec<TrackStatus>,
    /// Nodes allocated for tracks (bus nodes excluded)
    pub track_nodes: usize,
    pub spectrum: SpectrumSnapshot,
}

/// Handle to control the engine from any thread
#[derive(Clone)]
pub struct AudioEngineHandle {
    shared: Arc<SharedState>,
}

impl AudioEngineHandle {
    fn new(context: ProcessingContext, settings: &EngineSettings, tracks: TrackList) -> Result<Self> {
        let factory = SignalNodeFactory::new(context);
        for track in &tracks {
            if let SourceKind::Tone { frequency, .. } = track.source() {
                factory.check_frequency(frequency)?;
            }
        }
        let bus = MixBus::new(&factory, settings.master_level, settings.ramp_seconds)?;
        let transport = Transport::new(TransportOptions {
            frequency_jitter: settings.frequency_jitter,
            pulse: settings.pulse.clone(),
            percussive_roles: settings.percussive_roles.clone(),
        });

        let mut mixer = MixerController::new(settings.ramp_seconds);
        mixer.resolve(&tracks);

        Ok(Self {
            shared: Arc::new(SharedState {
                control: Mutex::new(ControlState {
                    tracks,
                    transport,
                    mixer,
                    sampler: SpectrumSampler::new(Duration::from_millis(
                        settings.sampler_interval_ms,
                    )),
                }),
                factory,
                bus,
            }),
        })
    }

    /// Wire every track and start playback; no-op when already playing.
    /// On failure nothing stays allocated and the state remains Stopped.
    pub fn play(&self) -> Result<TransportState> {
        log::info!("AudioEngine: play() called");
        let mut guard = self.shared.control.lock();
        let control = &mut *guard;
        if control.transport.is_playing() {
            return Ok(TransportState::Playing);
        }

        control.transport.play(
            &control.tracks,
            &mut control.mixer,
            &self.shared.factory,
            &self.shared.bus,
        )?;

        if let Err(e) = control.sampler.start(self.shared.bus.analyzer_readout()) {
            log::error!("AudioEngine: spectrum sampler failed to start: {}", e);
            control.transport.stop(&self.shared.bus);
            return Err(e);
        }
        Ok(TransportState::Playing)
    }

    /// Tear every track down and reset the spectrum; no-op when already stopped
    pub fn stop(&self) -> TransportState {
        log::info!("AudioEngine: stop() called");
        let mut control = self.shared.control.lock();
        if !control.transport.is_playing() {
            return TransportState::Stopped;
        }
        control.sampler.stop();
        let state = control.transport.stop(&self.shared.bus);
        self.shared.bus.analyzer_readout().request_reset();
        state
    }

    pub fn state(&self) -> TransportState {
        self.shared.control.lock().transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    pub fn tracks(&self) -> TrackList {
        self.shared.control.lock().tracks.clone()
    }

    pub fn track(&self, id: TrackId) -> Option<TrackConfig> {
        self.shared.control.lock().tracks.get(id).cloned()
    }

    pub fn find_track(&self, name: &str) -> Option<TrackId> {
        self.shared
            .control
            .lock()
            .tracks
            .find_by_name(name)
            .map(|t| t.id())
    }

    /// Apply one roster mutation, then re-resolve every track
    fn configure<F>(&self, id: TrackId, change: F) -> Result<()>
    where
        F: FnOnce(&mut TrackList) -> Result<()>,
    {
        let mut guard = self.shared.control.lock();
        let control = &mut *guard;
        change(&mut control.tracks)?;
        control
            .mixer
            .apply(&control.tracks, control.transport.runtimes());
        log::debug!(
            "AudioEngine: track {} now {:?}",
            id,
            control.mixer.target(id)
        );
        Ok(())
    }

    pub fn set_track_volume(&self, id: TrackId, volume: i32) -> Result<()> {
        self.configure(id, |tracks| tracks.set_volume(id, volume))
    }

    pub fn set_track_pan(&self, id: TrackId, pan: i32) -> Result<()> {
        self.configure(id, |tracks| tracks.set_pan(id, pan))
    }

    pub fn set_track_mute(&self, id: TrackId, mute: bool) -> Result<()> {
        self.configure(id, |tracks| tracks.set_mute(id, mute))
    }

    pub fn set_track_solo(&self, id: TrackId, solo: bool) -> Result<()> {
        self.configure(id, |tracks| tracks.set_solo(id, solo))
    }

    /// Master level (0.0 - 1.0); independent of every track's mix
    pub fn set_master_level(&self, level: f32) -> Result<()> {
        self.shared.bus.set_master_level(level)
    }

    pub fn master_level(&self) -> f32 {
        self.shared.bus.master_level()
    }

    pub fn spectrum(&self) -> SpectrumSnapshot {
        self.shared.control.lock().sampler.snapshot()
    }

    /// Effective gain/pan of every track as of the last configuration change
    pub fn effective_mix(&self) -> BTreeMap<TrackId, MixTarget> {
        self.shared.control.lock().mixer.targets().clone()
    }

    pub fn has_live_nodes(&self, id: TrackId) -> bool {
        self.shared.control.lock().transport.runtime(id).is_some()
    }

    /// Nodes currently allocated for tracks
    pub fn track_node_count(&self) -> usize {
        self.shared
            .factory
            .context()
            .live_node_count()
            .saturating_sub(MixBus::NODE_COUNT)
    }

    /// Append a track; wired immediately while playing.
    /// If wiring fails the roster is left unchanged.
    pub fn add_track(
        &self,
        name: &str,
        source: SourceKind,
        volume: i32,
        pan: i32,
    ) -> Result<TrackId> {
        let mut guard = self.shared.control.lock();
        let control = &mut *guard;

        if let SourceKind::Tone { frequency, .. } = source {
            self.shared.factory.check_frequency(frequency)?;
        }
        let id = control.tracks.next_id();
        let track = TrackConfig::new(id, name, source)?
            .with_volume(volume)?
            .with_pan(pan)?;

        let mut tracks = control.tracks.clone();
        tracks.insert(track.clone())?;
        let target = control
            .mixer
            .resolve(&tracks)
            .get(&id)
            .copied()
            .unwrap_or(MixTarget { gain: 0.0, pan: 0.0 });

        if let Err(e) =
            control
                .transport
                .attach(&track, target, &self.shared.factory, &self.shared.bus)
        {
            control.mixer.resolve(&control.tracks);
            return Err(e);
        }

        control.tracks = tracks;
        control
            .mixer
            .apply(&control.tracks, control.transport.runtimes());
        log::info!("AudioEngine: added track {} ({})", id, name);
        Ok(id)
    }

    /// Remove a track, tearing down its live nodes
    pub fn remove_track(&self, id: TrackId) -> Result<TrackConfig> {
        let mut guard = self.shared.control.lock();
        let control = &mut *guard;

        let removed = control.tracks.remove(id)?;
        control.transport.detach(id, &self.shared.bus);
        control.mixer.forget(id);
        // Removing a soloed track can un-silence the others
        control
            .mixer
            .apply(&control.tracks, control.transport.runtimes());
        log::info!("AudioEngine: removed track {} ({})", id, removed.name());
        Ok(removed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.factory.context().sample_rate()
    }

    pub fn status(&self) -> EngineStatus {
        let control = self.shared.control.lock();
        let tracks = control
            .tracks
            .iter()
            .map(|track| TrackStatus {
                config: track.clone(),
                effective: control
                    .mixer
                    .target(track.id())
                    .unwrap_or(MixTarget { gain: 0.0, pan: 0.0 }),
                live: control.transport.runtime(track.id()).is_some(),
            })
            .collect();

        EngineStatus {
            state: control.transport.state(),
            master_level: self.shared.bus.master_level(),
            sample_rate: self.sample_rate(),
            tracks,
            track_nodes: self.track_node_count(),
            spectrum: control.sampler.snapshot(),
        }
    }
}

/// Owns whatever drives rendering (device stream or render pump) plus the handle
pub struct AudioEngine {
    _stream: Option<OutputStream>,
    _pump: Option<RenderPump>,
    context: ProcessingContext,
    handle: AudioEngineHandle,
}

impl AudioEngine {
    /// Create the engine on an output device, or on a paced offline context
    /// when `settings.headless` is set
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        settings.validate()?;
        if settings.headless {
            let mut engine = Self::offline(settings)?;
            let block_frames = settings.audio.buffer_size.max(64) as usize;
            engine._pump = Some(RenderPump::start(engine.context.clone(), block_frames)?);
            log::info!("Audio engine running headless");
            return Ok(engine);
        }

        let (context, stream) = ProcessingContext::open(
            settings.device_name.as_deref(),
            &settings.audio,
            settings.max_nodes,
        )?;
        let handle = AudioEngineHandle::new(context.clone(), settings, default_roster())?;
        Ok(Self {
            _stream: Some(stream),
            _pump: None,
            context,
            handle,
        })
    }

    /// Create the engine on an offline context rendered only through [`Self::context`]
    pub fn offline(settings: &EngineSettings) -> Result<Self> {
        Self::offline_with_tracks(settings, default_roster())
    }

    pub fn offline_with_tracks(settings: &EngineSettings, tracks: TrackList) -> Result<Self> {
        settings.validate()?;
        let context = ProcessingContext::offline(ContextOptions {
            sample_rate: settings.audio.sample_rate,
            channels: settings.audio.channels,
            max_nodes: settings.max_nodes,
        })?;
        let handle = AudioEngineHandle::new(context.clone(), settings, tracks)?;
        Ok(Self {
            _stream: None,
            _pump: None,
            context,
            handle,
        })
    }

    /// Get a handle to control the engine
    pub fn handle(&self) -> AudioEngineHandle {
        self.handle.clone()
    }

    pub fn context(&self) -> &ProcessingContext {
        &self.context
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

// Global engine handle (cpal::Stream isn't Send/Sync, so we store just the handle)
static ENGINE_HANDLE: once_cell::sync::OnceCell<RwLock<Option<AudioEngineHandle>>> =
    once_cell::sync::OnceCell::new();

// First fatal initialization error; the engine is not retried after one
static INIT_FAILURE: once_cell::sync::OnceCell<String> = once_cell::sync::OnceCell::new();

/// Initialize the global audio engine
pub fn init_engine(settings: &EngineSettings) -> Result<()> {
    let cell = ENGINE_HANDLE.get_or_init(|| RwLock::new(None));
    install_engine(cell, &INIT_FAILURE, || AudioEngine::new(settings))
}

/// Build and install an engine unless one is installed already. The slot's
/// write lock is held across the build, so concurrent callers build at most once.
fn install_engine<F>(
    slot: &RwLock<Option<AudioEngineHandle>>,
    failure: &once_cell::sync::OnceCell<String>,
    build: F,
) -> Result<()>
where
    F: FnOnce() -> Result<AudioEngine>,
{
    let mut installed = slot.write();
    if let Some(reason) = failure.get() {
        return Err(EngineError::ContextUnavailable(reason.clone()));
    }
    if installed.is_some() {
        log::debug!("Audio engine already initialized, reusing existing instance");
        return Ok(());
    }

    let engine = match build() {
        Ok(engine) => engine,
        Err(EngineError::ContextUnavailable(reason)) => {
            log::error!("Audio engine unavailable for this session: {}", reason);
            let reason = failure.get_or_init(|| reason).clone();
            return Err(EngineError::ContextUnavailable(reason));
        }
        Err(e) => return Err(e),
    };

    *installed = Some(engine.handle());
    drop(installed);

    // The stream must outlive every handle; it lives for the process
    std::mem::forget(engine);

    log::info!("Audio engine initialized successfully");
    Ok(())
}

/// Get the global engine handle
pub fn get_engine_handle() -> Option<AudioEngineHandle> {
    ENGINE_HANDLE.get().and_then(|cell| cell.read().clone())
}

/// Get the global engine handle or `NotInitialized`
pub fn engine_handle() -> Result<AudioEngineHandle> {
    get_engine_handle().ok_or(EngineError::NotInitialized)
}

/// Stop playback and release the global handle
pub fn shutdown_engine() {
    if let Some(cell) = ENGINE_HANDLE.get() {
        if let Some(handle) = cell.write().take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::nodes::WaveformShape;
    use crate::audio::spectrum::NUM_BANDS;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> AudioEngine {
        AudioEngine::offline(&EngineSettings {
            frequency_jitter: 0.0,
            ..Default::default()
        })
        .unwrap()
    }

    fn gain_of(handle: &AudioEngineHandle, name: &str) -> f32 {
        let id = handle.find_track(name).unwrap();
        handle.effective_mix()[&id].gain
    }

    fn render(engine: &AudioEngine, frames: usize) {
        let mut block = vec![0.0f32; 256 * engine.context().channels()];
        for _ in 0..frames / 256 {
            engine.context().render(&mut block);
        }
    }

    #[test]
    fn test_default_session_scenario() {
        let engine = engine();
        let handle = engine.handle();
        assert_eq!(handle.play().unwrap(), TransportState::Playing);

        for track in &handle.tracks() {
            assert_eq!(
                handle.effective_mix()[&track.id()].gain,
                track.volume() as f32 / 100.0
            );
            assert!(handle.has_live_nodes(track.id()));
        }
        assert_eq!(gain_of(&handle, "Bass"), 0.8);

        let bass = handle.find_track("Bass").unwrap();
        handle.set_track_solo(bass, true).unwrap();
        for track in &handle.tracks() {
            let expected = if track.id() == bass { 1.0 } else { 0.0 };
            assert_eq!(handle.effective_mix()[&track.id()].gain, expected);
        }

        // Live nodes ramp toward the same targets, soloed or not
        let kick = handle.find_track("Kick").unwrap();
        {
            let control = handle.shared.control.lock();
            let runtime = control.transport.runtime(bass).unwrap();
            assert_eq!(runtime.gain().gain().target(), 1.0);
            assert_eq!(runtime.gain().gain().time_constant(), 0.1);

            let silenced = control.transport.runtime(kick).unwrap();
            assert_eq!(silenced.gain().gain().target(), 0.0);
            assert_eq!(silenced.gain().gain().time_constant(), 0.1);
        }

        handle.set_track_solo(bass, false).unwrap();
        for track in &handle.tracks() {
            assert_eq!(
                handle.effective_mix()[&track.id()].gain,
                track.volume() as f32 / 100.0
            );
        }

        assert_eq!(handle.stop(), TransportState::Stopped);
        for track in &handle.tracks() {
            assert!(!handle.has_live_nodes(track.id()));
        }
        assert!(handle.spectrum().is_baseline());
        assert_eq!(handle.track_node_count(), 0);
    }

    #[test]
    fn test_play_stop_round_trip_keeps_configuration() {
        let engine = engine();
        let handle = engine.handle();
        let before = handle.tracks();
        let mix_before = handle.effective_mix();

        handle.play().unwrap();
        handle.stop();

        assert_eq!(handle.tracks(), before);
        assert_eq!(handle.effective_mix(), mix_before);
        assert_eq!(handle.master_level(), 0.8);
    }

    #[test]
    fn test_repeated_transitions_do_not_leak() {
        let engine = engine();
        let handle = engine.handle();

        handle.play().unwrap();
        handle.play().unwrap();
        assert_eq!(handle.track_node_count(), 8 * 3);

        for _ in 0..3 {
            handle.stop();
            assert_eq!(handle.track_node_count(), 0);
        }

        for _ in 0..5 {
            handle.play().unwrap();
            handle.stop();
        }
        assert_eq!(handle.track_node_count(), 0);
        assert_eq!(engine.context().running_sources(), 0);
    }

    #[test]
    fn test_failed_play_reports_and_stays_stopped() {
        let engine = AudioEngine::offline(&EngineSettings {
            max_nodes: Some(MixBus::NODE_COUNT + 3 * 3),
            ..Default::default()
        })
        .unwrap();
        let handle = engine.handle();

        let err = handle.play().unwrap_err();
        assert!(matches!(err, EngineError::NodeCreation { .. }));
        assert_eq!(handle.state(), TransportState::Stopped);
        assert_eq!(handle.track_node_count(), 0);
        assert!(handle.tracks().iter().all(|t| !handle.has_live_nodes(t.id())));

        // Freeing room lets the caller retry
        for name in ["Arp", "Sub", "Riser", "Hi-Hat", "Pad"] {
            let id = handle.find_track(name).unwrap();
            handle.remove_track(id).unwrap();
        }
        assert_eq!(handle.play().unwrap(), TransportState::Playing);
        assert_eq!(handle.track_node_count(), 9);
    }

    #[test]
    fn test_master_level_is_orthogonal() {
        let engine = engine();
        let handle = engine.handle();
        let kick = handle.find_track("Kick").unwrap();
        handle.set_track_mute(kick, true).unwrap();
        let mix = handle.effective_mix();

        handle.set_master_level(0.3).unwrap();
        assert_eq!(handle.effective_mix(), mix);
        assert_eq!(handle.master_level(), 0.3);

        assert!(handle.set_master_level(-0.1).is_err());
        assert_eq!(handle.master_level(), 0.3);
        assert_eq!(handle.effective_mix(), mix);
    }

    #[test]
    fn test_invalid_setters_leave_state_unchanged() {
        let engine = engine();
        let handle = engine.handle();
        let lead = handle.find_track("Lead Synth").unwrap();
        let before = handle.tracks();

        assert!(handle.set_track_volume(lead, 150).is_err());
        assert!(handle.set_track_pan(lead, -120).is_err());
        assert!(matches!(
            handle.set_track_solo(TrackId(42), true),
            Err(EngineError::UnknownTrack(_))
        ));
        assert_eq!(handle.tracks(), before);
    }

    #[test]
    fn test_changes_while_stopped_latch_on_play() {
        let engine = engine();
        let handle = engine.handle();
        let pad = handle.find_track("Pad").unwrap();
        handle.set_track_volume(pad, 25).unwrap();
        handle.set_track_pan(pad, -100).unwrap();

        handle.play().unwrap();
        let control = handle.shared.control.lock();
        let runtime = control.transport.runtime(pad).unwrap();
        assert_eq!(runtime.gain().gain().target(), 0.25);
        assert_eq!(runtime.pan().pan().target(), -1.0);
        // Initial values are instant
        assert_eq!(runtime.gain().gain().time_constant(), 0.0);
    }

    #[test]
    fn test_spectrum_stays_in_bounds() {
        let engine = engine();
        let handle = engine.handle();
        handle.play().unwrap();
        render(&engine, 48000 / 4);

        let snapshot = SpectrumSampler::sample(&handle.shared.bus.analyzer_readout());
        assert_eq!(snapshot.bands.len(), NUM_BANDS);
        assert!(snapshot.bands.iter().all(|b| (0.0..=100.0).contains(b)));
        assert!(!snapshot.is_baseline());

        handle.stop();
        assert!(handle.spectrum().is_baseline());
        let after = SpectrumSampler::sample(&handle.shared.bus.analyzer_readout());
        assert!(after.is_baseline());
    }

    #[test]
    fn test_add_and_remove_tracks() {
        let engine = engine();
        let handle = engine.handle();
        handle.play().unwrap();

        let id = handle
            .add_track(
                "Bell",
                SourceKind::Tone {
                    shape: WaveformShape::Sine,
                    frequency: 1760.0,
                },
                40,
                10,
            )
            .unwrap();
        assert!(handle.has_live_nodes(id));
        assert_eq!(handle.effective_mix()[&id].gain, 0.4);
        assert_eq!(handle.track_node_count(), 9 * 3);

        // A soloed track that goes away stops silencing the rest
        handle.set_track_solo(id, true).unwrap();
        assert_eq!(gain_of(&handle, "Kick"), 0.0);
        handle.remove_track(id).unwrap();
        assert_eq!(gain_of(&handle, "Kick"), 0.9);
        assert_eq!(handle.track_node_count(), 8 * 3);
        assert!(handle.remove_track(id).is_err());
    }

    #[test]
    fn test_add_track_rejected_atomically() {
        let engine = AudioEngine::offline(&EngineSettings {
            max_nodes: Some(MixBus::NODE_COUNT + 8 * 3 + 1),
            frequency_jitter: 0.0,
            ..Default::default()
        })
        .unwrap();
        let handle = engine.handle();
        handle.play().unwrap();

        let before = handle.tracks();
        assert!(handle.add_track("Extra", SourceKind::Noise, 50, 0).is_err());
        assert_eq!(handle.tracks(), before);
        assert_eq!(handle.track_node_count(), 8 * 3);
        assert_eq!(handle.effective_mix().len(), 8);
    }

    #[test]
    fn test_add_track_rejects_frequency_above_nyquist() {
        let engine = engine();
        let handle = engine.handle();
        let before = handle.tracks();
        let air = |frequency| SourceKind::Tone {
            shape: WaveformShape::Sine,
            frequency,
        };

        let err = handle.add_track("Air", air(30_000.0), 50, 0).unwrap_err();
        assert!(matches!(err, EngineError::OutOfRange { .. }));
        assert!(handle.add_track("Air", air(24_000.0), 50, 0).is_err());
        assert_eq!(handle.tracks(), before);

        // Nothing poisoned the roster; play still succeeds
        assert_eq!(handle.play().unwrap(), TransportState::Playing);
        handle.stop();
    }

    #[test]
    fn test_offline_engine_validates_settings() {
        let err = AudioEngine::offline(&EngineSettings {
            master_level: 1.5,
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::Settings(_)));

        let roster = TrackList::new(vec![TrackConfig::new(
            TrackId(1),
            "Air",
            SourceKind::Tone {
                shape: WaveformShape::Sine,
                frequency: 30_000.0,
            },
        )
        .unwrap()])
        .unwrap();
        assert!(AudioEngine::offline_with_tracks(&EngineSettings::default(), roster).is_err());
    }

    #[test]
    fn test_concurrent_install_builds_one_engine() {
        let slot = RwLock::new(None);
        let failure = once_cell::sync::OnceCell::new();
        let builds = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    install_engine(&slot, &failure, || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(10));
                        AudioEngine::offline(&EngineSettings::default())
                    })
                    .unwrap();
                });
            }
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(slot.read().is_some());
    }

    #[test]
    fn test_fatal_install_is_not_retried() {
        let slot = RwLock::new(None);
        let failure = once_cell::sync::OnceCell::new();

        let err = install_engine(&slot, &failure, || {
            Err(EngineError::ContextUnavailable("no device".into()))
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::ContextUnavailable(_)));

        let err = install_engine(&slot, &failure, || -> Result<AudioEngine> {
            panic!("build must not run after a fatal failure")
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::ContextUnavailable(ref r) if r == "no device"));
        assert!(slot.read().is_none());
    }

    #[test]
    fn test_status_serializes() {
        let engine = engine();
        let handle = engine.handle();
        handle.play().unwrap();

        let status = handle.status();
        assert_eq!(status.state, TransportState::Playing);
        assert_eq!(status.tracks.len(), 8);
        assert!(status.tracks.iter().all(|t| t.live));
        assert_eq!(status.track_nodes, 24);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "playing");
        assert_eq!(json["spectrum"]["bands"].as_array().unwrap().len(), NUM_BANDS);
    }
}
