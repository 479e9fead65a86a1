//! Command surface for the mixing engine
//!
//! Thin wrappers over the global engine handle; errors are flattened to strings
//! for the UI layer.

use serde::{Deserialize, Serialize};

use crate::audio::{
    device::{list_output_devices, AudioDeviceInfo},
    engine::{engine_handle, init_engine, shutdown_engine, AudioEngineHandle, EngineStatus},
    track::{SourceKind, TrackConfig, TrackId},
    transport::TransportState,
};
use crate::config::EngineSettings;

/// Compact state for polling from the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerState {
    pub state: TransportState,
    pub master_level: f32,
    pub spectrum: Vec<f32>,
}

fn handle() -> Result<AudioEngineHandle, String> {
    engine_handle().map_err(|e| e.to_string())
}

/// Initialize the audio engine from settings
pub fn init_mixer_engine(settings: &EngineSettings) -> Result<(), String> {
    init_engine(settings).map_err(|e| e.to_string())
}

/// Shutdown the audio engine
pub fn shutdown_mixer_engine() {
    shutdown_engine();
}

/// Get list of available audio output devices
pub fn get_audio_devices() -> Result<Vec<AudioDeviceInfo>, String> {
    list_output_devices().map_err(|e| e.to_string())
}

pub fn mixer_play() -> Result<TransportState, String> {
    handle()?.play().map_err(|e| e.to_string())
}

pub fn mixer_stop() -> Result<TransportState, String> {
    Ok(handle()?.stop())
}

pub fn mixer_get_state() -> Result<MixerState, String> {
    let handle = handle()?;
    Ok(MixerState {
        state: handle.state(),
        master_level: handle.master_level(),
        spectrum: handle.spectrum().bands.to_vec(),
    })
}

pub fn mixer_get_status() -> Result<EngineStatus, String> {
    Ok(handle()?.status())
}

pub fn mixer_list_tracks() -> Result<Vec<TrackConfig>, String> {
    Ok(handle()?.tracks().iter().cloned().collect())
}

/// Resolve a track name (case-insensitive) to its id
pub fn mixer_find_track(name: &str) -> Result<u32, String> {
    handle()?
        .find_track(name)
        .map(|id| id.0)
        .ok_or_else(|| format!("No track named {:?}", name))
}

pub fn mixer_set_volume(track_id: u32, volume: i32) -> Result<(), String> {
    handle()?
        .set_track_volume(TrackId(track_id), volume)
        .map_err(|e| e.to_string())
}

pub fn mixer_set_pan(track_id: u32, pan: i32) -> Result<(), String> {
    handle()?
        .set_track_pan(TrackId(track_id), pan)
        .map_err(|e| e.to_string())
}

pub fn mixer_set_mute(track_id: u32, mute: bool) -> Result<(), String> {
    handle()?
        .set_track_mute(TrackId(track_id), mute)
        .map_err(|e| e.to_string())
}

pub fn mixer_set_solo(track_id: u32, solo: bool) -> Result<(), String> {
    handle()?
        .set_track_solo(TrackId(track_id), solo)
        .map_err(|e| e.to_string())
}

pub fn mixer_set_master_level(level: f32) -> Result<(), String> {
    handle()?.set_master_level(level).map_err(|e| e.to_string())
}

pub fn mixer_get_master_level() -> Result<f32, String> {
    Ok(handle()?.master_level())
}

/// Get spectrum bands (0 - 100)
pub fn mixer_get_spectrum() -> Result<Vec<f32>, String> {
    Ok(handle()?.spectrum().bands.to_vec())
}

pub fn mixer_add_track(
    name: String,
    source: SourceKind,
    volume: i32,
    pan: i32,
) -> Result<u32, String> {
    handle()?
        .add_track(&name, source, volume, pan)
        .map(|id| id.0)
        .map_err(|e| e.to_string())
}

pub fn mixer_remove_track(track_id: u32) -> Result<(), String> {
    handle()?
        .remove_track(TrackId(track_id))
        .map(|_| ())
        .map_err(|e| e.to_string())
}
