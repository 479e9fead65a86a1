//! Track configuration.
//!
//! `TrackConfig` holds only user-facing settings. Live nodes are owned by the
//! transport (see `transport::TrackRuntime`) and never stored here.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::nodes::WaveformShape;
use crate::error::{EngineError, Result};

pub const MIN_VOLUME: i32 = 0;
pub const MAX_VOLUME: i32 = 100;
pub const MIN_PAN: i32 = -100;
pub const MAX_PAN: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a track plays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    Tone { shape: WaveformShape, frequency: f32 },
    Noise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    id: TrackId,
    name: String,
    source: SourceKind,
    volume: u8,
    pan: i8,
    mute: bool,
    solo: bool,
}

impl TrackConfig {
    pub fn new(id: TrackId, name: impl Into<String>, source: SourceKind) -> Result<Self> {
        if let SourceKind::Tone { frequency, .. } = source {
            if !frequency.is_finite() || frequency <= 0.0 {
                return Err(EngineError::InvalidParameter {
                    name: "frequency",
                    reason: format!("{} Hz is not a positive frequency", frequency),
                });
            }
        }
        Ok(Self {
            id,
            name: name.into(),
            source,
            volume: 80,
            pan: 0,
            mute: false,
            solo: false,
        })
    }

    pub fn with_volume(mut self, volume: i32) -> Result<Self> {
        self.volume = validate_volume(volume)?;
        Ok(self)
    }

    pub fn with_pan(mut self, pan: i32) -> Result<Self> {
        self.pan = validate_pan(pan)?;
        Ok(self)
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn pan(&self) -> i8 {
        self.pan
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn is_soloed(&self) -> bool {
        self.solo
    }

    /// Whether the name designates one of the given percussive roles
    pub fn has_role(&self, roles: &[String]) -> bool {
        let name = self.name.to_lowercase();
        roles
            .iter()
            .any(|role| !role.is_empty() && name.contains(&role.to_lowercase()))
    }
}

fn validate_volume(volume: i32) -> Result<u8> {
    if !(MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
        return Err(EngineError::out_of_range("volume", volume, MIN_VOLUME, MAX_VOLUME));
    }
    Ok(volume as u8)
}

fn validate_pan(pan: i32) -> Result<i8> {
    if !(MIN_PAN..=MAX_PAN).contains(&pan) {
        return Err(EngineError::out_of_range("pan", pan, MIN_PAN, MAX_PAN));
    }
    Ok(pan as i8)
}

/// Ordered set of track configurations for a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackList {
    tracks: Vec<TrackConfig>,
}

impl TrackList {
    pub fn new(tracks: Vec<TrackConfig>) -> Result<Self> {
        let mut list = Self::default();
        for track in tracks {
            list.insert(track)?;
        }
        Ok(list)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackConfig> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackConfig> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&TrackConfig> {
        self.tracks
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// Next unused id
    pub fn next_id(&self) -> TrackId {
        TrackId(self.tracks.iter().map(|t| t.id.0 + 1).max().unwrap_or(1))
    }

    pub fn insert(&mut self, track: TrackConfig) -> Result<()> {
        if self.get(track.id).is_some() {
            return Err(EngineError::InvalidParameter {
                name: "track id",
                reason: format!("track {} already exists", track.id),
            });
        }
        self.tracks.push(track);
        Ok(())
    }

    pub fn remove(&mut self, id: TrackId) -> Result<TrackConfig> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(EngineError::UnknownTrack(id))?;
        Ok(self.tracks.remove(index))
    }

    fn get_mut(&mut self, id: TrackId) -> Result<&mut TrackConfig> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(EngineError::UnknownTrack(id))
    }

    pub fn set_volume(&mut self, id: TrackId, volume: i32) -> Result<()> {
        let volume = validate_volume(volume)?;
        self.get_mut(id)?.volume = volume;
        Ok(())
    }

    pub fn set_pan(&mut self, id: TrackId, pan: i32) -> Result<()> {
        let pan = validate_pan(pan)?;
        self.get_mut(id)?.pan = pan;
        Ok(())
    }

    pub fn set_mute(&mut self, id: TrackId, mute: bool) -> Result<()> {
        self.get_mut(id)?.mute = mute;
        Ok(())
    }

    pub fn set_solo(&mut self, id: TrackId, solo: bool) -> Result<()> {
        self.get_mut(id)?.solo = solo;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a TrackList {
    type Item = &'a TrackConfig;
    type IntoIter = std::slice::Iter<'a, TrackConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

/// The eight tracks every session starts with
pub fn default_roster() -> TrackList {
    use WaveformShape::*;

    let entries: [(&str, SourceKind, i32, i32); 8] = [
        ("Kick", SourceKind::Tone { shape: Sine, frequency: 55.0 }, 90, 0),
        ("Bass", SourceKind::Tone { shape: Sawtooth, frequency: 110.0 }, 80, 0),
        ("Lead Synth", SourceKind::Tone { shape: Square, frequency: 440.0 }, 60, 20),
        ("Pad", SourceKind::Tone { shape: Triangle, frequency: 220.0 }, 50, -30),
        ("Hi-Hat", SourceKind::Noise, 35, 40),
        ("Arp", SourceKind::Tone { shape: Square, frequency: 660.0 }, 45, -40),
        ("Sub", SourceKind::Tone { shape: Sine, frequency: 41.2 }, 70, 0),
        ("Riser", SourceKind::Tone { shape: Sawtooth, frequency: 880.0 }, 30, 60),
    ];

    let tracks = entries
        .into_iter()
        .enumerate()
        .map(|(i, (name, source, volume, pan))| TrackConfig {
            id: TrackId(i as u32 + 1),
            name: name.to_string(),
            source,
            volume: volume as u8,
            pan: pan as i8,
            mute: false,
            solo: false,
        })
        .collect();

    TrackList { tracks }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster() {
        let roster = default_roster();
        assert_eq!(roster.len(), 8);
        assert!(!roster.any_solo());
        assert_eq!(roster.find_by_name("bass").unwrap().volume(), 80);

        let mut ids: Vec<_> = roster.iter().map(|t| t.id()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(roster.next_id(), TrackId(9));
    }

    #[test]
    fn test_setters_validate_and_leave_value_unchanged() {
        let mut roster = default_roster();
        let bass = roster.find_by_name("Bass").unwrap().id();

        assert!(matches!(
            roster.set_volume(bass, 101),
            Err(EngineError::OutOfRange { name: "volume", .. })
        ));
        assert!(roster.set_volume(bass, -1).is_err());
        assert!(roster.set_pan(bass, 101).is_err());
        assert!(roster.set_pan(bass, -101).is_err());

        let track = roster.get(bass).unwrap();
        assert_eq!(track.volume(), 80);
        assert_eq!(track.pan(), 0);

        roster.set_volume(bass, 0).unwrap();
        roster.set_pan(bass, -100).unwrap();
        assert_eq!(roster.get(bass).unwrap().volume(), 0);
        assert_eq!(roster.get(bass).unwrap().pan(), -100);
    }

    #[test]
    fn test_unknown_track() {
        let mut roster = default_roster();
        assert!(matches!(
            roster.set_mute(TrackId(99), true),
            Err(EngineError::UnknownTrack(TrackId(99)))
        ));
    }

    #[test]
    fn test_roles() {
        let roster = default_roster();
        let roles = vec!["kick".to_string()];
        let percussive: Vec<_> = roster
            .iter()
            .filter(|t| t.has_role(&roles))
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(percussive, vec!["Kick"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let track = TrackConfig::new(TrackId(1), "A", SourceKind::Noise).unwrap();
        assert!(TrackList::new(vec![track.clone(), track]).is_err());
        assert!(TrackConfig::new(
            TrackId(2),
            "B",
            SourceKind::Tone {
                shape: WaveformShape::Sine,
                frequency: -5.0
            }
        )
        .is_err());
    }
}
