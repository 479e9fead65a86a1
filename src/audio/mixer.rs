//! Effective gain / pan resolution across all tracks.
//!
//! Solo on any track silences every non-soloed track, so a change to one track
//! can change the effective gain of all of them. Resolution always runs over
//! the whole roster with a single `any_solo` value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::track::{TrackConfig, TrackId, TrackList};
use super::transport::TrackRuntime;

/// Default smoothing time constant for parameter changes (seconds)
pub const DEFAULT_RAMP_SECONDS: f32 = 0.1;

/// Values actually applied to a track's live nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixTarget {
    pub gain: f32,
    pub pan: f32,
}

pub fn effective_gain(track: &TrackConfig, any_solo: bool) -> f32 {
    if track.is_muted() {
        0.0
    } else if track.is_soloed() {
        1.0
    } else if any_solo {
        0.0
    } else {
        track.volume() as f32 / 100.0
    }
}

pub fn effective_pan(track: &TrackConfig) -> f32 {
    track.pan() as f32 / 100.0
}

pub struct MixerController {
    ramp_seconds: f32,
    /// Last resolved targets, latched into nodes at the next play when stopped
    targets: BTreeMap<TrackId, MixTarget>,
}

impl MixerController {
    pub fn new(ramp_seconds: f32) -> Self {
        Self {
            ramp_seconds: ramp_seconds.max(0.0),
            targets: BTreeMap::new(),
        }
    }

    pub fn ramp_seconds(&self) -> f32 {
        self.ramp_seconds
    }

    /// Resolve every track against one `any_solo` value
    pub fn resolve(&mut self, tracks: &TrackList) -> &BTreeMap<TrackId, MixTarget> {
        let any_solo = tracks.any_solo();
        self.targets = tracks
            .iter()
            .map(|track| {
                (
                    track.id(),
                    MixTarget {
                        gain: effective_gain(track, any_solo),
                        pan: effective_pan(track),
                    },
                )
            })
            .collect();
        &self.targets
    }

    pub fn target(&self, id: TrackId) -> Option<MixTarget> {
        self.targets.get(&id).copied()
    }

    pub fn targets(&self) -> &BTreeMap<TrackId, MixTarget> {
        &self.targets
    }

    /// Re-resolve and ramp every live track toward its new target (a zero ramp
    /// time jumps). Tracks without live nodes only get their stored target updated.
    pub fn apply(&mut self, tracks: &TrackList, runtimes: &BTreeMap<TrackId, TrackRuntime>) {
        let ramp = self.ramp_seconds;
        for (id, target) in self.resolve(tracks) {
            if let Some(runtime) = runtimes.get(id) {
                if ramp > 0.0 {
                    runtime.gain.gain().set_target(target.gain, ramp);
                    runtime.pan.pan().set_target(target.pan, ramp);
                } else {
                    runtime.gain.gain().set_value(target.gain);
                    runtime.pan.pan().set_value(target.pan);
                }
            }
        }
    }

    /// Forget a removed track
    pub fn forget(&mut self, id: TrackId) {
        self.targets.remove(&id);
    }
}

impl Default for MixerController {
    fn default() -> Self {
        Self::new(DEFAULT_RAMP_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::default_roster;

    fn gains(mixer: &mut MixerController, tracks: &TrackList) -> Vec<f32> {
        mixer.resolve(tracks).values().map(|t| t.gain).collect()
    }

    #[test]
    fn test_gain_is_volume_without_solo() {
        let roster = default_roster();
        let mut mixer = MixerController::default();
        mixer.resolve(&roster);
        for track in &roster {
            let target = mixer.target(track.id()).unwrap();
            assert_eq!(target.gain, track.volume() as f32 / 100.0);
            assert_eq!(target.pan, track.pan() as f32 / 100.0);
        }
    }

    #[test]
    fn test_solo_silences_other_tracks() {
        let mut roster = default_roster();
        let bass = roster.find_by_name("Bass").unwrap().id();
        roster.set_solo(bass, true).unwrap();

        let mut mixer = MixerController::default();
        mixer.resolve(&roster);
        for track in &roster {
            let gain = mixer.target(track.id()).unwrap().gain;
            if track.id() == bass {
                assert_eq!(gain, 1.0);
            } else {
                assert_eq!(gain, 0.0, "{} should be silenced", track.name());
            }
        }
    }

    #[test]
    fn test_mute_wins_over_solo() {
        let mut roster = default_roster();
        let kick = roster.find_by_name("Kick").unwrap().id();
        let pad = roster.find_by_name("Pad").unwrap().id();
        roster.set_solo(kick, true).unwrap();
        roster.set_mute(kick, true).unwrap();
        roster.set_solo(pad, true).unwrap();

        let mut mixer = MixerController::default();
        mixer.resolve(&roster);
        assert_eq!(mixer.target(kick).unwrap().gain, 0.0);
        assert_eq!(mixer.target(pad).unwrap().gain, 1.0);
    }

    #[test]
    fn test_unsolo_reverts_to_volume() {
        let mut roster = default_roster();
        let mut mixer = MixerController::default();
        let before = gains(&mut mixer, &roster);

        let arp = roster.find_by_name("Arp").unwrap().id();
        roster.set_solo(arp, true).unwrap();
        assert_ne!(gains(&mut mixer, &roster), before);

        roster.set_solo(arp, false).unwrap();
        assert_eq!(gains(&mut mixer, &roster), before);
    }

    #[test]
    fn test_exhaustive_single_track_table() {
        let base = default_roster().find_by_name("Lead Synth").unwrap().clone();
        for mute in [false, true] {
            for solo in [false, true] {
                for any_solo in [false, true] {
                    let mut list = TrackList::new(vec![base.clone()]).unwrap();
                    list.set_mute(base.id(), mute).unwrap();
                    list.set_solo(base.id(), solo).unwrap();
                    let track = list.get(base.id()).unwrap();
                    let expected = if mute {
                        0.0
                    } else if solo {
                        1.0
                    } else if any_solo {
                        0.0
                    } else {
                        0.6
                    };
                    assert_eq!(effective_gain(track, any_solo), expected);
                }
            }
        }
    }
}
