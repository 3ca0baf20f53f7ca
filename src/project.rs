//! `ProjectDoc` v2 (spec.md §3): tracks, clips-by-id, clipOrder, instances,
//! ui. Grounded on the teacher's `AppState`/`Project` split in `project.rs`
//! (id-keyed map plus an explicit order vec, `find_clip`/`find_clip_mut`
//! lookup helpers, `for_each_ordered_track_mut`), generalized from
//! sample-domain playback state to the spec's beat-domain document with an
//! explicit `clipOrder` sequence instead of an implicit `HashMap` iteration
//! order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::constants::{
    DEFAULT_GAIN_DB, DEFAULT_PX_PER_BEAT, DEFAULT_TRACK_INSTRUMENT, DEFAULT_TRACK_NAME,
    GAIN_DB_MAX, GAIN_DB_MIN,
};
use crate::idgen;
use crate::numeric::{coerce_bpm, coerce_transpose, set_beat_from_sec_free, set_beat_from_sec_snapped};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    pub instrument: String,
    pub gain_db: f64,
    pub muted: bool,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Track {
            id: idgen::track_id(),
            name: name.into(),
            instrument: DEFAULT_TRACK_INSTRUMENT.to_string(),
            gain_db: DEFAULT_GAIN_DB,
            muted: false,
        }
    }

    /// Repairs a track's fields in place per `normalizeProjectV2` (spec.md
    /// §4.4): a non-empty instrument is required, gain is clamped.
    pub fn repair(&mut self) {
        if self.instrument.trim().is_empty() {
            self.instrument = DEFAULT_TRACK_INSTRUMENT.to_string();
        }
        if !self.gain_db.is_finite() {
            self.gain_db = DEFAULT_GAIN_DB;
        }
        self.gain_db = self.gain_db.clamp(GAIN_DB_MIN, GAIN_DB_MAX);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub clip_id: String,
    pub track_id: String,
    pub start_beat: f64,
    pub transpose: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub px_per_beat: f64,
    pub playhead_beat: f64,
}

impl Default for UiState {
    fn default() -> Self {
        UiState { px_per_beat: DEFAULT_PX_PER_BEAT, playhead_beat: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDoc {
    pub version: u32,
    pub timebase: String,
    pub bpm: f64,
    pub tracks: Vec<Track>,
    pub clips: HashMap<String, Clip>,
    pub clip_order: Vec<String>,
    pub instances: Vec<Instance>,
    pub ui: UiState,
}

impl ProjectDoc {
    /// A fresh v2 project with one default track, used whenever the loader
    /// cannot recover anything usable from raw input (spec.md §4.4).
    pub fn new_default() -> Self {
        ProjectDoc {
            version: 2,
            timebase: "beat".to_string(),
            bpm: coerce_bpm(120.0),
            tracks: vec![Track::new(DEFAULT_TRACK_NAME)],
            clips: HashMap::new(),
            clip_order: Vec::new(),
            instances: Vec::new(),
            ui: UiState::default(),
        }
    }

    pub fn find_clip(&self, clip_id: &str) -> Option<&Clip> {
        self.clips.get(clip_id)
    }

    pub fn find_clip_mut(&mut self, clip_id: &str) -> Option<&mut Clip> {
        self.clips.get_mut(clip_id)
    }

    pub fn find_track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    /// First track id, used by invariant repair to rebind orphaned
    /// instances (spec.md §3 "Project invariants").
    pub fn first_track_id(&self) -> Option<String> {
        self.tracks.first().map(|t| t.id.clone())
    }

    /// Sets the playhead from a seconds value without grid snapping
    /// (spec.md §4.1 Free setter).
    pub fn set_playhead_free(&mut self, sec: f64) {
        self.ui.playhead_beat = set_beat_from_sec_free(sec, self.bpm).max(0.0);
    }

    /// Sets the playhead from a seconds value, snapping to `grid_beat`
    /// first (spec.md §4.1 Snapped setter).
    pub fn set_playhead_snapped(&mut self, sec: f64, grid_beat: f64) {
        self.ui.playhead_beat = set_beat_from_sec_snapped(sec, self.bpm, grid_beat).max(0.0);
    }

    /// Sets an instance's start beat from a seconds value without grid
    /// snapping.
    pub fn set_instance_start_free(&mut self, instance_id: &str, sec: f64) {
        let bpm = self.bpm;
        if let Some(instance) = self.instances.iter_mut().find(|i| i.id == instance_id) {
            instance.start_beat = set_beat_from_sec_free(sec, bpm).max(0.0);
        }
    }

    /// Sets an instance's start beat from a seconds value, snapping to
    /// `grid_beat` first.
    pub fn set_instance_start_snapped(&mut self, instance_id: &str, sec: f64, grid_beat: f64) {
        let bpm = self.bpm;
        if let Some(instance) = self.instances.iter_mut().find(|i| i.id == instance_id) {
            instance.start_beat = set_beat_from_sec_snapped(sec, bpm, grid_beat).max(0.0);
        }
    }

    pub fn add_instance(&mut self, clip_id: impl Into<String>, track_id: impl Into<String>, start_beat: f64, transpose: i32) -> String {
        let id = idgen::instance_id();
        self.instances.push(Instance {
            id: id.clone(),
            clip_id: clip_id.into(),
            track_id: track_id.into(),
            start_beat: start_beat.max(0.0),
            transpose: coerce_transpose(transpose as f64),
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_default_has_one_track_and_no_clips() {
        let project = ProjectDoc::new_default();
        assert_eq!(project.tracks.len(), 1);
        assert!(project.clips.is_empty());
        assert!(project.clip_order.is_empty());
    }

    #[test]
    fn track_repair_fills_empty_instrument_and_clamps_gain() {
        let mut track = Track::new("Lead");
        track.instrument = "  ".into();
        track.gain_db = 100.0;
        track.repair();
        assert_eq!(track.instrument, DEFAULT_TRACK_INSTRUMENT);
        assert_eq!(track.gain_db, GAIN_DB_MAX);
    }
}
