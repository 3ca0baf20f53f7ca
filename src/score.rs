//! Beat-domain score model (spec.md §3 Note/ScoreBeat) plus the
//! seconds-domain interchange format and the conversions between them
//! (spec.md §6). Grounded on the teacher's `model/clip.rs` (`MidiNote`,
//! flat numeric note fields) and `project.rs::ensure_ids` (id backfill plus
//! numeric coercion pass), generalized from "one clip owns a flat note
//! list" to the spec's "score owns tracks, tracks own notes".

use serde::{Deserialize, Serialize};

use crate::constants::{MIN_DURATION_BEAT, PITCH_MAX, PITCH_MIN, VELOCITY_MAX, VELOCITY_MIN};
use crate::idgen;
use crate::numeric::{beat_to_sec, normalize_beat, sec_to_beat};

/// A single note in the beat domain (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub pitch: i32,
    pub velocity: i32,
    pub start_beat: f64,
    pub duration_beat: f64,
}

impl Note {
    /// Clamps pitch/velocity and rounds/clamps beat fields per spec.md §3:
    /// pitch/velocity round+clamp on write, beat values round to `1e-6`,
    /// and a non-positive duration is substituted with the minimum rather
    /// than rejected (duration `0` is forbidden at the write layer, but
    /// readers must not crash on it).
    pub fn coerce(&mut self) {
        self.pitch = (self.pitch as f64).round().clamp(PITCH_MIN as f64, PITCH_MAX as f64) as i32;
        self.velocity =
            (self.velocity as f64).round().clamp(VELOCITY_MIN as f64, VELOCITY_MAX as f64) as i32;
        if !self.start_beat.is_finite() || self.start_beat < 0.0 {
            self.start_beat = 0.0;
        }
        self.start_beat = normalize_beat(self.start_beat);
        if !self.duration_beat.is_finite() || self.duration_beat <= 0.0 {
            self.duration_beat = MIN_DURATION_BEAT;
        }
        self.duration_beat = normalize_beat(self.duration_beat);
    }
}

/// A track inside a `ScoreBeat` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreTrack {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<i32>,
    pub notes: Vec<Note>,
}

/// The beat-domain score stored on a clip (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBeat {
    pub version: u32,
    pub tempo_bpm: Option<f64>,
    pub time_signature: Option<String>,
    pub tracks: Vec<ScoreTrack>,
}

impl ScoreBeat {
    pub fn empty() -> Self {
        ScoreBeat { version: 2, tempo_bpm: None, time_signature: None, tracks: Vec::new() }
    }
}

/// Backend score v1, seconds-domain (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecNote {
    pub pitch: i32,
    pub velocity: i32,
    pub start: f64,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecTrack {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub notes: Vec<SecNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSec {
    pub tempo_bpm: Option<f64>,
    pub time_signature: Option<String>,
    pub tracks: Vec<SecTrack>,
}

/// Assigns stable ids to any track/note missing one, coerces numeric note
/// fields, and normalizes to two decimal places of beat precision. Run
/// after every deserialization and every patch mutation (spec.md §4.2).
pub fn ensure_score_beat_ids(score: &mut ScoreBeat) {
    if score.version == 0 {
        score.version = 2;
    }
    for track in &mut score.tracks {
        if track.id.is_empty() {
            track.id = idgen::track_id();
        }
        for note in &mut track.notes {
            if note.id.is_empty() {
                note.id = idgen::note_id();
            }
            note.coerce();
        }
    }
}

/// Computed stats (spec.md §4.2): `{count, pitchMin, pitchMax, spanBeat}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreStats {
    pub count: usize,
    pub pitch_min: Option<i32>,
    pub pitch_max: Option<i32>,
    pub span_beat: f64,
}

pub fn recompute_score_beat_stats(score: &ScoreBeat) -> ScoreStats {
    let mut count = 0usize;
    let mut pitch_min: Option<i32> = None;
    let mut pitch_max: Option<i32> = None;
    let mut span_beat = 0.0f64;

    for track in &score.tracks {
        for note in &track.notes {
            count += 1;
            pitch_min = Some(pitch_min.map_or(note.pitch, |m| m.min(note.pitch)));
            pitch_max = Some(pitch_max.map_or(note.pitch, |m| m.max(note.pitch)));
            let end = note.start_beat + note.duration_beat;
            if end > span_beat {
                span_beat = end;
            }
        }
    }

    ScoreStats { count, pitch_min, pitch_max, span_beat }
}

/// Converts a seconds-domain backend score into the beat domain using
/// `bpm` (spec.md §6). IDs are preserved when present, generated when
/// absent.
pub fn score_sec_to_beat(score: &ScoreSec, bpm: f64) -> ScoreBeat {
    let tracks = score
        .tracks
        .iter()
        .map(|t| ScoreTrack {
            id: t.id.clone().unwrap_or_else(idgen::track_id),
            name: t.name.clone().unwrap_or_default(),
            program: None,
            channel: None,
            notes: t
                .notes
                .iter()
                .map(|n| {
                    let mut note = Note {
                        id: n.id.clone().unwrap_or_else(idgen::note_id),
                        pitch: n.pitch,
                        velocity: n.velocity,
                        start_beat: sec_to_beat(n.start, bpm),
                        duration_beat: sec_to_beat(n.duration, bpm),
                    };
                    note.coerce();
                    note
                })
                .collect(),
        })
        .collect();

    ScoreBeat {
        version: 2,
        tempo_bpm: score.tempo_bpm,
        time_signature: score.time_signature.clone(),
        tracks,
    }
}

/// Inverse of `score_sec_to_beat`, used only for the seconds-domain
/// interchange format and for the roundtrip invariant (spec.md §8,
/// invariant 1). Playback timing itself is computed directly in
/// `flatten.rs`, never through this helper.
pub fn score_beat_to_sec(score: &ScoreBeat, bpm: f64) -> ScoreSec {
    let tracks = score
        .tracks
        .iter()
        .map(|t| SecTrack {
            id: Some(t.id.clone()),
            name: Some(t.name.clone()),
            notes: t
                .notes
                .iter()
                .map(|n| SecNote {
                    pitch: n.pitch,
                    velocity: n.velocity,
                    start: beat_to_sec(n.start_beat, bpm),
                    duration: beat_to_sec(n.duration_beat, bpm),
                    id: Some(n.id.clone()),
                })
                .collect(),
        })
        .collect();

    ScoreSec { tempo_bpm: score.tempo_bpm, time_signature: score.time_signature.clone(), tracks }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::{score_beat_to_sec, score_sec_to_beat, SecNote, SecTrack, ScoreSec};

    fn arb_sec_note() -> impl Strategy<Value = SecNote> {
        (0i32..=127, 1i32..=127, 0.0f64..10_000.0, 0.001f64..1000.0).prop_map(|(pitch, velocity, start, duration)| SecNote {
            pitch,
            velocity,
            start,
            duration,
            id: Some(format!("n{pitch}_{start}")),
        })
    }

    proptest! {
        // Invariant 1 (spec.md §8): scoreBeatToSec(scoreSecToBeat(s,bpm),bpm) == s
        // per note, within 1e-6, preserving pitch/velocity/order exactly.
        #[test]
        fn sec_beat_sec_roundtrips(
            notes in prop::collection::vec(arb_sec_note(), 0..8),
            bpm in 30.0f64..260.0,
        ) {
            let sec_score = ScoreSec {
                tempo_bpm: Some(bpm),
                time_signature: None,
                tracks: vec![SecTrack { id: Some("t".into()), name: Some("T".into()), notes: notes.clone() }],
            };
            let beat_score = score_sec_to_beat(&sec_score, bpm);
            let back = score_beat_to_sec(&beat_score, bpm);

            prop_assert_eq!(back.tracks[0].notes.len(), notes.len());
            for (orig, round) in notes.iter().zip(back.tracks[0].notes.iter()) {
                prop_assert!((orig.start - round.start).abs() < 1e-6);
                prop_assert!((orig.duration - round.duration).abs() < 1e-6);
                prop_assert_eq!(orig.pitch, round.pitch);
                prop_assert_eq!(orig.velocity, round.velocity);
            }
        }
    }
}
