//! Clip and its derived metadata (spec.md §3 Clip/RevisionSnapshot).
//! Grounded on the teacher's `model/clip.rs` (`MidiClip` owning a note list
//! plus derived display fields) and `project.rs`'s snapshot/restore pair,
//! generalized from "clip owns notes directly" to "clip owns a `ScoreBeat`
//! plus a linear revision history of prior `ScoreBeat`s".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::idgen;
use crate::score::{recompute_score_beat_stats, ScoreBeat};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipMeta {
    pub notes: usize,
    pub pitch_min: Option<i32>,
    pub pitch_max: Option<i32>,
    pub span_beat: f64,
    pub source_tempo_bpm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSnapshot {
    pub revision_id: String,
    pub parent_revision_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub score: ScoreBeat,
    pub meta: ClipMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_task_id: Option<String>,
    pub score: ScoreBeat,
    pub meta: ClipMeta,
    pub revision_id: String,
    pub parent_revision_id: Option<String>,
    /// Oldest -> newest. The head (live `score`/`meta`/`name` above) is
    /// implicitly the newest revision and is never duplicated in here.
    pub revisions: Vec<RevisionSnapshot>,
}

/// Primary constructor (spec.md §9 Open Question 2): beats-domain is the
/// canonical entry point. A seconds-domain convenience lives in
/// `migration.rs` for v1 inputs only.
pub fn create_clip_from_score(mut score: ScoreBeat, name: impl Into<String>) -> Clip {
    crate::score::ensure_score_beat_ids(&mut score);
    let now = Utc::now();
    let stats = recompute_score_beat_stats(&score);
    let source_tempo_bpm = score.tempo_bpm;
    Clip {
        id: idgen::clip_id(),
        name: name.into(),
        created_at: now,
        updated_at: now,
        source_task_id: None,
        score,
        meta: ClipMeta {
            notes: stats.count,
            pitch_min: stats.pitch_min,
            pitch_max: stats.pitch_max,
            span_beat: stats.span_beat,
            source_tempo_bpm,
            agent: None,
        },
        revision_id: idgen::revision_id(),
        parent_revision_id: None,
        revisions: Vec::new(),
    }
}

/// Recomputes `meta.{notes,pitchMin,pitchMax,spanBeat}` from `score`
/// in place, preserving `sourceTempoBpm` and `meta.agent` (spec.md §4.2 /
/// the meta-score consistency invariant in §3).
pub fn recompute_clip_meta_from_score_beat(clip: &mut Clip) {
    crate::score::ensure_score_beat_ids(&mut clip.score);
    let stats = recompute_score_beat_stats(&clip.score);
    let preserved_tempo = clip.meta.source_tempo_bpm;
    let preserved_agent = clip.meta.agent.take();
    clip.meta = ClipMeta {
        notes: stats.count,
        pitch_min: stats.pitch_min,
        pitch_max: stats.pitch_max,
        span_beat: stats.span_beat,
        source_tempo_bpm: preserved_tempo,
        agent: preserved_agent,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Note, ScoreTrack};

    fn two_note_score() -> ScoreBeat {
        ScoreBeat {
            version: 2,
            tempo_bpm: Some(100.0),
            time_signature: None,
            tracks: vec![ScoreTrack {
                id: "t1".into(),
                name: "Lead".into(),
                program: None,
                channel: None,
                notes: vec![
                    Note { id: "n1".into(), pitch: 60, velocity: 100, start_beat: 0.0, duration_beat: 1.0 },
                    Note { id: "n2".into(), pitch: 67, velocity: 80, start_beat: 1.0, duration_beat: 1.0 },
                ],
            }],
        }
    }

    #[test]
    fn create_clip_computes_meta() {
        let clip = create_clip_from_score(two_note_score(), "Hum");
        assert_eq!(clip.meta.notes, 2);
        assert_eq!(clip.meta.pitch_min, Some(60));
        assert_eq!(clip.meta.pitch_max, Some(67));
        assert_eq!(clip.meta.span_beat, 2.0);
        assert_eq!(clip.meta.source_tempo_bpm, Some(100.0));
        assert!(clip.parent_revision_id.is_none());
        assert!(clip.revisions.is_empty());
    }

    #[test]
    fn recompute_preserves_agent_and_tempo() {
        let mut clip = create_clip_from_score(two_note_score(), "Hum");
        clip.meta.agent = Some(serde_json::json!({"model": "x"}));
        clip.score.tracks[0].notes.push(Note {
            id: "n3".into(),
            pitch: 72,
            velocity: 90,
            start_beat: 2.0,
            duration_beat: 1.0,
        });
        recompute_clip_meta_from_score_beat(&mut clip);
        assert_eq!(clip.meta.notes, 3);
        assert_eq!(clip.meta.source_tempo_bpm, Some(100.0));
        assert_eq!(clip.meta.agent, Some(serde_json::json!({"model": "x"})));
    }
}
