//! The flatten pipeline (spec.md §4.6): projects a beat-domain `ProjectDoc`
//! into per-track, sorted, seconds-domain playback events. Grounded on the
//! teacher's `project.rs::for_each_ordered_track_mut` (iterate tracks in
//! project order, route per-track work into per-track buckets) generalized
//! from "walk tracks and mutate in place" to "walk instances, resolve their
//! clip, and emit into per-track output buckets".

use crate::constants::{PITCH_MAX, PITCH_MIN, VELOCITY_MAX, VELOCITY_MIN};
use crate::numeric::beat_to_sec;
use crate::project::ProjectDoc;

/// One playback-ready note (spec.md §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub start_sec: f64,
    pub duration_sec: f64,
    pub pitch: i32,
    pub velocity: i32,
    pub clip_id: String,
    pub instance_id: String,
    pub note_id: String,
}

/// One track's flattened events, in project track order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvents {
    pub track_id: String,
    pub notes: Vec<Event>,
}

/// The flatten pipeline's full result (spec.md §4.6): `{bpm, tracks}`. The
/// tempo travels alongside the events since seconds-domain playback has no
/// other way to recover it once the beat-domain project is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenOutput {
    pub bpm: f64,
    pub tracks: Vec<TrackEvents>,
}

/// Why a note was dropped during flatten, handed to the caller's `on_drop`
/// callback.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedNote {
    pub reason: String,
    pub clip_id: String,
    pub instance_id: String,
    pub note_id: String,
}

fn clamp_round(value: f64, min: i32, max: i32) -> i32 {
    value.round().clamp(min as f64, max as f64) as i32
}

/// Runs the flatten algorithm (spec.md §4.6, steps 1-4). `on_drop` is
/// invoked once per dropped note; pass a no-op closure to ignore drops.
pub fn flatten_project(project: &ProjectDoc, mut on_drop: impl FnMut(DroppedNote)) -> FlattenOutput {
    use std::collections::HashMap;

    let mut buckets: HashMap<String, Vec<Event>> = HashMap::new();
    for track in &project.tracks {
        buckets.entry(track.id.clone()).or_default();
    }

    for instance in &project.instances {
        let Some(clip) = project.find_clip(&instance.clip_id) else { continue };
        for score_track in &clip.score.tracks {
            for note in &score_track.notes {
                if note.duration_beat <= 0.0 {
                    on_drop(DroppedNote {
                        reason: "duration<=0".to_string(),
                        clip_id: clip.id.clone(),
                        instance_id: instance.id.clone(),
                        note_id: note.id.clone(),
                    });
                    continue;
                }

                let abs_beat = instance.start_beat + note.start_beat;
                let start_sec = beat_to_sec(abs_beat, project.bpm);
                let duration_sec = beat_to_sec(note.duration_beat, project.bpm);
                if !start_sec.is_finite() || !duration_sec.is_finite() {
                    on_drop(DroppedNote {
                        reason: "non_finite_time".to_string(),
                        clip_id: clip.id.clone(),
                        instance_id: instance.id.clone(),
                        note_id: note.id.clone(),
                    });
                    continue;
                }

                let pitch = clamp_round((note.pitch + instance.transpose) as f64, PITCH_MIN, PITCH_MAX);
                let velocity = clamp_round(note.velocity as f64, VELOCITY_MIN, VELOCITY_MAX);

                let event = Event {
                    start_sec,
                    duration_sec,
                    pitch,
                    velocity,
                    clip_id: clip.id.clone(),
                    instance_id: instance.id.clone(),
                    note_id: note.id.clone(),
                };
                buckets.entry(instance.track_id.clone()).or_default().push(event);
            }
        }
    }

    for events in buckets.values_mut() {
        events.sort_by(|a, b| {
            a.start_sec
                .partial_cmp(&b.start_sec)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.pitch.cmp(&b.pitch))
                .then(a.note_id.cmp(&b.note_id))
        });
    }

    let mut ordered: Vec<TrackEvents> = Vec::with_capacity(buckets.len());
    let mut known: std::collections::HashSet<String> = std::collections::HashSet::new();
    for track in &project.tracks {
        if let Some(notes) = buckets.remove(&track.id) {
            known.insert(track.id.clone());
            ordered.push(TrackEvents { track_id: track.id.clone(), notes });
        }
    }
    let mut leftover: Vec<(String, Vec<Event>)> = buckets.into_iter().filter(|(id, _)| !known.contains(id)).collect();
    leftover.sort_by(|a, b| a.0.cmp(&b.0));
    for (track_id, notes) in leftover {
        ordered.push(TrackEvents { track_id, notes });
    }

    FlattenOutput { bpm: project.bpm, tracks: ordered }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::create_clip_from_score;
    use crate::score::{Note, ScoreBeat, ScoreTrack};

    fn three_note_score() -> ScoreBeat {
        ScoreBeat {
            version: 2,
            tempo_bpm: None,
            time_signature: None,
            tracks: vec![ScoreTrack {
                id: "t".into(),
                name: "T".into(),
                program: None,
                channel: None,
                notes: vec![
                    Note { id: "n1".into(), pitch: 60, velocity: 100, start_beat: 0.0, duration_beat: 1.0 },
                    Note { id: "n2".into(), pitch: 62, velocity: 100, start_beat: 1.0, duration_beat: 1.0 },
                    Note { id: "n3".into(), pitch: 64, velocity: 100, start_beat: 2.0, duration_beat: 1.0 },
                ],
            }],
        }
    }

    #[test]
    fn flatten_totals_match_scenario_s4() {
        let mut project = ProjectDoc::new_default();
        project.bpm = 120.0;
        let track_id = project.tracks[0].id.clone();
        let clip = create_clip_from_score(three_note_score(), "Hum");
        let clip_id = clip.id.clone();
        project.clips.insert(clip_id.clone(), clip);
        project.clip_order.push(clip_id.clone());
        project.add_instance(clip_id.clone(), track_id.clone(), 0.0, 0);
        project.add_instance(clip_id, track_id.clone(), 2.0, 0);

        let output = flatten_project(&project, |_| {});
        assert_eq!(output.bpm, 120.0);
        assert_eq!(output.tracks.len(), 1);
        assert_eq!(output.tracks[0].track_id, track_id);
        assert_eq!(output.tracks[0].notes.len(), 6);
        assert!((output.tracks[0].notes[3].start_sec - 1.0).abs() < 1e-6);
        for pair in output.tracks[0].notes.windows(2) {
            assert!(pair[0].start_sec <= pair[1].start_sec);
        }
    }

    #[test]
    fn drops_zero_duration_notes_and_reports_them() {
        let mut project = ProjectDoc::new_default();
        let track_id = project.tracks[0].id.clone();
        // Bypass `Note::coerce` (which substitutes a minimum duration) by
        // building the clip directly, so the zero-duration note survives
        // into flatten's own drop check.
        let mut clip = create_clip_from_score(three_note_score(), "Hum");
        clip.score.tracks[0].notes[1].duration_beat = 0.0;
        let clip_id = clip.id.clone();
        project.clips.insert(clip_id.clone(), clip);
        project.clip_order.push(clip_id.clone());
        project.add_instance(clip_id, track_id, 0.0, 0);

        let mut drops = Vec::new();
        let output = flatten_project(&project, |d| drops.push(d));
        assert_eq!(output.tracks[0].notes.len(), 2);
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].reason, "duration<=0");
    }

    #[test]
    fn transpose_clamps_pitch_to_legal_range() {
        let mut project = ProjectDoc::new_default();
        let track_id = project.tracks[0].id.clone();
        let clip = create_clip_from_score(three_note_score(), "Hum");
        let clip_id = clip.id.clone();
        project.clips.insert(clip_id.clone(), clip);
        project.clip_order.push(clip_id.clone());
        project.add_instance(clip_id, track_id, 0.0, 48);

        let output = flatten_project(&project, |_| {});
        assert!(output.tracks[0].notes.iter().all(|e| e.pitch <= 127 && e.pitch >= 0));
    }

    #[test]
    fn unknown_track_bucket_is_appended_last() {
        let mut project = ProjectDoc::new_default();
        let clip = create_clip_from_score(three_note_score(), "Hum");
        let clip_id = clip.id.clone();
        project.clips.insert(clip_id.clone(), clip);
        project.clip_order.push(clip_id.clone());
        project.add_instance(clip_id, "ghost_track", 0.0, 0);

        let output = flatten_project(&project, |_| {});
        assert_eq!(output.tracks.last().unwrap().track_id, "ghost_track");
    }
}
