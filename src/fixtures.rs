//! Demo project/clip builders shared across the test suites. Grounded on
//! the teacher's `project.rs::demo_project`-style helper that assembles a
//! ready-to-play project for manual smoke testing, generalized here to
//! build a beat-domain `ProjectDoc` instead of a sample-domain one.

use crate::clip::create_clip_from_score;
use crate::project::ProjectDoc;
use crate::score::{Note, ScoreBeat, ScoreTrack};

/// A short hummed melody: four quarter notes rising by step.
pub fn demo_score() -> ScoreBeat {
    ScoreBeat {
        version: 2,
        tempo_bpm: Some(120.0),
        time_signature: Some("4/4".to_string()),
        tracks: vec![ScoreTrack {
            id: "melody".to_string(),
            name: "Melody".to_string(),
            program: None,
            channel: None,
            notes: vec![
                Note { id: "n1".into(), pitch: 60, velocity: 100, start_beat: 0.0, duration_beat: 1.0 },
                Note { id: "n2".into(), pitch: 62, velocity: 100, start_beat: 1.0, duration_beat: 1.0 },
                Note { id: "n3".into(), pitch: 64, velocity: 100, start_beat: 2.0, duration_beat: 1.0 },
                Note { id: "n4".into(), pitch: 65, velocity: 100, start_beat: 3.0, duration_beat: 1.0 },
            ],
        }],
    }
}

/// A single-track project with one clip (`demo_score`) instanced once at
/// `startBeat=0`, ready to flatten or patch in a test.
pub fn demo_project() -> ProjectDoc {
    let mut project = ProjectDoc::new_default();
    let track_id = project.tracks[0].id.clone();
    let clip = create_clip_from_score(demo_score(), "Hum Take 1");
    let clip_id = clip.id.clone();
    project.clips.insert(clip_id.clone(), clip);
    project.clip_order.push(clip_id.clone());
    project.add_instance(clip_id, track_id, 0.0, 0);
    project
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_project_is_internally_consistent() {
        let project = demo_project();
        let check = crate::migration::check_project_v2_invariants(&project);
        assert!(check.ok, "{:?}", check.errors);
        assert_eq!(project.instances.len(), 1);
    }

    #[test]
    fn demo_project_flattens_to_four_events() {
        let project = demo_project();
        let output = crate::flatten::flatten_project(&project, |_| {});
        assert_eq!(output.tracks.len(), 1);
        assert_eq!(output.tracks[0].notes.len(), 4);
    }
}
