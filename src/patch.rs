//! The `AgentPatch` edit engine (spec.md §4.5): validate, apply, invert,
//! summarize. Grounded on the teacher's `edit_actions.rs` (`EditAction`
//! tagged enum, `EditProcessor` associated functions mutating a clip's
//! notes) for the Op shape and the apply-by-matching-variant structure,
//! generalized from direct mutation to a validate -> clone -> mutate ->
//! gate -> commit pipeline, since here a rejected edit must leave the
//! original clip untouched.
//!
//! Patches arrive as duck-typed JSON (`serde_json::Value`), not a typed
//! `AgentPatch`, because malformed patches are expected input, not a bug:
//! every shape error must surface as a structured code (spec.md §7)
//! instead of a deserialization panic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clip::{recompute_clip_meta_from_score_beat, Clip};
use crate::constants::{DEFAULT_SUMMARY_MAX_EXAMPLES, PITCH_MAX, PITCH_MIN, VELOCITY_MAX, VELOCITY_MIN};
use crate::error::common;
use crate::idgen;
use crate::sanity::{run_sanity_gate, SanityInput};
use crate::score::{recompute_score_beat_stats, Note};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteFields {
    pub pitch: f64,
    pub velocity: f64,
    pub start_beat: f64,
    pub duration_beat: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A single patch operation (spec.md §4.5). Tagged by `op` so the wire
/// shape is `{"op":"addNote",...}`, matching the duck-typed format
/// producers actually send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Op {
    #[serde(rename_all = "camelCase")]
    AddNote { track_id: String, note: NoteFields },
    #[serde(rename_all = "camelCase")]
    DeleteNote { note_id: String },
    #[serde(rename_all = "camelCase")]
    MoveNote { note_id: String, delta_beat: f64 },
    #[serde(rename_all = "camelCase")]
    SetNote {
        note_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pitch: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        velocity: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_beat: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_beat: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unsafe: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PatchMeta>,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSnapshot {
    pub pitch: i32,
    pub velocity: i32,
    pub start_beat: f64,
    pub duration_beat: f64,
}

impl From<&Note> for NoteSnapshot {
    fn from(n: &Note) -> Self {
        NoteSnapshot { pitch: n.pitch, velocity: n.velocity, start_beat: n.start_beat, duration_beat: n.duration_beat }
    }
}

/// Parallel tagged variant to `Op`, additionally carrying before/after
/// snapshots (spec.md §9 Design notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum AppliedOp {
    #[serde(rename_all = "camelCase")]
    AddNote { note_id: String, track_id: String, after: NoteSnapshot },
    #[serde(rename_all = "camelCase")]
    DeleteNote { note_id: String, track_id: String, before: NoteSnapshot },
    #[serde(rename_all = "camelCase")]
    MoveNote { note_id: String, delta_beat: f64, before: NoteSnapshot, after: NoteSnapshot },
    #[serde(rename_all = "camelCase")]
    SetNote { note_id: String, before: NoteSnapshot, after: NoteSnapshot },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPatch {
    pub ops: Vec<AppliedOp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidateOutcome {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub ok: bool,
    pub clip: Option<Clip>,
    pub applied_patch: Option<AppliedPatch>,
    pub inverse_patch: Option<AgentPatch>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

fn req_str(i: usize, op: &str, obj: &serde_json::Map<String, Value>, field: &str, errors: &mut Vec<String>) -> Option<String> {
    match obj.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => {
            errors.push(common::op_missing_field(i, op, field));
            None
        }
    }
}

fn req_num(i: usize, op: &str, obj: &serde_json::Map<String, Value>, field: &str, errors: &mut Vec<String>) -> Option<f64> {
    match obj.get(field) {
        None => {
            errors.push(common::op_missing_field(i, op, field));
            None
        }
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Some(n),
            Some(_) => {
                errors.push(common::op_not_finite(i, op, field));
                None
            }
            None => {
                errors.push(common::op_invalid(i, op, field));
                None
            }
        },
    }
}

fn opt_num(i: usize, op: &str, obj: &serde_json::Map<String, Value>, field: &str, errors: &mut Vec<String>) -> Option<f64> {
    match obj.get(field) {
        None => None,
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Some(n),
            Some(_) => {
                errors.push(common::op_not_finite(i, op, field));
                None
            }
            None => {
                errors.push(common::op_invalid(i, op, field));
                None
            }
        },
    }
}

fn check_range(i: usize, op: &str, field: &str, value: f64, min: f64, max: f64, errors: &mut Vec<String>) {
    if value < min || value > max {
        errors.push(common::op_oob(i, op, field));
    }
}

fn parse_add_note(i: usize, obj: &serde_json::Map<String, Value>) -> Result<Op, Vec<String>> {
    let mut errors = Vec::new();
    let track_id = req_str(i, "add", obj, "trackId", &mut errors);
    let note_obj = obj.get("note").and_then(Value::as_object);
    if note_obj.is_none() {
        errors.push(common::op_missing_field(i, "add", "note"));
    }

    let mut pitch = None;
    let mut velocity = None;
    let mut start_beat = None;
    let mut duration_beat = None;
    let mut id = None;
    if let Some(note_obj) = note_obj {
        pitch = req_num(i, "add", note_obj, "pitch", &mut errors);
        velocity = req_num(i, "add", note_obj, "velocity", &mut errors);
        start_beat = req_num(i, "add", note_obj, "startBeat", &mut errors);
        duration_beat = req_num(i, "add", note_obj, "durationBeat", &mut errors);
        id = note_obj.get("id").and_then(Value::as_str).map(str::to_string);

        if let Some(p) = pitch {
            check_range(i, "add", "pitch", p, PITCH_MIN as f64, PITCH_MAX as f64, &mut errors);
        }
        if let Some(v) = velocity {
            check_range(i, "add", "velocity", v, VELOCITY_MIN as f64, VELOCITY_MAX as f64, &mut errors);
        }
        if let Some(s) = start_beat {
            if s < 0.0 {
                errors.push(common::op_oob(i, "add", "startBeat"));
            }
        }
        if let Some(d) = duration_beat {
            if d <= 0.0 {
                errors.push(common::op_oob(i, "add", "durationBeat"));
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(Op::AddNote {
        track_id: track_id.unwrap(),
        note: NoteFields {
            pitch: pitch.unwrap(),
            velocity: velocity.unwrap(),
            start_beat: start_beat.unwrap(),
            duration_beat: duration_beat.unwrap(),
            id,
        },
    })
}

fn parse_delete_note(i: usize, obj: &serde_json::Map<String, Value>) -> Result<Op, Vec<String>> {
    let mut errors = Vec::new();
    let note_id = req_str(i, "delete", obj, "noteId", &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(Op::DeleteNote { note_id: note_id.unwrap() })
}

fn parse_move_note(i: usize, obj: &serde_json::Map<String, Value>) -> Result<Op, Vec<String>> {
    let mut errors = Vec::new();
    let note_id = req_str(i, "move", obj, "noteId", &mut errors);
    let delta_beat = req_num(i, "move", obj, "deltaBeat", &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(Op::MoveNote { note_id: note_id.unwrap(), delta_beat: delta_beat.unwrap() })
}

fn parse_set_note(i: usize, obj: &serde_json::Map<String, Value>) -> Result<Op, Vec<String>> {
    let mut errors = Vec::new();
    let note_id = req_str(i, "set", obj, "noteId", &mut errors);
    let pitch = opt_num(i, "set", obj, "pitch", &mut errors);
    let velocity = opt_num(i, "set", obj, "velocity", &mut errors);
    let start_beat = opt_num(i, "set", obj, "startBeat", &mut errors);
    let duration_beat = opt_num(i, "set", obj, "durationBeat", &mut errors);

    if let Some(p) = pitch {
        check_range(i, "set", "pitch", p, PITCH_MIN as f64, PITCH_MAX as f64, &mut errors);
    }
    if let Some(v) = velocity {
        check_range(i, "set", "velocity", v, VELOCITY_MIN as f64, VELOCITY_MAX as f64, &mut errors);
    }
    if let Some(s) = start_beat {
        if s < 0.0 {
            errors.push(common::op_oob(i, "set", "startBeat"));
        }
    }
    if let Some(d) = duration_beat {
        if d <= 0.0 {
            errors.push(common::op_oob(i, "set", "durationBeat"));
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(Op::SetNote { note_id: note_id.unwrap(), pitch, velocity, start_beat, duration_beat })
}

fn parse_one_op(i: usize, val: &Value) -> Result<Op, Vec<String>> {
    let Some(obj) = val.as_object() else {
        return Err(vec![common::op_missing_op(i)]);
    };
    let Some(op_name) = obj.get("op").and_then(Value::as_str) else {
        return Err(vec![common::op_missing_op(i)]);
    };
    match op_name {
        "addNote" => parse_add_note(i, obj),
        "deleteNote" => parse_delete_note(i, obj),
        "moveNote" => parse_move_note(i, obj),
        "setNote" => parse_set_note(i, obj),
        _ => Err(vec![common::op_unknown(i)]),
    }
}

/// Structural extraction from a duck-typed patch: `patch_not_object`,
/// `ops_not_array`, and per-op required/numeric/range errors.
fn extract_ops(raw: &Value) -> Result<Vec<Op>, Vec<String>> {
    let Some(obj) = raw.as_object() else {
        return Err(vec!["patch_not_object".to_string()]);
    };
    let Some(ops_arr) = obj.get("ops").and_then(Value::as_array) else {
        return Err(vec!["ops_not_array".to_string()]);
    };

    let mut ops = Vec::with_capacity(ops_arr.len());
    let mut errors = Vec::new();
    for (i, op_val) in ops_arr.iter().enumerate() {
        match parse_one_op(i, op_val) {
            Ok(op) => ops.push(op),
            Err(e) => errors.extend(e),
        }
    }
    if errors.is_empty() {
        Ok(ops)
    } else {
        Err(errors)
    }
}

fn find_note_track<'a>(score: &'a crate::score::ScoreBeat, note_id: &str) -> Option<&'a str> {
    score.tracks.iter().find(|t| t.notes.iter().any(|n| n.id == note_id)).map(|t| t.id.as_str())
}

/// Referential checks that need the clip: note/track existence, plus the
/// `setNote` no-effect warning (spec.md §4.5).
fn validate_ops_against_clip(ops: &[Op], clip: &Clip, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    for (i, op) in ops.iter().enumerate() {
        match op {
            Op::AddNote { track_id, .. } => {
                if !clip.score.tracks.iter().any(|t| &t.id == track_id) {
                    errors.push(common::op_track_not_found(i, track_id));
                }
            }
            Op::DeleteNote { note_id } | Op::MoveNote { note_id, .. } => {
                if find_note_track(&clip.score, note_id).is_none() {
                    errors.push(common::op_note_not_found(i, note_id));
                }
            }
            Op::SetNote { note_id, pitch, velocity, start_beat, duration_beat } => {
                if find_note_track(&clip.score, note_id).is_none() {
                    errors.push(common::op_note_not_found(i, note_id));
                } else if pitch.is_none() && velocity.is_none() && start_beat.is_none() && duration_beat.is_none() {
                    warnings.push(common::op_set_no_effect(i));
                }
            }
        }
    }
}

/// Structural, numeric, and referential legality of a patch against a clip
/// (spec.md §4.5). Never mutates `clip`.
pub fn validate_patch(raw: &Value, clip: &Clip) -> ValidateOutcome {
    match extract_ops(raw) {
        Err(errors) => ValidateOutcome { ok: false, errors, warnings: Vec::new() },
        Ok(ops) => {
            let mut errors = Vec::new();
            let mut warnings = Vec::new();
            validate_ops_against_clip(&ops, clip, &mut errors, &mut warnings);
            ValidateOutcome { ok: errors.is_empty(), errors, warnings }
        }
    }
}

fn allow_unsafe_flag(raw: &Value) -> bool {
    raw.get("meta").and_then(|m| m.get("allowUnsafe")).and_then(Value::as_bool).unwrap_or(false)
}

fn patch_clip_id(raw: &Value) -> Option<String> {
    raw.get("clipId").and_then(Value::as_str).map(str::to_string)
}

fn find_note_mut<'a>(score: &'a mut crate::score::ScoreBeat, note_id: &str) -> Option<(&'a mut Note, String)> {
    for track in &mut score.tracks {
        let track_id = track.id.clone();
        if let Some(note) = track.notes.iter_mut().find(|n| n.id == note_id) {
            return Some((note, track_id));
        }
    }
    None
}

/// Validates, clones, mutates, sanity-gates, and commits (spec.md §4.5
/// algorithm). On rejection the input `clip` is never touched — the clone
/// is simply discarded.
pub fn apply_patch_to_clip(clip: &Clip, raw: &Value) -> ApplyOutcome {
    let ops = match extract_ops(raw) {
        Err(errors) => return ApplyOutcome { ok: false, clip: None, applied_patch: None, inverse_patch: None, errors, warnings: Vec::new() },
        Ok(ops) => ops,
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    validate_ops_against_clip(&ops, clip, &mut errors, &mut warnings);
    if !errors.is_empty() {
        return ApplyOutcome { ok: false, clip: None, applied_patch: None, inverse_patch: None, errors, warnings };
    }

    let mut working = clip.clone();
    // `Clip`'s own invariant guarantees every stored note already has an id
    // and coerced fields (every write path runs `recompute_clip_meta_from_score_beat`),
    // so there's no need to re-coerce here — doing so would also erase any
    // pre-existing out-of-range note before an op's own `before` snapshot
    // could ever observe it, making clamp counting in `summarizeAppliedPatch`
    // permanently dead.
    let before_stats = recompute_score_beat_stats(&working.score);
    let before_count = before_stats.count;
    let before_span_beat = before_stats.span_beat;

    let mut applied_ops = Vec::with_capacity(ops.len());
    let mut inverse_ops = Vec::with_capacity(ops.len());
    let mut delete_ops = 0usize;

    for op in ops {
        match op {
            Op::AddNote { track_id, note } => {
                let mut new_note = Note {
                    id: note.id.clone().unwrap_or_else(idgen::note_id),
                    pitch: note.pitch.round() as i32,
                    velocity: note.velocity.round() as i32,
                    start_beat: note.start_beat,
                    duration_beat: note.duration_beat,
                };
                new_note.coerce();
                let note_id = new_note.id.clone();
                let snapshot = NoteSnapshot::from(&new_note);
                let track = working.score.tracks.iter_mut().find(|t| t.id == track_id).expect("validated above");
                track.notes.push(new_note);

                applied_ops.push(AppliedOp::AddNote { note_id: note_id.clone(), track_id, after: snapshot });
                inverse_ops.push(Op::DeleteNote { note_id });
            }
            Op::DeleteNote { note_id } => {
                let track = working
                    .score
                    .tracks
                    .iter_mut()
                    .find(|t| t.notes.iter().any(|n| n.id == note_id))
                    .expect("validated above");
                let track_id = track.id.clone();
                let pos = track.notes.iter().position(|n| n.id == note_id).expect("validated above");
                let removed = track.notes.remove(pos);
                let before = NoteSnapshot::from(&removed);

                applied_ops.push(AppliedOp::DeleteNote { note_id: note_id.clone(), track_id: track_id.clone(), before });
                inverse_ops.push(Op::AddNote {
                    track_id,
                    note: NoteFields {
                        pitch: before.pitch as f64,
                        velocity: before.velocity as f64,
                        start_beat: before.start_beat,
                        duration_beat: before.duration_beat,
                        id: Some(note_id),
                    },
                });
                delete_ops += 1;
            }
            Op::MoveNote { note_id, delta_beat } => {
                let (note, _) = find_note_mut(&mut working.score, &note_id).expect("validated above");
                let before = NoteSnapshot::from(&*note);
                note.start_beat = (before.start_beat + delta_beat).max(0.0);
                note.coerce();
                let after = NoteSnapshot::from(&*note);

                applied_ops.push(AppliedOp::MoveNote { note_id: note_id.clone(), delta_beat, before, after });
                inverse_ops.push(Op::MoveNote { note_id, delta_beat: before.start_beat - after.start_beat });
            }
            Op::SetNote { note_id, pitch, velocity, start_beat, duration_beat } => {
                let (note, _) = find_note_mut(&mut working.score, &note_id).expect("validated above");
                let before = NoteSnapshot::from(&*note);
                if let Some(p) = pitch {
                    note.pitch = p.round() as i32;
                }
                if let Some(v) = velocity {
                    note.velocity = v.round() as i32;
                }
                if let Some(s) = start_beat {
                    note.start_beat = s;
                }
                if let Some(d) = duration_beat {
                    note.duration_beat = d;
                }
                note.coerce();
                let after = NoteSnapshot::from(&*note);

                applied_ops.push(AppliedOp::SetNote { note_id: note_id.clone(), before, after });
                inverse_ops.push(Op::SetNote {
                    note_id,
                    pitch: pitch.map(|_| before.pitch as f64),
                    velocity: velocity.map(|_| before.velocity as f64),
                    start_beat: start_beat.map(|_| before.start_beat),
                    duration_beat: duration_beat.map(|_| before.duration_beat),
                });
            }
        }
    }

    recompute_clip_meta_from_score_beat(&mut working);

    let verdict = run_sanity_gate(&SanityInput {
        ops_count: applied_ops.len(),
        delete_ops,
        before_count,
        before_span_beat,
        after_score: &working.score,
        allow_unsafe: allow_unsafe_flag(raw),
    });
    warnings.extend(verdict.warnings);
    if !verdict.ok {
        return ApplyOutcome { ok: false, clip: None, applied_patch: None, inverse_patch: None, errors: verdict.errors, warnings };
    }

    inverse_ops.reverse();
    let inverse_patch = AgentPatch {
        version: 1,
        id: None,
        clip_id: patch_clip_id(raw).or_else(|| Some(working.id.clone())),
        meta: None,
        ops: inverse_ops,
    };

    ApplyOutcome {
        ok: true,
        clip: Some(working),
        applied_patch: Some(AppliedPatch { ops: applied_ops }),
        inverse_patch: Some(inverse_patch),
        errors: Vec::new(),
        warnings,
    }
}

/// Reverses `applied.ops` right-to-left into a patch that undoes them
/// (spec.md §4.5), using only the before/after snapshots captured at apply
/// time — equivalent to the `inversePatch` `apply_patch_to_clip` returns,
/// since every mutation renormalizes the whole note and untouched fields
/// never differ between `before` and `after`.
pub fn invert_applied_patch(applied: &AppliedPatch) -> AgentPatch {
    let mut ops: Vec<Op> = applied
        .ops
        .iter()
        .map(|applied_op| match applied_op {
            AppliedOp::AddNote { note_id, .. } => Op::DeleteNote { note_id: note_id.clone() },
            AppliedOp::DeleteNote { note_id, track_id, before } => Op::AddNote {
                track_id: track_id.clone(),
                note: NoteFields {
                    pitch: before.pitch as f64,
                    velocity: before.velocity as f64,
                    start_beat: before.start_beat,
                    duration_beat: before.duration_beat,
                    id: Some(note_id.clone()),
                },
            },
            AppliedOp::MoveNote { note_id, before, after, .. } => {
                Op::MoveNote { note_id: note_id.clone(), delta_beat: before.start_beat - after.start_beat }
            }
            AppliedOp::SetNote { note_id, before, .. } => Op::SetNote {
                note_id: note_id.clone(),
                pitch: Some(before.pitch as f64),
                velocity: Some(before.velocity as f64),
                start_beat: Some(before.start_beat),
                duration_beat: Some(before.duration_beat),
            },
        })
        .collect();
    ops.reverse();
    AgentPatch { version: 1, id: None, clip_id: None, meta: None, ops }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClampCounts {
    pub pitch: usize,
    pub velocity: usize,
    pub start_beat: usize,
    pub duration_beat: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchExample {
    pub op: String,
    pub note_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSummary {
    pub ops: usize,
    pub by_op: HashMap<String, usize>,
    pub clamp: ClampCounts,
    pub examples: Vec<PatchExample>,
}

fn count_note_clamp(before: &NoteSnapshot, after: &NoteSnapshot, counts: &mut ClampCounts) {
    let pitch_oob = before.pitch < PITCH_MIN || before.pitch > PITCH_MAX;
    let pitch_ok = after.pitch >= PITCH_MIN && after.pitch <= PITCH_MAX;
    if pitch_oob && pitch_ok {
        counts.pitch += 1;
    }
    let velocity_oob = before.velocity < VELOCITY_MIN || before.velocity > VELOCITY_MAX;
    let velocity_ok = after.velocity >= VELOCITY_MIN && after.velocity <= VELOCITY_MAX;
    if velocity_oob && velocity_ok {
        counts.velocity += 1;
    }
    if before.start_beat < 0.0 && after.start_beat >= 0.0 {
        counts.start_beat += 1;
    }
    if before.duration_beat <= 0.0 && after.duration_beat > 0.0 {
        counts.duration_beat += 1;
    }
}

fn op_kind(op: &AppliedOp) -> &'static str {
    match op {
        AppliedOp::AddNote { .. } => "addNote",
        AppliedOp::DeleteNote { .. } => "deleteNote",
        AppliedOp::MoveNote { .. } => "moveNote",
        AppliedOp::SetNote { .. } => "setNote",
    }
}

fn op_note_id(op: &AppliedOp) -> &str {
    match op {
        AppliedOp::AddNote { note_id, .. }
        | AppliedOp::DeleteNote { note_id, .. }
        | AppliedOp::MoveNote { note_id, .. }
        | AppliedOp::SetNote { note_id, .. } => note_id,
    }
}

/// `{ops, byOp, clamp, examples}` for user-visible "Optimized: ops=N"
/// feedback (spec.md §4.5).
pub fn summarize_applied_patch(applied: &AppliedPatch, max_examples: usize) -> PatchSummary {
    let mut by_op: HashMap<String, usize> = HashMap::new();
    let mut clamp = ClampCounts::default();
    let mut examples = Vec::new();

    for op in &applied.ops {
        *by_op.entry(op_kind(op).to_string()).or_insert(0) += 1;
        match op {
            AppliedOp::MoveNote { before, after, .. } | AppliedOp::SetNote { before, after, .. } => {
                count_note_clamp(before, after, &mut clamp);
            }
            AppliedOp::AddNote { .. } | AppliedOp::DeleteNote { .. } => {}
        }
        if examples.len() < max_examples {
            examples.push(PatchExample { op: op_kind(op).to_string(), note_id: op_note_id(op).to_string() });
        }
    }

    PatchSummary { ops: applied.ops.len(), by_op, clamp, examples }
}

/// Convenience wrapper using the spec's default example cap.
pub fn summarize_applied_patch_default(applied: &AppliedPatch) -> PatchSummary {
    summarize_applied_patch(applied, DEFAULT_SUMMARY_MAX_EXAMPLES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::create_clip_from_score;
    use crate::score::{ScoreBeat, ScoreTrack};
    use serde_json::json;

    fn clip_with_notes(n: usize) -> Clip {
        let notes = (0..n)
            .map(|i| Note {
                id: format!("n{i}"),
                pitch: 60 + (i % 5) as i32,
                velocity: 100,
                start_beat: i as f64 * 0.25,
                duration_beat: 0.25,
            })
            .collect();
        let score = ScoreBeat {
            version: 2,
            tempo_bpm: Some(120.0),
            time_signature: None,
            tracks: vec![ScoreTrack { id: "trk".into(), name: "Lead".into(), program: None, channel: None, notes }],
        };
        create_clip_from_score(score, "Test")
    }

    #[test]
    fn validate_rejects_non_object_patch() {
        let clip = clip_with_notes(2);
        let outcome = validate_patch(&json!([1, 2, 3]), &clip);
        assert!(!outcome.ok);
        assert_eq!(outcome.errors, vec!["patch_not_object".to_string()]);
    }

    #[test]
    fn validate_rejects_unknown_note_target() {
        let clip = clip_with_notes(2);
        let patch = json!({"version":1, "ops":[{"op":"deleteNote","noteId":"ghost"}]});
        let outcome = validate_patch(&patch, &clip);
        assert!(!outcome.ok);
        assert!(outcome.errors[0].starts_with("op[0]_note_not_found:"));
    }

    #[test]
    fn validate_warns_on_no_effect_set_note() {
        let clip = clip_with_notes(1);
        let patch = json!({"version":1, "ops":[{"op":"setNote","noteId":"n0"}]});
        let outcome = validate_patch(&patch, &clip);
        assert!(outcome.ok);
        assert_eq!(outcome.warnings, vec!["op[0]_set_no_effect".to_string()]);
    }

    #[test]
    fn apply_invert_roundtrip_scenario_s2() {
        let clip = clip_with_notes(8);
        let patch = json!({
            "version": 1,
            "ops": [
                {"op":"moveNote","noteId":"n2","deltaBeat":0.5},
                {"op":"setNote","noteId":"n3","pitch":72,"velocity":90},
                {"op":"addNote","trackId":"trk","note":{"id":"n_new","pitch":67,"velocity":110,"startBeat":0.125,"durationBeat":0.125}},
            ]
        });
        let result = apply_patch_to_clip(&clip, &patch);
        assert!(result.ok, "apply failed: {:?}", result.errors);
        let mutated = result.clip.unwrap();
        assert_eq!(mutated.meta.notes, 9);

        let inverse = result.inverse_patch.unwrap();
        let reverted = apply_patch_to_clip(&mutated, &serde_json::to_value(&inverse).unwrap());
        assert!(reverted.ok, "invert failed: {:?}", reverted.errors);
        let restored = reverted.clip.unwrap();
        assert_eq!(restored.meta.notes, 8);

        for original_note in clip.score.tracks[0].notes.iter() {
            let restored_note = restored.score.tracks[0].notes.iter().find(|n| n.id == original_note.id).unwrap();
            assert_eq!(restored_note.pitch, original_note.pitch);
            assert_eq!(restored_note.velocity, original_note.velocity);
            assert!((restored_note.start_beat - original_note.start_beat).abs() < 1e-6);
            assert!((restored_note.duration_beat - original_note.duration_beat).abs() < 1e-6);
        }
        assert!(!restored.score.tracks[0].notes.iter().any(|n| n.id == "n_new"));
    }

    #[test]
    fn apply_rejects_high_delete_ratio_scenario_s3() {
        let clip = clip_with_notes(40);
        let ops: Vec<Value> = (0..38).map(|i| json!({"op":"deleteNote","noteId":format!("n{i}")})).collect();
        let patch = json!({"version": 1, "ops": ops});
        let result = apply_patch_to_clip(&clip, &patch);
        assert!(!result.ok);
        assert!(result.errors.iter().any(|e| e.starts_with("semantic_delete_ratio:")));
    }

    #[test]
    fn apply_leaves_original_clip_untouched_on_rejection() {
        let clip = clip_with_notes(40);
        let before = clip.clone();
        let ops: Vec<Value> = (0..38).map(|i| json!({"op":"deleteNote","noteId":format!("n{i}")})).collect();
        let patch = json!({"version": 1, "ops": ops});
        let _ = apply_patch_to_clip(&clip, &patch);
        assert_eq!(clip, before);
    }

    #[test]
    fn invert_applied_patch_matches_apply_inverse() {
        let clip = clip_with_notes(4);
        let patch = json!({"version":1, "ops":[{"op":"moveNote","noteId":"n1","deltaBeat":1.0}]});
        let result = apply_patch_to_clip(&clip, &patch);
        assert!(result.ok);
        let applied = result.applied_patch.unwrap();
        let inverse_from_apply = result.inverse_patch.unwrap();
        let inverse_from_helper = invert_applied_patch(&applied);
        assert_eq!(inverse_from_apply.ops, inverse_from_helper.ops);
    }

    #[test]
    fn summarize_counts_ops_and_clamp() {
        // `setNote`'s op-level validation rejects out-of-range op values
        // outright, so to exercise clamp counting the stored note itself
        // must already be out of range (e.g. carried over from legacy
        // data) before an in-range edit on another field renormalizes it.
        let mut clip = clip_with_notes(2);
        clip.score.tracks[0].notes[0].pitch = 200;
        let patch = json!({"version":1, "ops":[{"op":"setNote","noteId":"n0","velocity":90}]});
        let result = apply_patch_to_clip(&clip, &patch);
        assert!(result.ok, "apply failed: {:?}", result.errors);
        let summary = summarize_applied_patch_default(&result.applied_patch.unwrap());
        assert_eq!(summary.ops, 1);
        assert_eq!(summary.clamp.pitch, 1);
        assert_eq!(*summary.by_op.get("setNote").unwrap(), 1);
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::apply_patch_to_clip;
    use crate::clip::create_clip_from_score;
    use crate::score::{Note, ScoreBeat, ScoreTrack};

    fn clip_with_notes(n: usize) -> crate::clip::Clip {
        let notes = (0..n)
            .map(|i| Note { id: format!("n{i}"), pitch: 60, velocity: 100, start_beat: i as f64, duration_beat: 0.5 })
            .collect();
        let score = ScoreBeat { version: 2, tempo_bpm: Some(120.0), time_signature: None, tracks: vec![ScoreTrack { id: "t".into(), name: "T".into(), program: None, channel: None, notes }] };
        create_clip_from_score(score, "Hum")
    }

    proptest! {
        // Invariant 5 (spec.md §8): applying a patch then its own inversePatch
        // restores the original clip's notes within beat-rounding epsilon.
        #[test]
        fn apply_then_invert_restores_original(
            note_count in 3usize..8,
            target in 0usize..3,
            delta_beat in -2.0f64..2.0,
            new_pitch in 0i32..=127,
            new_velocity in 1i32..=127,
        ) {
            let clip = clip_with_notes(note_count);
            let target_id = format!("n{target}");
            let patch = json!({
                "version": 1,
                "ops": [
                    {"op": "moveNote", "noteId": target_id, "deltaBeat": delta_beat},
                    {"op": "setNote", "noteId": target_id, "pitch": new_pitch, "velocity": new_velocity},
                ]
            });

            let result = apply_patch_to_clip(&clip, &patch);
            prop_assume!(result.ok);
            let mutated = result.clip.unwrap();
            let inverse = result.inverse_patch.unwrap();
            let reverted = apply_patch_to_clip(&mutated, &serde_json::to_value(&inverse).unwrap());
            prop_assert!(reverted.ok, "invert failed: {:?}", reverted.errors);
            let restored = reverted.clip.unwrap();

            for original in &clip.score.tracks[0].notes {
                let got = restored.score.tracks[0].notes.iter().find(|n| n.id == original.id).unwrap();
                prop_assert_eq!(got.pitch, original.pitch);
                prop_assert_eq!(got.velocity, original.velocity);
                prop_assert!((got.start_beat - original.start_beat).abs() < 1e-6);
                prop_assert!((got.duration_beat - original.duration_beat).abs() < 1e-6);
            }
        }
    }
}

