//! Deterministic beat-domain project engine for a hum-to-song studio:
//! `ProjectDoc` v2, the `AgentPatch` edit engine with its semantic sanity
//! gate, and the flatten pipeline that projects beats into seconds-domain
//! playback events. No audio I/O, no UI, no file-system access — those are
//! host concerns, not this crate's.

pub mod clip;
pub mod constants;
pub mod error;
pub mod fixtures;
pub mod flatten;
pub mod idgen;
pub mod migration;
pub mod numeric;
pub mod patch;
pub mod project;
pub mod revision;
pub mod sanity;
pub mod score;

pub use clip::{create_clip_from_score, Clip, ClipMeta, RevisionSnapshot};
pub use error::CoreError;
pub use flatten::{flatten_project, Event, FlattenOutput, TrackEvents};
pub use migration::{load_project_doc, LoadOutcome};
pub use patch::{apply_patch_to_clip, invert_applied_patch, validate_patch, AgentPatch, Op};
pub use project::{Instance, ProjectDoc, Track, UiState};
pub use score::{Note, ScoreBeat, ScoreSec, ScoreTrack};
