//! Tunable numeric bounds for the engine. Grouped the way the teacher groups
//! its constants module, but scoped to what a beat-domain document needs:
//! no audio buffer sizes, no UI colors.

// Tempo / transpose domain
pub const BPM_MIN: f64 = 30.0;
pub const BPM_MAX: f64 = 260.0;
pub const DEFAULT_BPM: f64 = 120.0;

pub const TRANSPOSE_MIN: i32 = -48;
pub const TRANSPOSE_MAX: i32 = 48;

// Note field domain
pub const PITCH_MIN: i32 = 0;
pub const PITCH_MAX: i32 = 127;
pub const VELOCITY_MIN: i32 = 1;
pub const VELOCITY_MAX: i32 = 127;
pub const MIN_DURATION_BEAT: f64 = 1e-6;

// Rounding / storage de-noise
pub const BEAT_ROUND_EPS: f64 = 1e-6;

// UI defaults (beat-domain only; no pixel/sec hybrids survive storage)
pub const DEFAULT_PX_PER_BEAT: f64 = 80.0;
pub const DEFAULT_PX_PER_SEC: f64 = 160.0;

// Revision chain
pub const REVISION_RETENTION_CAP: usize = 40;

// Semantic sanity gate (spec.md §4.5.1)
pub const SANITY_MAX_OPS: usize = 5000;
pub const SANITY_MAX_NOTES_AFTER: usize = 5000;
pub const SANITY_DELETE_RATIO_REJECT: f64 = 0.90;
pub const SANITY_DELETE_RATIO_WARN: f64 = 0.50;
pub const SANITY_NET_DELETE_RATIO_REJECT: f64 = 0.90;
pub const SANITY_NET_DELETE_RATIO_WARN: f64 = 0.50;
pub const SANITY_MAX_NOTES_PER_BEAT_BUCKET: usize = 50;
pub const SANITY_SPAN_GROWTH_MULT: f64 = 8.0;
pub const SANITY_SPAN_GROWTH_ADD: f64 = 16.0;
pub const SANITY_ABS_SPAN_CAP_BEATS: f64 = 4096.0;
pub const SANITY_TINY_DURATION_THRESHOLD: f64 = 0.001;
pub const SANITY_TINY_DURATION_MIN_NOTES: usize = 200;
pub const SANITY_TINY_DURATION_RATIO_REJECT: f64 = 0.70;

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";
pub const DEFAULT_TRACK_INSTRUMENT: &str = "default";
pub const DEFAULT_TRACK_NAME: &str = "Track 1";
pub const DEFAULT_GAIN_DB: f64 = 0.0;
pub const GAIN_DB_MIN: f64 = -30.0;
pub const GAIN_DB_MAX: f64 = 6.0;

/// Default name summarizePatch uses to cap examples, mirrored as a constant
/// so call sites never hand-roll the magic number.
pub const DEFAULT_SUMMARY_MAX_EXAMPLES: usize = 6;
