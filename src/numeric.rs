//! Pure numeric primitives: bpm/transpose coercion, beat/sec/px conversion,
//! rounding and snap helpers (spec.md §4.1). Grounded on the teacher's
//! `time_utils.rs` (`TimeConverter`, `quantize_to_grid`), generalized from a
//! sample-rate-aware converter to pure beat/sec/px math — beat length never
//! depends on sample rate or time signature in this domain.

use crate::constants::{
    BEAT_ROUND_EPS, BPM_MAX, BPM_MIN, DEFAULT_BPM, DEFAULT_PX_PER_BEAT, DEFAULT_PX_PER_SEC,
    TRANSPOSE_MAX, TRANSPOSE_MIN,
};

/// Clamps/defaults a raw bpm value per spec.md §3: `bpm ∈ [30, 260]`,
/// default 120, invalid inputs clamp to default.
#[inline]
pub fn coerce_bpm(raw: f64) -> f64 {
    if !raw.is_finite() {
        return DEFAULT_BPM;
    }
    raw.clamp(BPM_MIN, BPM_MAX)
}

/// Clamps/rounds a raw transpose value per spec.md §3: integer in
/// `[-48, +48]`, non-integers round.
#[inline]
pub fn coerce_transpose(raw: f64) -> i32 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(TRANSPOSE_MIN as f64, TRANSPOSE_MAX as f64) as i32
}

/// `beatToSec(beat, bpm) = beat * 60 / coerce(bpm)`.
#[inline]
pub fn beat_to_sec(beat: f64, bpm: f64) -> f64 {
    beat * 60.0 / coerce_bpm(bpm)
}

/// Inverse of `beat_to_sec`.
#[inline]
pub fn sec_to_beat(sec: f64, bpm: f64) -> f64 {
    sec * coerce_bpm(bpm) / 60.0
}

/// `pxPerSecToPxPerBeat(p, bpm) = p * 60 / coerce(bpm)`. Non-finite input
/// falls back to the `80` px/beat default.
#[inline]
pub fn px_per_sec_to_px_per_beat(px_per_sec: f64, bpm: f64) -> f64 {
    if !px_per_sec.is_finite() {
        return DEFAULT_PX_PER_BEAT;
    }
    px_per_sec * 60.0 / coerce_bpm(bpm)
}

/// Dual of `px_per_sec_to_px_per_beat`. Non-finite input falls back to the
/// `160` px/sec default.
#[inline]
pub fn px_per_beat_to_px_per_sec(px_per_beat: f64, bpm: f64) -> f64 {
    if !px_per_beat.is_finite() {
        return DEFAULT_PX_PER_SEC;
    }
    px_per_beat * coerce_bpm(bpm) / 60.0
}

/// `snapToGridBeat(b, g) = round(b/g)*g` when `g > 0`, else `b` unchanged.
#[inline]
pub fn snap_to_grid_beat(beat: f64, grid: f64) -> f64 {
    if grid > 0.0 { (beat / grid).round() * grid } else { beat }
}

/// Snaps only when the distance to the snapped value is smaller than `eps`.
#[inline]
pub fn snap_if_close_beat(beat: f64, grid: f64, eps: f64) -> f64 {
    let snapped = snap_to_grid_beat(beat, grid);
    if (beat - snapped).abs() < eps { snapped } else { beat }
}

/// Storage de-noise: rounds to `1e-6`. Never a musical grid snap.
#[inline]
pub fn normalize_beat(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

/// UI/log-only rounding of a seconds value; never used for storage.
#[inline]
pub fn round_sec(sec: f64) -> f64 {
    (sec * 1_000.0).round() / 1_000.0
}

/// Writes a playhead/instance-start beat from a seconds value with no grid
/// snap, only the storage rounding every beat value receives.
#[inline]
pub fn set_beat_from_sec_free(sec: f64, bpm: f64) -> f64 {
    normalize_beat(sec_to_beat(sec, bpm))
}

/// Writes a playhead/instance-start beat from a seconds value, applying
/// `grid_beat` before the storage rounding.
#[inline]
pub fn set_beat_from_sec_snapped(sec: f64, bpm: f64, grid_beat: f64) -> f64 {
    normalize_beat(snap_to_grid_beat(sec_to_beat(sec, bpm), grid_beat))
}

/// True when two beat values agree within the storage rounding epsilon.
#[inline]
pub fn beats_approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < BEAT_ROUND_EPS
}
