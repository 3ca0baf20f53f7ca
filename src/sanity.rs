//! Semantic Sanity Gate (spec.md §4.5.1): a circuit breaker that rejects
//! adversarial or hallucinated patches before they're allowed to become a
//! revision. Grounded on the teacher's `edit_actions.rs` bulk-mutation
//! operations (`Quantize`, `Transpose`, `DeleteRange`), which is the closest
//! the teacher gets to "one call mutates many notes at once" — generalized
//! here into a post-hoc check on the before/after note population rather
//! than a per-operation limit.

use std::collections::HashMap;

use crate::constants::{
    SANITY_ABS_SPAN_CAP_BEATS, SANITY_DELETE_RATIO_REJECT, SANITY_DELETE_RATIO_WARN,
    SANITY_MAX_NOTES_AFTER, SANITY_MAX_NOTES_PER_BEAT_BUCKET, SANITY_MAX_OPS,
    SANITY_NET_DELETE_RATIO_REJECT, SANITY_NET_DELETE_RATIO_WARN, SANITY_SPAN_GROWTH_ADD,
    SANITY_SPAN_GROWTH_MULT, SANITY_TINY_DURATION_MIN_NOTES, SANITY_TINY_DURATION_RATIO_REJECT,
    SANITY_TINY_DURATION_THRESHOLD,
};
use crate::error::common::semantic;
use crate::score::ScoreBeat;

/// Everything the gate needs to know about one apply, already counted by
/// the caller (`patch.rs`) while it walks the ops.
pub struct SanityInput<'a> {
    pub ops_count: usize,
    pub delete_ops: usize,
    pub before_count: usize,
    pub before_span_beat: f64,
    pub after_score: &'a ScoreBeat,
    pub allow_unsafe: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanityVerdict {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

fn notes_per_beat_bucket(score: &ScoreBeat) -> HashMap<i64, usize> {
    let mut buckets: HashMap<i64, usize> = HashMap::new();
    for track in &score.tracks {
        for note in &track.notes {
            *buckets.entry(note.start_beat.floor() as i64).or_insert(0) += 1;
        }
    }
    buckets
}

/// Runs every threshold check in spec.md §4.5.1's table. When `allow_unsafe`
/// is set, would-be rejections are downgraded to warnings and `ok` stays
/// true.
pub fn run_sanity_gate(input: &SanityInput) -> SanityVerdict {
    let mut reject: Vec<String> = Vec::new();
    let mut warn: Vec<String> = Vec::new();

    if input.ops_count > SANITY_MAX_OPS {
        reject.push(semantic("max_ops", input.ops_count));
    }

    let after_count: usize = input.after_score.tracks.iter().map(|t| t.notes.len()).sum();
    if after_count > SANITY_MAX_NOTES_AFTER {
        reject.push(semantic("max_notes_after", after_count));
    }

    if input.before_count > 0 {
        let delete_ratio = input.delete_ops as f64 / input.before_count as f64;
        if delete_ratio >= SANITY_DELETE_RATIO_REJECT {
            reject.push(semantic("delete_ratio", delete_ratio));
        } else if delete_ratio >= SANITY_DELETE_RATIO_WARN {
            warn.push(semantic("delete_ratio", delete_ratio));
        }

        let net_delete = (input.before_count as f64 - after_count as f64) / input.before_count as f64;
        if net_delete >= SANITY_NET_DELETE_RATIO_REJECT {
            reject.push(semantic("net_delete_ratio", net_delete));
        } else if net_delete >= SANITY_NET_DELETE_RATIO_WARN {
            warn.push(semantic("net_delete_ratio", net_delete));
        }
    }

    let buckets = notes_per_beat_bucket(input.after_score);
    if let Some((&bucket, &count)) = buckets.iter().max_by_key(|(_, count)| **count) {
        if count > SANITY_MAX_NOTES_PER_BEAT_BUCKET {
            reject.push(semantic("notes_per_beat_excess", format!("bucket={bucket},count={count}")));
        }
    }

    let after_span = crate::score::recompute_score_beat_stats(input.after_score).span_beat;
    let span_limit = input.before_span_beat * SANITY_SPAN_GROWTH_MULT + SANITY_SPAN_GROWTH_ADD;
    if after_span > span_limit {
        reject.push(semantic("span_growth_excess", after_span));
    }
    if after_span > SANITY_ABS_SPAN_CAP_BEATS {
        reject.push(semantic("span_abs_cap_excess", after_span));
    }

    if after_count >= SANITY_TINY_DURATION_MIN_NOTES {
        let tiny = input
            .after_score
            .tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .filter(|n| n.duration_beat < SANITY_TINY_DURATION_THRESHOLD)
            .count();
        let tiny_ratio = tiny as f64 / after_count as f64;
        if tiny_ratio >= SANITY_TINY_DURATION_RATIO_REJECT {
            reject.push(semantic("tiny_duration_explosion", tiny_ratio));
        }
    }

    if reject.is_empty() {
        SanityVerdict { ok: true, errors: Vec::new(), warnings: warn }
    } else if input.allow_unsafe {
        log::warn!("sanity gate: allowUnsafe downgraded {} rejection(s) to warnings: {reject:?}", reject.len());
        warn.extend(reject);
        SanityVerdict { ok: true, errors: Vec::new(), warnings: warn }
    } else {
        log::warn!("sanity gate: rejected patch ({} ops): {reject:?}", input.ops_count);
        SanityVerdict { ok: false, errors: reject, warnings: warn }
    }
}
