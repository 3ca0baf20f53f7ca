//! Stable id generation. Grounded on the teacher's atomic-counter generator
//! (`idgen.rs`): a single process-wide counter that never hands out `0`.
//! Ids here are prefixed strings (`note_7`, `clip_3`) rather than bare
//! integers so fixtures and JSON diffs stay legible, and so every kind of
//! entity can be told apart at a glance in error codes like
//! `op[i]_note_not_found:<id>`.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT: AtomicU64 = AtomicU64::new(1);

#[inline]
fn next_raw() -> u64 {
    let id = NEXT.fetch_add(1, Ordering::Relaxed);
    if id == 0 {
        NEXT.fetch_add(1, Ordering::Relaxed)
    } else {
        id
    }
}

/// Seeds the counter so freshly generated ids never collide with ids already
/// present in a loaded document. Mirrors the teacher's `seed_from_max`.
#[inline]
pub fn seed_from_max(max_seen: u64) {
    let next = max_seen.saturating_add(1).max(1);
    NEXT.store(next, Ordering::Relaxed);
}

fn fresh(prefix: &str) -> String {
    format!("{prefix}_{}", next_raw())
}

pub fn note_id() -> String {
    fresh("note")
}
pub fn track_id() -> String {
    fresh("track")
}
pub fn clip_id() -> String {
    fresh("clip")
}
pub fn revision_id() -> String {
    fresh("rev")
}
pub fn instance_id() -> String {
    fresh("inst")
}
