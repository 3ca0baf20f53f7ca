//! Error surface for the engine.
//!
//! Public domain operations never throw (spec §7): they return tagged
//! result structs carrying `Vec<String>` error/warning codes with stable
//! prefixes. `CoreError` below is reserved for the rare internal failure
//! that isn't a domain-data problem — mirroring the teacher's `error.rs`
//! shape (a small enum plus a `common` module of constructor helpers) but
//! built on `thiserror` instead of a hand-written `Display` impl, and with
//! the helpers in `common` producing machine-readable codes rather than
//! free-text messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to parse project JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structured error/warning codes shared by `validate_patch`, `apply_patch_to_clip`,
/// `migration`, and the revision chain. Every constructor here produces exactly
/// the string shape documented in spec.md §4.5/§4.4/§7.
pub mod common {
    pub fn op_missing_field(i: usize, op: &str, field: &str) -> String {
        format!("op[{i}]_{op}_{field}_required")
    }

    pub fn op_oob(i: usize, op: &str, field: &str) -> String {
        format!("op[{i}]_{op}_{field}_oob")
    }

    pub fn op_invalid(i: usize, op: &str, field: &str) -> String {
        format!("op[{i}]_{op}_{field}_invalid")
    }

    pub fn op_not_finite(i: usize, op: &str, field: &str) -> String {
        format!("op[{i}]_{op}_{field}_not_finite")
    }

    pub fn op_unknown(i: usize) -> String {
        format!("op[{i}]_unknown_op")
    }

    pub fn op_missing_op(i: usize) -> String {
        format!("op[{i}]_missing_op")
    }

    pub fn op_note_not_found(i: usize, note_id: &str) -> String {
        format!("op[{i}]_note_not_found:{note_id}")
    }

    pub fn op_track_not_found(i: usize, track_id: &str) -> String {
        format!("op[{i}]_track_not_found:{track_id}")
    }

    pub fn op_set_no_effect(i: usize) -> String {
        format!("op[{i}]_set_no_effect")
    }

    pub fn semantic(kind: &str, detail: impl std::fmt::Display) -> String {
        format!("semantic_{kind}:{detail}")
    }
}
