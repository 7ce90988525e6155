// crates/kinoline-core/src/error.rs
//
// The spec calls out five distinguishable error kinds (§7). A bare
// anyhow::Error can't express that a caller should react differently to a
// ParseError than to a DecodeError, so this crate carries a small
// thiserror enum for the cases the contract requires callers to match on.
// Per-file sequence decode (kinoline-io's `SequenceDecoder::decode`) still
// returns anyhow::Result, same as the teacher's decode.rs does for a single
// frame's worth of work — it only ever needs to propagate, never match.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input string (times, keycodes, enum names).
    #[error("parse error: {0}")]
    Parse(String),

    /// A media file could not be opened.
    #[error("failed to open media {path}: {reason}")]
    Open { path: String, reason: String },

    /// Per-frame decode failure. Never fatal to the reader — it keeps serving.
    #[error("failed to decode frame at {time}: {reason}")]
    Decode { time: String, reason: String },

    /// A seek target could not be reached exactly.
    #[error("seek to {time} failed: {reason}")]
    Seek { time: String, reason: String },

    /// Out-of-memory / invariant violation in the timeline tree.
    #[error("fatal: {0}")]
    Fatal(String),
}
