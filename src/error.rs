//! Crate-wide error taxonomy.
//!
//! Most fallible operations return `anyhow::Error`. The handful of error
//! kinds a caller might actually want to match on (rather than just log
//! and propagate) get a `thiserror` enum instead.

use thiserror::Error;

/// Fatal errors internal to the engine.
///
/// Both variants are unrecoverable: the process has no sensible way to
/// continue once either occurs, so callers are expected to propagate them
/// straight out of `main`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The host allocator failed to produce a fresh, `CHUNK_SIZE`-aligned
    /// arena. Without it the allocator cannot make forward progress.
    #[error("failed to allocate a new chunk arena")]
    ArenaAllocation,

    /// A load-bearing invariant (never-crosses-a-newline, pointer-mask
    /// reverse lookup, and so on) was violated. This indicates a bug in the
    /// engine itself, not bad input.
    #[error("internal invariant violated: {detail}")]
    AssertionViolated { detail: String },
}
