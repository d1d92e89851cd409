//! Interactive regex search over every text blob reachable from a set of
//! git revisions.
//!
//! A single process ingests one or more revisions into an in-memory,
//! content-addressed, line-deduplicating store (see [`engine`]), then
//! repeatedly scans that store for whatever pattern the user types at the
//! `regex>` prompt, printing each matching line together with every
//! (revision, path) that contributed it.

pub mod engine;
pub mod error;
pub mod pattern;
pub mod source;

pub use engine::Engine;
pub use error::EngineError;
pub use pattern::{Pattern, RegexPattern};
pub use source::{Blob, BlobSource, GixBlobSource, MemoryBlobSource};
