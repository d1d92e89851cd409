//! The engine: ties the chunk allocator, line index, file registry and
//! ingestor together with the scanner behind one API that `main.rs` drives.

pub mod chunk;
pub mod file_registry;
pub mod ingest;
pub mod line_index;
pub mod scan;

use anyhow::Result;

use crate::engine::chunk::ChunkAllocator;
use crate::engine::file_registry::FileRegistry;
use crate::engine::ingest::{Ingestor, Stats};
use crate::engine::line_index::LineIndex;
use crate::error::EngineError;
use crate::pattern::Pattern;
use crate::source::BlobSource;

pub use crate::engine::scan::DEFAULT_MAX_HITS;

/// Owns every live component of a single search session: the growing set
/// of chunk arenas, the line dedup index, the file registry, and the
/// running counters. One `Engine` is built per invocation of the tool and
/// ingests every requested revision before the REPL starts scanning it.
pub struct Engine {
    allocator: ChunkAllocator,
    line_index: LineIndex,
    registry: FileRegistry,
    stats: Stats,
}

impl Engine {
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            allocator: ChunkAllocator::new()?,
            line_index: LineIndex::new(),
            registry: FileRegistry::new(),
            stats: Stats::default(),
        })
    }

    /// Ingests every blob reachable from `revision` in `source`. A blob
    /// that the source itself failed to read is logged and skipped; an
    /// arena allocation failure while ingesting a blob that *was* read
    /// successfully is fatal and propagates out, since the allocator has no
    /// way to make forward progress once that happens.
    pub fn ingest_revision(&mut self, source: &dyn BlobSource, revision: &str) -> Result<()> {
        log::info!("ingesting revision {}", revision);
        let mut ingestor = Ingestor::new(
            &mut self.allocator,
            &mut self.line_index,
            &mut self.registry,
            &mut self.stats,
        );

        let mut blob_count = 0u64;
        for blob in source.blobs(revision)? {
            match blob {
                Ok(blob) => {
                    ingestor.ingest_blob(blob)?;
                    blob_count += 1;
                }
                Err(err) => {
                    log::warn!("failed to read a blob while walking {}: {}", revision, err);
                }
            }
        }

        log::debug!("revision {} contributed {} blobs", revision, blob_count);
        log::info!("finished ingesting revision {}", revision);
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn chunk_count(&self) -> usize {
        self.allocator.chunk_count()
    }

    /// Runs the scanner over every ingested chunk, invoking `on_hit` with
    /// each matched line and its `(revision_label, path)` attributions.
    /// Returns whether any hit was emitted.
    pub fn scan(
        &self,
        pattern: &dyn Pattern,
        max_hits: usize,
        on_hit: impl FnMut(&[u8], &[(&str, &str)]),
    ) -> bool {
        scan::scan(&self.allocator, pattern, max_hits, on_hit)
    }
}
