//! The ingestor: drives blobs into the chunk allocator and line index,
//! building up the chunk-file interval table as it goes.

use memchr::memchr;

use crate::engine::chunk::{chunk_of, ChunkAllocator};
use crate::engine::file_registry::FileRegistry;
use crate::engine::line_index::LineIndex;
use crate::error::EngineError;
use crate::source::Blob;

/// The four counters reported after ingestion finishes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub bytes: u64,
    pub dedup_bytes: u64,
    pub lines: u64,
    pub dedup_lines: u64,
}

/// Drives one or more blobs through deduplication and chunk allocation.
/// Borrows the three components it mutates rather than owning them, so
/// the same allocator/index/registry can keep accumulating across
/// multiple calls (one per ingested revision).
pub struct Ingestor<'a> {
    allocator: &'a mut ChunkAllocator,
    line_index: &'a mut LineIndex,
    registry: &'a mut FileRegistry,
    stats: &'a mut Stats,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        allocator: &'a mut ChunkAllocator,
        line_index: &'a mut LineIndex,
        registry: &'a mut FileRegistry,
        stats: &'a mut Stats,
    ) -> Self {
        Self {
            allocator,
            line_index,
            registry,
            stats,
        }
    }

    /// Ingests one blob: splits it on newlines, deduplicating each line
    /// and recording which (revision, path) contributed it. A trailing,
    /// unterminated suffix (no final `\n`) is silently dropped, since
    /// canonical storage always carries a trailing newline.
    pub fn ingest_blob(&mut self, blob: Blob) -> Result<(), EngineError> {
        let file = self
            .registry
            .create(blob.revision_label, blob.path, blob.content_id);

        let bytes = &blob.data;
        let mut cursor = 0usize;

        while let Some(rel) = memchr(b'\n', &bytes[cursor..]) {
            let newline_at = cursor + rel;
            let line = &bytes[cursor..newline_at];
            let line_length = line.len();

            let (chunk, offset) = match self.line_index.find(line) {
                Some(canonical) => {
                    let chunk = chunk_of(canonical.as_ptr());
                    let offset = chunk.offset_of(canonical.as_ptr());
                    (chunk, offset)
                }
                None => {
                    let (chunk, offset) = self
                        .allocator
                        .allocate_and_write(&bytes[cursor..=newline_at])?;
                    let canonical = chunk.line_at(offset, line_length);
                    self.line_index.insert(canonical);
                    self.stats.dedup_lines += 1;
                    self.stats.dedup_bytes += (line_length + 1) as u64;
                    (chunk, offset)
                }
            };

            let record_idx = chunk.get_or_open(file, offset);
            chunk.extend_record(record_idx, offset, offset + line_length);

            self.stats.lines += 1;
            self.stats.bytes += (line_length + 1) as u64;

            cursor = newline_at + 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Blob, BlobSource, MemoryBlobSource};

    fn blob(revision: &str, path: &str, data: &[u8]) -> Blob {
        Blob {
            revision_label: revision.to_string(),
            path: path.to_string(),
            content_id: [0u8; 20],
            data: data.to_vec(),
        }
    }

    #[test]
    fn dedup_across_two_blobs_updates_counters() {
        let mut allocator = ChunkAllocator::new().unwrap();
        let mut line_index = LineIndex::new();
        let mut registry = FileRegistry::new();
        let mut stats = Stats::default();
        let mut ingestor = Ingestor::new(&mut allocator, &mut line_index, &mut registry, &mut stats);

        ingestor.ingest_blob(blob("A", "/a", b"foo\nbar\n")).unwrap();
        ingestor.ingest_blob(blob("B", "/b", b"bar\nbaz\n")).unwrap();

        assert_eq!(stats.lines, 4);
        assert_eq!(stats.dedup_lines, 3);
        assert_eq!(stats.dedup_bytes, 12);
        assert_eq!(line_index.len(), 3);
    }

    #[test]
    fn no_trailing_newline_is_dropped() {
        let mut allocator = ChunkAllocator::new().unwrap();
        let mut line_index = LineIndex::new();
        let mut registry = FileRegistry::new();
        let mut stats = Stats::default();
        let mut ingestor = Ingestor::new(&mut allocator, &mut line_index, &mut registry, &mut stats);

        ingestor.ingest_blob(blob("A", "/a", b"hello")).unwrap();

        assert_eq!(stats.lines, 0);
        assert_eq!(stats.dedup_lines, 0);
        assert!(line_index.is_empty());
    }

    #[test]
    fn same_line_many_files_one_chunk() {
        let mut allocator = ChunkAllocator::new().unwrap();
        let mut line_index = LineIndex::new();
        let mut registry = FileRegistry::new();
        let mut stats = Stats::default();
        let mut ingestor = Ingestor::new(&mut allocator, &mut line_index, &mut registry, &mut stats);

        for i in 0..10 {
            ingestor
                .ingest_blob(blob("HEAD", &format!("/f{}", i), b"X\n"))
                .unwrap();
        }

        assert_eq!(line_index.len(), 1);
        let chunk = allocator.current_chunk();
        assert_eq!(chunk.files().len(), 10);
        for record in chunk.files() {
            assert_eq!(record.right - record.left, 1);
        }
    }

    #[test]
    fn empty_blob_is_benign() {
        let mut allocator = ChunkAllocator::new().unwrap();
        let mut line_index = LineIndex::new();
        let mut registry = FileRegistry::new();
        let mut stats = Stats::default();
        let mut ingestor = Ingestor::new(&mut allocator, &mut line_index, &mut registry, &mut stats);

        ingestor.ingest_blob(blob("A", "/empty", b"")).unwrap();
        assert_eq!(stats.lines, 0);
    }

    #[test]
    fn memory_blob_source_filters_by_revision() {
        let mut src = MemoryBlobSource::new();
        src.push("HEAD", "/a", b"one\n");
        src.push("other", "/b", b"two\n");
        let count = src.blobs("HEAD").unwrap().count();
        assert_eq!(count, 1);
    }
}
