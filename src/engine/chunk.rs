//! The chunk allocator and the chunk-file interval table.
//!
//! This is the load-bearing part of the whole design: chunks are
//! `CHUNK_SIZE`-aligned, `CHUNK_SIZE`-byte arenas obtained directly from
//! the system allocator, so that any address inside a chunk's payload can
//! be mapped back to its owning chunk header in O(1) by masking off the
//! low `log2(CHUNK_SIZE)` bits, with no side table needed at all.
//!
//! Chunks are never freed, relocated, or resized once created; this module
//! leaks every arena it allocates on purpose.

use std::alloc::{alloc, Layout};
use std::ptr::NonNull;

use crate::engine::file_registry::FileRef;
use crate::error::EngineError;

/// Size of one chunk arena: 1 MiB, and the alignment every arena is
/// allocated with. This is the only number the reverse lookup in
/// [`chunk_of`] depends on.
pub const CHUNK_SIZE: usize = 1 << 20;

const CHUNK_MAGIC: u32 = 0xC407_FADE;

/// The header lives at the very start of each aligned arena. `files` is a
/// `Vec` *handle* (pointer/len/capacity) stored inline in the header; its
/// backing storage grows on the ordinary heap, outside the arena, so
/// appending a `ChunkFile` record can never move `data`.
struct ChunkHeader {
    magic: u32,
    used_bytes: usize,
    files: Vec<ChunkFile>,
}

const HEADER_SIZE: usize = std::mem::size_of::<ChunkHeader>();

/// Usable payload bytes per chunk, after the header.
pub const CHUNK_PAYLOAD: usize = CHUNK_SIZE - HEADER_SIZE;

/// One append-only interval record: the span `[left, right]` of some
/// chunk's payload that was contributed by `file`. Membership is tested
/// as `left <= offset < right` (see the scanner's attribution step for
/// the exact boundary policy).
pub struct ChunkFile {
    pub file: FileRef,
    pub left: usize,
    pub right: usize,
}

/// A cheap, `Copy`able handle to one chunk arena. Never outlives the
/// process (arenas are never freed), so holding one around indefinitely
/// is always sound.
#[derive(Clone, Copy)]
pub struct ChunkRef(NonNull<ChunkHeader>);

impl ChunkRef {
    fn header(&self) -> &ChunkHeader {
        unsafe { &*self.0.as_ptr() }
    }

    fn header_mut(&self) -> &mut ChunkHeader {
        unsafe { &mut *self.0.as_ptr() }
    }

    fn payload_ptr(&self) -> *mut u8 {
        unsafe { (self.0.as_ptr() as *mut u8).add(HEADER_SIZE) }
    }

    /// Sentinel validation only, used to confirm reverse lookups landed on
    /// a real chunk header; compiled out in release builds.
    pub fn magic(&self) -> u32 {
        self.header().magic
    }

    pub fn used_bytes(&self) -> usize {
        self.header().used_bytes
    }

    fn set_used_bytes(&self, n: usize) {
        self.header_mut().used_bytes = n;
    }

    /// The chunk's live payload, `data[0..used_bytes)`.
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.payload_ptr(), self.used_bytes()) }
    }

    /// A process-lifetime view of `len` bytes at chunk-relative `offset`.
    /// Sound only because chunks are never freed, moved, or resized after
    /// creation.
    pub fn line_at(&self, offset: usize, len: usize) -> &'static [u8] {
        debug_assert!(offset + len <= self.used_bytes());
        unsafe { std::slice::from_raw_parts(self.payload_ptr().add(offset), len) }
    }

    pub fn files(&self) -> &[ChunkFile] {
        &self.header().files
    }

    /// Chunk-relative offset of `ptr`, which must point somewhere inside
    /// this chunk's live payload.
    pub fn offset_of(&self, ptr: *const u8) -> usize {
        let offset = (ptr as usize) - (self.payload_ptr() as usize);
        debug_assert!(offset <= self.used_bytes());
        offset
    }

    /// If the last record in this chunk isn't for `file`, opens a fresh
    /// zero-width record at `offset`. Returns the index of the record to
    /// pass to [`ChunkRef::extend_record`].
    pub fn get_or_open(&self, file: FileRef, offset: usize) -> usize {
        let header = self.header_mut();
        let needs_new = match header.files.last() {
            Some(last) => last.file != file,
            None => true,
        };
        if needs_new {
            header.files.push(ChunkFile {
                file,
                left: offset,
                right: offset,
            });
        }
        header.files.len() - 1
    }

    /// Widens the record to cover `[left_candidate, right_candidate]`.
    pub fn extend_record(&self, idx: usize, left_candidate: usize, right_candidate: usize) {
        let rec = &mut self.header_mut().files[idx];
        rec.left = rec.left.min(left_candidate);
        rec.right = rec.right.max(right_candidate);
    }
}

fn alloc_chunk() -> Result<ChunkRef, EngineError> {
    let layout =
        Layout::from_size_align(CHUNK_SIZE, CHUNK_SIZE).expect("CHUNK_SIZE is a valid layout");
    // Safety: `layout` has non-zero size, so `alloc` either returns a
    // valid, `CHUNK_SIZE`-aligned block or null.
    let raw = unsafe { alloc(layout) };
    let header_ptr = NonNull::new(raw as *mut ChunkHeader).ok_or(EngineError::ArenaAllocation)?;
    // Safety: `header_ptr` points to `CHUNK_SIZE` freshly allocated,
    // uninitialized bytes; writing a `ChunkHeader` there is in-bounds.
    unsafe {
        header_ptr.as_ptr().write(ChunkHeader {
            magic: CHUNK_MAGIC,
            used_bytes: 0,
            files: Vec::new(),
        });
    }
    Ok(ChunkRef(header_ptr))
}

/// Recovers the owning chunk for any address previously handed out by
/// [`ChunkAllocator::allocate_and_write`], by masking off the low
/// `log2(CHUNK_SIZE)` bits, the whole point of `CHUNK_SIZE`-aligned
/// arenas. O(1), no auxiliary table.
pub fn chunk_of(addr: *const u8) -> ChunkRef {
    let header_addr = (addr as usize) & !(CHUNK_SIZE - 1);
    let ptr = NonNull::new(header_addr as *mut ChunkHeader)
        .expect("masked address is never null for any real allocation");
    let chunk = ChunkRef(ptr);
    debug_assert_eq!(
        chunk.magic(),
        CHUNK_MAGIC,
        "pointer-mask reverse lookup produced a non-chunk address"
    );
    chunk
}

/// Owns the sequence of chunk arenas and bump-allocates within the
/// current one, spilling into a new arena when an allocation would
/// overflow it.
pub struct ChunkAllocator {
    chunks: Vec<ChunkRef>,
    current: usize,
}

impl ChunkAllocator {
    pub fn new() -> Result<Self, EngineError> {
        let first = alloc_chunk()?;
        log::info!("chunk #0 allocated");
        Ok(Self {
            chunks: vec![first],
            current: 0,
        })
    }

    fn new_chunk(&mut self) -> Result<(), EngineError> {
        let chunk = alloc_chunk()?;
        self.chunks.push(chunk);
        self.current = self.chunks.len() - 1;
        log::info!("chunk #{} allocated", self.current);
        Ok(())
    }

    pub fn current_chunk(&self) -> ChunkRef {
        self.chunks[self.current]
    }

    pub fn iter_chunks(&self) -> impl Iterator<Item = ChunkRef> + '_ {
        self.chunks.iter().copied()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Allocates `bytes.len()` bytes in the current chunk, spilling into a
    /// fresh chunk first if they wouldn't fit, and copies `bytes` into the
    /// new allocation. Returns the owning chunk and the chunk-relative
    /// offset the data was written at.
    pub fn allocate_and_write(&mut self, bytes: &[u8]) -> Result<(ChunkRef, usize), EngineError> {
        let n = bytes.len();
        assert!(
            n < CHUNK_PAYLOAD,
            "allocation of {} bytes does not fit in a {} byte chunk",
            n,
            CHUNK_PAYLOAD
        );
        if self.current_chunk().used_bytes() + n > CHUNK_PAYLOAD {
            self.new_chunk()?;
        }
        let chunk = self.current_chunk();
        let offset = chunk.used_bytes();
        // Safety: `offset + n <= CHUNK_PAYLOAD` was just ensured above,
        // and `bytes` is a valid, non-overlapping source of `n` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), chunk.payload_ptr().add(offset), n);
        }
        chunk.set_used_bytes(offset + n);
        Ok((chunk, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::file_registry::FileRegistry;

    #[test]
    fn allocate_and_write_roundtrips_bytes() {
        let mut alloc = ChunkAllocator::new().unwrap();
        let (chunk, offset) = alloc.allocate_and_write(b"hello\n").unwrap();
        assert_eq!(chunk.data()[offset..offset + 6], *b"hello\n");
    }

    #[test]
    fn reverse_lookup_matches_owning_chunk() {
        let mut alloc = ChunkAllocator::new().unwrap();
        let (chunk, offset) = alloc.allocate_and_write(b"line\n").unwrap();
        for delta in 0..5usize {
            let ptr = unsafe { chunk.data().as_ptr().add(offset + delta) };
            let found = chunk_of(ptr);
            assert_eq!(found.magic(), chunk.magic());
            assert_eq!(found.used_bytes(), chunk.used_bytes());
        }
    }

    #[test]
    fn spills_into_new_chunk_when_current_is_full() {
        let mut alloc = ChunkAllocator::new().unwrap();
        let filler = vec![b'x'; CHUNK_PAYLOAD - 10];
        alloc.allocate_and_write(&filler).unwrap();
        assert_eq!(alloc.chunk_count(), 1);
        alloc.allocate_and_write(b"0123456789012345").unwrap();
        assert_eq!(alloc.chunk_count(), 2);
    }

    #[test]
    fn get_or_open_reuses_last_record_for_same_file() {
        let mut alloc = ChunkAllocator::new().unwrap();
        let mut registry = FileRegistry::new();
        let f = registry.create("HEAD".into(), "/a".into(), [0u8; 20]);

        let (chunk, off1) = alloc.allocate_and_write(b"one\n").unwrap();
        let idx1 = chunk.get_or_open(f, off1);
        chunk.extend_record(idx1, off1, off1 + 3);

        let (chunk2, off2) = alloc.allocate_and_write(b"two\n").unwrap();
        let idx2 = chunk2.get_or_open(f, off2);
        chunk2.extend_record(idx2, off2, off2 + 3);

        assert_eq!(idx1, idx2);
        assert_eq!(chunk2.files().len(), 1);
        assert_eq!(chunk2.files()[0].left, off1);
        assert_eq!(chunk2.files()[0].right, off2 + 3);
    }

    #[test]
    fn get_or_open_splits_on_interleaving_file() {
        let mut alloc = ChunkAllocator::new().unwrap();
        let mut registry = FileRegistry::new();
        let a = registry.create("HEAD".into(), "/a".into(), [0u8; 20]);
        let b = registry.create("HEAD".into(), "/b".into(), [1u8; 20]);

        let (chunk, off_a) = alloc.allocate_and_write(b"a\n").unwrap();
        chunk.get_or_open(a, off_a);
        let (chunk, off_b) = alloc.allocate_and_write(b"b\n").unwrap();
        chunk.get_or_open(b, off_b);
        let (chunk, off_a2) = alloc.allocate_and_write(b"a2\n").unwrap();
        chunk.get_or_open(a, off_a2);

        assert_eq!(chunk.files().len(), 3);
    }
}
