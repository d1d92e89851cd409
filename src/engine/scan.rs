//! The scanner: walks every chunk in creation order, feeds its payload to
//! the pattern matcher, expands each match to its containing line, and
//! attributes the line back to every file that contributed it.

use memchr::{memchr, memrchr};

use crate::engine::chunk::ChunkAllocator;
use crate::error::EngineError;
use crate::pattern::Pattern;

/// Default number of distinct matching lines reported per query.
pub const DEFAULT_MAX_HITS: usize = 10;

/// Scans every chunk for matches of `pattern`, invoking `on_hit` with the
/// matched line and its `(revision_label, path)` attributions for each
/// distinct `(chunk, line_start)` hit, until `max_hits` hits have been
/// emitted or every chunk is exhausted. Returns whether any hit was
/// emitted at all.
pub fn scan(
    allocator: &ChunkAllocator,
    pattern: &dyn Pattern,
    max_hits: usize,
    mut on_hit: impl FnMut(&[u8], &[(&str, &str)]),
) -> bool {
    let mut hits = 0usize;

    for chunk in allocator.iter_chunks() {
        let data = chunk.data();
        let mut pos = 0usize;

        while pos < data.len() {
            let (mstart, mend) = match pattern.find_at(data, pos) {
                Some(m) => m,
                None => break,
            };

            // The configured pattern options make a newline-crossing match
            // impossible; verify it here rather than trust the collaborator.
            if let Some(_nl) = memchr(b'\n', &data[mstart..mend]) {
                let err = EngineError::AssertionViolated {
                    detail: "pattern matched across a newline despite never_nl configuration"
                        .to_string(),
                };
                panic!("{}", err);
            }

            let line_start = match memrchr(b'\n', &data[..mstart]) {
                Some(idx) => idx + 1,
                None => 0,
            };
            let line_end = match memchr(b'\n', &data[mend..]) {
                Some(idx) => mend + idx,
                None => data.len(),
            };
            let line = &data[line_start..line_end];

            let off = line_start;
            let attributions: Vec<(&str, &str)> = chunk
                .files()
                .iter()
                .filter(|record| record.left <= off && off < record.right)
                .map(|record| (record.file.revision_label(), record.file.path()))
                .collect();

            on_hit(line, &attributions);
            hits += 1;
            if hits == max_hits {
                return true;
            }

            pos = if line_end < data.len() {
                line_end + 1
            } else {
                data.len()
            };
        }
    }

    hits > 0
}
