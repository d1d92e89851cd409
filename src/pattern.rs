//! The pattern-matcher external collaborator.
//!
//! Same shape as [`crate::source`]: the scanner only ever sees the
//! [`Pattern`] trait, never `regex` types.

use regex::bytes::{Regex, RegexBuilder};

/// Abstract compiled pattern supporting unanchored byte-slice search with
/// capture of the matched span.
pub trait Pattern {
    /// Finds the leftmost match in `haystack` starting at or after
    /// `start`, returning `(match_start, match_end)` byte offsets into
    /// `haystack`, or `None` if there is no further match.
    fn find_at(&self, haystack: &[u8], start: usize) -> Option<(usize, usize)>;
}

/// A [`Pattern`] backed by `regex::bytes::Regex`.
///
/// `compile` maps the RE2-style options this tool's REPL is documented
/// against (`never_nl`, `one_line`, `posix_syntax`) onto the nearest
/// `regex` crate equivalents; see DESIGN.md for the exact mapping and its
/// one documented deviation (leftmost-first vs. POSIX leftmost-longest
/// alternation).
pub struct RegexPattern {
    inner: Regex,
}

impl RegexPattern {
    /// Compiles `source` with the engine's fixed option set. Returns the
    /// `regex` crate's own compile error unchanged: the REPL is expected to
    /// catch this, log it, and reissue the prompt rather than treat it as a
    /// domain error.
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let inner = RegexBuilder::new(source)
            // never_nl: '.' must not match '\n'. This is the `regex` crate
            // default; stated explicitly because it is load-bearing.
            .dot_matches_new_line(false)
            // one_line = false: '^'/'$' anchor at line boundaries within
            // the chunk slab, not just at the slab's absolute ends.
            .multi_line(true)
            .build()?;
        Ok(Self { inner })
    }
}

impl Pattern for RegexPattern {
    fn find_at(&self, haystack: &[u8], start: usize) -> Option<(usize, usize)> {
        self.inner
            .find_at(haystack, start)
            .map(|m| (m.start(), m.end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_simple_literal() {
        let p = RegexPattern::compile("bar").unwrap();
        assert_eq!(p.find_at(b"foo\nbar\nbaz\n", 0), Some((4, 7)));
    }

    #[test]
    fn anchors_per_line_not_per_slab() {
        let p = RegexPattern::compile("^bar$").unwrap();
        let hay = b"foo\nbar\nbaz\n";
        assert_eq!(p.find_at(hay, 0), Some((4, 7)));
    }

    #[test]
    fn dot_does_not_cross_newline() {
        let p = RegexPattern::compile("o.b").unwrap();
        // "o\nb" must not match even though it appears at index 2..5.
        assert_eq!(p.find_at(b"foo\nbar\n", 0), None);
    }

    #[test]
    fn rejects_malformed_pattern() {
        assert!(RegexPattern::compile("(unclosed").is_err());
    }
}
