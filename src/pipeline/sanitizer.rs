//! Verbatim filtering of oracle output against the raw log.
//!
//! The guarantee downstream code relies on: every kept line is an exact
//! case-sensitive contiguous substring of the record's raw text. Lines
//! that only match after rewriting (other than losing a bracketed
//! timestamp prefix, which leaves a suffix of the raw line) are dropped.

use std::collections::HashSet;

use crate::registry::strip_timestamps;

/// Precomputed lookup over the raw text. Every entry in `lines` is a
/// slice of `raw`, so a hit on either path proves the substring
/// property without a second scan.
pub struct VerbatimIndex<'a> {
    raw: &'a str,
    lines: HashSet<&'a str>,
}

impl<'a> VerbatimIndex<'a> {
    pub fn new(raw: &'a str) -> Self {
        let mut lines = HashSet::new();
        for line in raw.lines() {
            lines.insert(line);
            lines.insert(line.trim());
            let bare = strip_timestamps(line);
            lines.insert(bare);
            lines.insert(bare.trim());
        }
        Self { raw, lines }
    }

    /// Whether `line` occurs verbatim in the raw text. The set covers
    /// the common cases (whole lines, with or without their timestamp
    /// prefix or edge whitespace); arbitrary mid-line fragments fall
    /// through to a full substring scan.
    pub fn contains(&self, line: &str) -> bool {
        self.lines.contains(line) || self.raw.contains(line)
    }
}

/// Result of filtering one block of oracle text.
#[derive(Debug, Default)]
pub struct SanitizeOutcome {
    pub kept: Vec<String>,
    pub dropped: Vec<String>,
}

/// Keep only the lines of `extracted` that occur verbatim in the raw
/// text behind `index`. Blank lines are skipped outright; they are
/// formatting, not content, and never counted as drops.
pub fn sanitize_lines(extracted: &str, index: &VerbatimIndex<'_>) -> SanitizeOutcome {
    let mut outcome = SanitizeOutcome::default();
    for line in extracted.lines() {
        let line = line.trim_matches('\r');
        if line.is_empty() {
            continue;
        }
        if index.contains(line) {
            outcome.kept.push(line.to_string());
        } else {
            outcome.dropped.push(line.to_string());
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "[   12.345678] BUG: KASAN: use-after-free in io_poll_remove+0x1a/0x2b\n\
        [   12.345679] Read of size 8 at addr ffff888012345678 by task syz-executor/1234\n\
        [   12.345680][ C0] Call Trace:\n\
        some plain line without timestamp\n";

    #[test]
    fn exact_raw_line_is_kept() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines("some plain line without timestamp", &index);
        assert_eq!(out.kept.len(), 1);
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn timestamp_stripped_line_is_kept() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines(
            "BUG: KASAN: use-after-free in io_poll_remove+0x1a/0x2b",
            &index,
        );
        assert_eq!(out.kept.len(), 1);
    }

    #[test]
    fn double_bracket_prefix_is_stripped_too() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines("Call Trace:", &index);
        assert_eq!(out.kept, vec!["Call Trace:".to_string()]);
    }

    #[test]
    fn fabricated_line_is_dropped() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines("The bug is a use-after-free in the poll path", &index);
        assert!(out.kept.is_empty());
        assert_eq!(out.dropped.len(), 1);
    }

    #[test]
    fn case_mismatch_is_dropped() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines("bug: kasan: use-after-free in io_poll_remove+0x1a/0x2b", &index);
        assert!(out.kept.is_empty());
    }

    #[test]
    fn rewritten_whitespace_is_dropped() {
        let index = VerbatimIndex::new(RAW);
        // The oracle collapsed interior spaces; the raw text never
        // contained this exact byte sequence, so it must not survive.
        let out = sanitize_lines("Read of size 8 at addr  ffff888012345678", &index);
        assert!(out.kept.is_empty());
    }

    #[test]
    fn mid_line_fragment_is_kept_via_substring_scan() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines("use-after-free in io_poll_remove", &index);
        assert_eq!(out.kept.len(), 1);
    }

    #[test]
    fn blank_lines_are_neither_kept_nor_dropped() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines("\n\nCall Trace:\n\n", &index);
        assert_eq!(out.kept.len(), 1);
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn empty_extraction_yields_empty_outcome() {
        let index = VerbatimIndex::new(RAW);
        let out = sanitize_lines("", &index);
        assert!(out.kept.is_empty());
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn every_kept_line_is_a_substring_of_raw() {
        let index = VerbatimIndex::new(RAW);
        let mixed = "Call Trace:\nnot in the log at all\nRead of size 8 at addr ffff888012345678 by task syz-executor/1234\n";
        let out = sanitize_lines(mixed, &index);
        assert_eq!(out.kept.len(), 2);
        for line in &out.kept {
            assert!(RAW.contains(line.as_str()), "{line:?} must be verbatim");
        }
    }
}
