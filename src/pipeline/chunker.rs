//! Window planning over raw log lines.
//!
//! Anchor-first: lines matching a crash-report marker seed windows with
//! leading context, overlapping windows are merged, and only when no
//! marker exists anywhere does the planner fall back to fixed-stride
//! sliding windows covering the whole log.

use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::types::{AnchorKind, Chunk, SpanMode};

/// Context lines kept before each anchor line.
const ANCHOR_PRE_CONTEXT: usize = 20;

/// Windows overlapping by at least this many lines collapse into one.
const MERGE_SLACK: usize = 10;

// ═══════════════════════════════════════════
// Anchor tables
// ═══════════════════════════════════════════

/// Markers that open a sanitizer report. `Call Trace:` is deliberately
/// case-sensitive: the kernel emits it verbatim, and matching loose
/// here drags in unrelated userspace noise.
static PRIMARY_ANCHORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)BUG:\s*KASAN").expect("valid regex"),
        Regex::new(r"\bCall Trace:").expect("valid regex"),
    ]
});

/// Looser markers for report bodies. These only place windows; section
/// attribution downstream applies its own, stricter patterns.
static SECONDARY_ANCHORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(Read|Write) of size \d+").expect("valid regex"),
        Regex::new(r"(?i)\bCPU:\s*\d+").expect("valid regex"),
        Regex::new(r"(?i)\bHardware name:\s*").expect("valid regex"),
        Regex::new(r"(?i)\bAllocated by task\b").expect("valid regex"),
        Regex::new(r"(?i)\bFreed by task\b").expect("valid regex"),
        Regex::new(r"(?i)\bThe buggy address belongs to\b").expect("valid regex"),
        Regex::new(r"(?i)\bMemory state around\b").expect("valid regex"),
        Regex::new(r"(?i)\bpage_owner\b").expect("valid regex"),
        Regex::new(r"(?i)^page:\s*[0-9a-fx]+").expect("valid regex"),
        Regex::new(r"(?i)\b(slab|kmalloc|kmem_cache|object)\b").expect("valid regex"),
        Regex::new(r"(?i)\bDisassembly\b|^Code:").expect("valid regex"),
        Regex::new(r"(?i)\bftrace\b|\btracing\b|^trace:").expect("valid regex"),
    ]
});

fn is_anchor_line(line: &str) -> bool {
    PRIMARY_ANCHORS.iter().any(|p| p.is_match(line))
        || SECONDARY_ANCHORS.iter().any(|p| p.is_match(line))
}

// ═══════════════════════════════════════════
// Window construction
// ═══════════════════════════════════════════

/// The chunker's output for one record.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    /// Number of anchor lines found. Zero when sliding or full-span.
    pub anchor_hits: usize,
}

fn anchor_lines(lines: &[&str]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_anchor_line(line))
        .map(|(i, _)| i)
        .collect()
}

/// Merge sorted intervals that overlap by at least `MERGE_SLACK` lines,
/// re-clipping any merged interval that grew past `max_lines`.
fn merge_windows(mut intervals: Vec<(usize, usize)>, max_lines: usize) -> Vec<(usize, usize)> {
    intervals.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in intervals {
        match merged.last_mut() {
            Some((prev_start, prev_end)) if start + MERGE_SLACK <= *prev_end => {
                *prev_end = (*prev_end).max(end);
                if *prev_end - *prev_start > max_lines {
                    *prev_end = *prev_start + max_lines;
                }
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn anchor_windows(lines: &[&str], max_lines: usize) -> (Vec<Chunk>, usize) {
    let anchors = anchor_lines(lines);
    if anchors.is_empty() {
        return (Vec::new(), 0);
    }
    let n = lines.len();
    let intervals: Vec<(usize, usize)> = anchors
        .iter()
        .map(|&a| {
            let start = a.saturating_sub(ANCHOR_PRE_CONTEXT);
            (start, (start + max_lines).min(n))
        })
        .collect();
    let chunks = merge_windows(intervals, max_lines)
        .into_iter()
        .map(|(start, end)| Chunk {
            start,
            end,
            kind: AnchorKind::Anchor,
        })
        .collect();
    (chunks, anchors.len())
}

fn sliding_windows(n: usize, max_lines: usize, stride: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let overlap = max_lines.saturating_sub(stride);
    let mut i = 0usize;
    while i < n {
        let j = (i + max_lines).min(n);
        chunks.push(Chunk {
            start: i,
            end: j,
            kind: AnchorKind::Sliding,
        });
        if j == n {
            break;
        }
        i = j - overlap;
    }
    chunks
}

/// Plan the windows for one record. Full span yields a single window
/// over the whole log; windowed span tries anchors first and slides
/// only when the log has no recognizable marker at all.
pub fn plan_chunks(lines: &[&str], span: SpanMode, max_lines: usize, stride: usize) -> ChunkPlan {
    if lines.is_empty() {
        return ChunkPlan {
            chunks: Vec::new(),
            anchor_hits: 0,
        };
    }
    if span == SpanMode::Full {
        return ChunkPlan {
            chunks: vec![Chunk {
                start: 0,
                end: lines.len(),
                kind: AnchorKind::Sliding,
            }],
            anchor_hits: 0,
        };
    }
    // A zero window or stride would stall the sweep.
    let max_lines = max_lines.max(1);
    let stride = stride.clamp(1, max_lines);

    let (chunks, hits) = anchor_windows(lines, max_lines);
    if !chunks.is_empty() {
        return ChunkPlan {
            chunks,
            anchor_hits: hits,
        };
    }
    ChunkPlan {
        chunks: sliding_windows(lines.len(), max_lines, stride),
        anchor_hits: 0,
    }
}

/// Materialize a chunk's text from the record's lines.
pub fn chunk_text(lines: &[&str], chunk: &Chunk) -> String {
    let end = chunk.end.min(lines.len());
    if chunk.start >= end {
        return String::new();
    }
    lines[chunk.start..end].join("\n")
}
