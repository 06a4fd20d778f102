//! Core types for the extraction pipeline.
//!
//! These model the per-record lifecycle:
//! LogRecord → Chunks → oracle text → SectionMap → Candidate.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::SectionName;

// ═══════════════════════════════════════════
// Input record
// ═══════════════════════════════════════════

/// One raw log to process. Immutable; `raw_text` is the sole source of
/// truth for every verbatim check downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    #[serde(rename = "log")]
    pub raw_text: String,
}

impl LogRecord {
    pub fn new(id: &str, raw_text: &str) -> Self {
        Self {
            id: id.to_string(),
            raw_text: raw_text.to_string(),
        }
    }

    pub fn lines(&self) -> Vec<&str> {
        self.raw_text.lines().collect()
    }
}

// ═══════════════════════════════════════════
// Chunks
// ═══════════════════════════════════════════

/// How a chunk window was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    /// Window centered on a recognized crash-report marker.
    Anchor,
    /// Fixed-stride window from the full-coverage fallback.
    Sliding,
}

impl AnchorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anchor => "anchor",
            Self::Sliding => "sliding",
        }
    }
}

/// A candidate window over a record's lines, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub kind: AnchorKind,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

// ═══════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════

/// Sectioned lines keyed canonically. The `BTreeMap` key order is the
/// canonical section order, so serialization never needs a sort.
pub type SectionMap = BTreeMap<SectionName, Vec<String>>;

/// The finalized, policy-enforced extraction result for one record.
///
/// Invariant: every line is an exact contiguous substring of the owning
/// record's raw text. A missing key means "not found"; empty vectors are
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub sections: SectionMap,
    pub fallback_used: bool,
}

impl Candidate {
    /// Render the report as plain text: sections in canonical order,
    /// blank line between sections. This is what the diagnosis engine
    /// and human-readable artifacts consume.
    pub fn to_report_text(&self) -> String {
        let mut out = String::new();
        for lines in self.sections.values() {
            if !out.is_empty() {
                out.push('\n');
            }
            for line in lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    pub fn core_section_count(&self) -> usize {
        self.sections.keys().filter(|n| n.is_core()).count()
    }

    pub fn total_lines(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}

// ═══════════════════════════════════════════
// Run configuration
// ═══════════════════════════════════════════

/// Length and confidence policy, immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Cap for any section without an explicit override.
    pub max_lines_per_section: usize,
    /// Per-section overrides of the default cap.
    pub section_caps: BTreeMap<SectionName, usize>,
    /// Combined budget across all diagnostic sections.
    pub diag_total_max: usize,
    /// Drop lines carrying an unresolved-symbolization question mark.
    pub drop_question_marked: bool,
    /// Keep diagnostic sections at all.
    pub include_diag: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut section_caps = BTreeMap::new();
        section_caps.insert(SectionName::CallTrace, 25);
        section_caps.insert(SectionName::AllocatedBy, 80);
        section_caps.insert(SectionName::FreedBy, 80);
        section_caps.insert(SectionName::BuggyAddress, 80);
        section_caps.insert(SectionName::MemoryState, 96);
        Self {
            max_lines_per_section: 120,
            section_caps,
            diag_total_max: 400,
            drop_question_marked: true,
            include_diag: false,
        }
    }
}

impl PolicyConfig {
    pub fn cap_for(&self, name: SectionName) -> usize {
        self.section_caps
            .get(&name)
            .copied()
            .unwrap_or(self.max_lines_per_section)
    }
}

/// Windowing span: whole log as one window, or anchored/sliding windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanMode {
    Full,
    Windowed,
}

impl SpanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Windowed => "windowed",
        }
    }
}

/// Whether the oracle is consulted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    /// Oracle first, rule fallback on failure.
    Oracle,
    /// Rule-based extraction only; the oracle is never called.
    Rules,
}

/// Knobs for the extraction run, immutable once the batch starts.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub span: SpanMode,
    pub mode: ProcessMode,
    pub max_lines_per_chunk: usize,
    pub chunk_stride: usize,
    pub group_size: usize,
    pub token_budget: usize,
    pub record_deadline: Duration,
    pub worker_threads: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            span: SpanMode::Windowed,
            mode: ProcessMode::Oracle,
            max_lines_per_chunk: 60,
            chunk_stride: 50,
            group_size: 1,
            token_budget: 500,
            record_deadline: Duration::from_secs(90),
            worker_threads: 2,
        }
    }
}

// ═══════════════════════════════════════════
// Drop bookkeeping
// ═══════════════════════════════════════════

/// Why a line was removed from the result. Every removal lands in the
/// explain trace with one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NonVerbatim,
    Duplicate,
    ToolFrame,
    PolicyCap,
    LowConfidence,
    UnknownSection,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonVerbatim => "non_verbatim",
            Self::Duplicate => "duplicate",
            Self::ToolFrame => "tool_frame",
            Self::PolicyCap => "policy_cap",
            Self::LowConfidence => "low_confidence",
            Self::UnknownSection => "unknown_section",
        }
    }
}
