//! Append-only provenance trace for one record.
//!
//! The recorder is a pure observer: nothing in the pipeline reads it
//! back, so it can never influence extraction. Events carry no wall
//! clock, which keeps traces byte-identical across runs given the same
//! input. The determinism tests rely on that.

use serde::{Deserialize, Serialize};

use crate::pipeline::types::{DropReason, ProcessMode, SectionMap, SpanMode};
use crate::registry::SectionName;

/// Pipeline stage an event was recorded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Chunk,
    Oracle,
    Sanitize,
    Augment,
    Fallback,
    Order,
    Policy,
    Final,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Oracle => "oracle",
            Self::Sanitize => "sanitize",
            Self::Augment => "augment",
            Self::Fallback => "fallback",
            Self::Order => "order",
            Self::Policy => "policy",
            Self::Final => "final",
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            Self::Chunk => "Chunking",
            Self::Oracle => "Oracle",
            Self::Sanitize => "Sanitization",
            Self::Augment => "Augmentation",
            Self::Fallback => "Fallback",
            Self::Order => "Ordering",
            Self::Policy => "Policy",
            Self::Final => "Final",
        }
    }

    const ALL: [Stage; 8] = [
        Stage::Chunk,
        Stage::Oracle,
        Stage::Sanitize,
        Stage::Augment,
        Stage::Fallback,
        Stage::Order,
        Stage::Policy,
        Stage::Final,
    ];
}

/// One recorded decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: Stage,
    pub action: String,
    pub detail: String,
}

/// The full trace for one record, in recording order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainTrace {
    pub id: String,
    pub events: Vec<TraceEvent>,
}

impl ExplainTrace {
    /// Human-readable sidecar: one heading per stage, one bullet per
    /// event, stages in pipeline order.
    pub fn render_markdown(&self) -> String {
        let mut md = format!("# Explain for {}\n", self.id);
        for stage in Stage::ALL {
            let events: Vec<&TraceEvent> =
                self.events.iter().filter(|e| e.stage == stage).collect();
            if events.is_empty() {
                continue;
            }
            md.push_str(&format!("\n## {}\n", stage.heading()));
            for e in events {
                md.push_str(&format!("- {}: {}\n", e.action, e.detail));
            }
        }
        md
    }
}

/// Collects end-to-end provenance while one record moves through the
/// pipeline.
#[derive(Debug)]
pub struct ExplainRecorder {
    trace: ExplainTrace,
}

impl ExplainRecorder {
    pub fn new(id: &str) -> Self {
        Self {
            trace: ExplainTrace {
                id: id.to_string(),
                events: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.trace.id
    }

    fn push(&mut self, stage: Stage, action: &str, detail: String) {
        self.trace.events.push(TraceEvent {
            stage,
            action: action.to_string(),
            detail,
        });
    }

    pub fn note_pipeline(
        &mut self,
        span: SpanMode,
        mode: ProcessMode,
        chunk_count: usize,
        anchor_hits: usize,
    ) {
        self.push(
            Stage::Chunk,
            "plan",
            format!(
                "span={} mode={} chunks={chunk_count} anchor_hits={anchor_hits}",
                span.as_str(),
                match mode {
                    ProcessMode::Oracle => "oracle",
                    ProcessMode::Rules => "rules",
                }
            ),
        );
    }

    pub fn note_chunk(&mut self, chunk_id: &str, kind: &str, start: usize, end: usize) {
        self.push(
            Stage::Chunk,
            "window",
            format!("{chunk_id} kind={kind} lines={start}..{end}"),
        );
    }

    pub fn note_oracle_result(&mut self, chunk_id: &str, out_lines: usize, kept: usize) {
        self.push(
            Stage::Oracle,
            "answer",
            format!("{chunk_id} out_lines={out_lines} kept={kept}"),
        );
    }

    pub fn note_oracle_failure(&mut self, chunk_id: &str, reason: &str) {
        self.push(Stage::Oracle, "failure", format!("{chunk_id} {reason}"));
    }

    pub fn note_drop(&mut self, stage: Stage, reason: DropReason, line: &str) {
        self.push(stage, "drop", format!("{}: {line}", reason.as_str()));
    }

    pub fn note_augment(&mut self, section: SectionName, start_line: usize, added: usize) {
        self.push(
            Stage::Augment,
            "fill",
            format!("{section} from_line={start_line} added={added}"),
        );
    }

    pub fn note_fallback(&mut self, reason: &str) {
        self.push(Stage::Fallback, "fired", reason.to_string());
    }

    pub fn note_truncate(&mut self, section: SectionName, kept: usize, dropped: usize) {
        self.push(
            Stage::Policy,
            "truncate",
            format!("{section} kept={kept} dropped={dropped}"),
        );
    }

    pub fn note_section_removed(&mut self, stage: Stage, section: SectionName, why: &str) {
        self.push(stage, "remove_section", format!("{section} {why}"));
    }

    pub fn note_final(&mut self, sections: &SectionMap, fallback_used: bool) {
        let counts = sections
            .iter()
            .map(|(name, lines)| format!("{name}={}", lines.len()))
            .collect::<Vec<_>>()
            .join(" ");
        self.push(
            Stage::Final,
            "sections",
            if counts.is_empty() {
                format!("none fallback_used={fallback_used}")
            } else {
                format!("{counts} fallback_used={fallback_used}")
            },
        );
    }

    pub fn into_trace(self) -> ExplainTrace {
        self.trace
    }
}
