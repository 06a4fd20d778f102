//! Canonical section ordering and line-level noise removal.
//!
//! `bucketize` attributes free-form kept lines to sections by their
//! headers; `canonicalize` then dedupes within each section, prunes
//! instrumentation stack frames, and reduces single-line sections
//! (CPU, hardware) to their best representative. Both are deterministic
//! and `canonicalize` is idempotent on its own output.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::explain::{ExplainRecorder, Stage};
use crate::pipeline::types::{DropReason, SectionMap};
use crate::registry::{self, normalize_for_match, SectionName};

/// Stack frames emitted by the sanitizer/report machinery itself.
/// They describe the instrumentation, not the crash, and are removed
/// from every section. Section headers are never denylisted, so a bug
/// title naming one of these symbols survives.
static TOOL_FRAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(dump_stack|kasan_report|__asan_|printk|__warn|report_bug|show_regs|warn_slowpath|__dump_stack|__traceiter_)",
    )
    .expect("valid regex")
});

/// Attribute lines to sections. A line matching a section header opens
/// that section and is kept as its first line; following lines attach
/// to the open section. Lines arriving before any header have no home
/// and are dropped.
pub fn bucketize(lines: &[String], rec: &mut ExplainRecorder) -> SectionMap {
    let mut sections = SectionMap::new();
    let mut current: Option<SectionName> = None;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(name) = registry::detect(line) {
            current = Some(name);
            sections.entry(name).or_default().push(line.clone());
        } else if let Some(name) = current {
            sections.entry(name).or_default().push(line.clone());
        } else {
            rec.note_drop(Stage::Order, DropReason::UnknownSection, line);
        }
    }
    sections
}

fn cpu_score(line: &str) -> (bool, usize) {
    (
        line.to_lowercase().contains("comm:"),
        normalize_for_match(line).len(),
    )
}

fn hardware_score(line: &str) -> (bool, usize) {
    (false, normalize_for_match(line).len())
}

/// Reduce a section to its single best line, first occurrence winning
/// ties. CPU and hardware lines repeat across a report with varying
/// completeness; only the most informative one carries signal.
fn pick_best<F>(sections: &mut SectionMap, name: SectionName, rec: &mut ExplainRecorder, score: F)
where
    F: Fn(&str) -> (bool, usize),
{
    let Some(lines) = sections.get_mut(&name) else {
        return;
    };
    if lines.len() <= 1 {
        return;
    }
    let mut best = 0;
    for i in 1..lines.len() {
        if score(&lines[i]) > score(&lines[best]) {
            best = i;
        }
    }
    let keep = lines[best].clone();
    for (i, line) in lines.iter().enumerate() {
        if i != best {
            rec.note_drop(Stage::Order, DropReason::Duplicate, line);
        }
    }
    *lines = vec![keep];
}

/// Within each section: drop blanks, drop instrumentation frames, drop
/// normalized duplicates keeping the first occurrence, then reduce CPU
/// and hardware to one line each. Sections emptied by the above are
/// removed entirely. Line order is never rearranged.
pub fn canonicalize(sections: &mut SectionMap, rec: &mut ExplainRecorder) {
    for lines in sections.values_mut() {
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(lines.len());
        for line in lines.drain(..) {
            let norm = normalize_for_match(&line);
            if norm.is_empty() {
                continue;
            }
            if registry::detect(&line).is_none() && TOOL_FRAMES.is_match(&norm) {
                rec.note_drop(Stage::Order, DropReason::ToolFrame, &line);
                continue;
            }
            if !seen.insert(norm) {
                rec.note_drop(Stage::Order, DropReason::Duplicate, &line);
                continue;
            }
            kept.push(line);
        }
        *lines = kept;
    }
    pick_best(sections, SectionName::Cpu, rec, cpu_score);
    pick_best(sections, SectionName::Hardware, rec, hardware_score);
    sections.retain(|_, lines| !lines.is_empty());
}

/// Bucketize then canonicalize in one step.
pub fn order_sections(lines: &[String], rec: &mut ExplainRecorder) -> SectionMap {
    let mut sections = bucketize(lines, rec);
    canonicalize(&mut sections, rec);
    sections
}
