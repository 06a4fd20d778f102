//! Gap-filling for sections the oracle missed.
//!
//! Works section by section: for each section absent from the result,
//! re-scan the raw log for a line opening it and lift the block that
//! follows, verbatim. Existing sections are never touched, so oracle
//! output always wins over augmentation. Diagnostic sections are only
//! considered when the run asks for them.

use tracing::debug;

use crate::pipeline::explain::ExplainRecorder;
use crate::pipeline::types::SectionMap;
use crate::registry::{self, SectionName};

/// Lift a section block starting at `start`. Collection stops at the
/// registry's per-section line limit, or just before a line that opens
/// any other section; that line belongs to the next block. The stop
/// rule mirrors how bucketization attributes oracle output, so a filled
/// block never carries another section's lines.
pub(crate) fn collect_block(
    raw_lines: &[&str],
    start: usize,
    name: SectionName,
    max: usize,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = start;
    while i < raw_lines.len() && out.len() < max {
        out.push(raw_lines[i].to_string());
        if let Some(next) = raw_lines.get(i + 1) {
            match registry::detect(next) {
                Some(other) if other != name => break,
                _ => {}
            }
        }
        i += 1;
    }
    out
}

pub(crate) fn find_opener(raw_lines: &[&str], name: SectionName) -> Option<usize> {
    raw_lines
        .iter()
        .position(|line| registry::detect(line) == Some(name))
}

fn fill_section(
    sections: &mut SectionMap,
    raw_lines: &[&str],
    name: SectionName,
    rec: &mut ExplainRecorder,
) {
    if sections.contains_key(&name) {
        return;
    }
    let Some(start) = find_opener(raw_lines, name) else {
        return;
    };
    let block: Vec<String> = collect_block(raw_lines, start, name, registry::spec(name).collect_max)
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .collect();
    if block.is_empty() {
        return;
    }
    debug!(section = %name, from_line = start, added = block.len(), "augmented missing section");
    rec.note_augment(name, start, block.len());
    sections.insert(name, block);
}

/// Fill every missing core section (and, when enabled, every missing
/// diagnostic section) straight from the raw log. Best-effort: sections
/// with no opener in the log simply stay absent.
pub fn augment_missing(
    sections: &mut SectionMap,
    raw_lines: &[&str],
    include_diag: bool,
    rec: &mut ExplainRecorder,
) {
    for name in registry::core_sections() {
        fill_section(sections, raw_lines, name, rec);
    }
    if include_diag {
        for name in registry::diagnostic_sections() {
            fill_section(sections, raw_lines, name, rec);
        }
    }
}
