//! Length and confidence policy over a sectioned result.
//!
//! Enforcement order: low-confidence line filtering, per-section caps,
//! diagnostic gating, then the combined diagnostic budget. Every drop,
//! truncation, and section removal lands in the trace; nothing is
//! trimmed silently.

use crate::pipeline::explain::{ExplainRecorder, Stage};
use crate::pipeline::types::{DropReason, PolicyConfig, SectionMap};
use crate::registry::{self, SectionName};

/// Lines carrying an unresolved-symbolization marker. The kernel prints
/// `? symbol+0x..` for frames it could not verify; the fullwidth variant
/// shows up in logs that passed through non-ASCII tooling.
fn is_low_confidence(line: &str) -> bool {
    line.contains('?') || line.contains('？')
}

fn drop_question_marked(sections: &mut SectionMap, rec: &mut ExplainRecorder) {
    for lines in sections.values_mut() {
        lines.retain(|line| {
            if is_low_confidence(line) {
                rec.note_drop(Stage::Policy, DropReason::LowConfidence, line);
                false
            } else {
                true
            }
        });
    }
}

fn cap_sections(sections: &mut SectionMap, policy: &PolicyConfig, rec: &mut ExplainRecorder) {
    for (name, lines) in sections.iter_mut() {
        let cap = policy.cap_for(*name);
        if lines.len() > cap {
            let dropped = lines.split_off(cap);
            for line in &dropped {
                rec.note_drop(Stage::Policy, DropReason::PolicyCap, line);
            }
            rec.note_truncate(*name, cap, dropped.len());
        }
    }
}

fn remove_diagnostics(sections: &mut SectionMap, rec: &mut ExplainRecorder) {
    let diag: Vec<SectionName> = sections
        .keys()
        .copied()
        .filter(|n| !n.is_core())
        .collect();
    for name in diag {
        sections.remove(&name);
        rec.note_section_removed(Stage::Policy, name, "diagnostics disabled");
    }
}

/// Trim diagnostic sections until their combined length fits the budget,
/// sacrificing the lowest trim priority first. A section smaller than
/// the remaining excess goes entirely; the one straddling the boundary
/// loses its tail.
fn enforce_diag_budget(sections: &mut SectionMap, budget: usize, rec: &mut ExplainRecorder) {
    loop {
        let total: usize = sections
            .iter()
            .filter(|(n, _)| !n.is_core())
            .map(|(_, lines)| lines.len())
            .sum();
        if total <= budget {
            return;
        }
        let excess = total - budget;
        let Some(victim) = sections
            .keys()
            .copied()
            .filter(|n| !n.is_core())
            .min_by_key(|n| registry::spec(*n).trim_priority)
        else {
            return;
        };
        let len = sections[&victim].len();
        if len <= excess {
            if let Some(lines) = sections.remove(&victim) {
                for line in &lines {
                    rec.note_drop(Stage::Policy, DropReason::PolicyCap, line);
                }
            }
            rec.note_section_removed(Stage::Policy, victim, "over diagnostic budget");
        } else if let Some(lines) = sections.get_mut(&victim) {
            let dropped = lines.split_off(len - excess);
            for line in &dropped {
                rec.note_drop(Stage::Policy, DropReason::PolicyCap, line);
            }
            rec.note_truncate(victim, len - excess, dropped.len());
        }
    }
}

/// Apply the full policy to a sectioned result, in place.
pub fn enforce(sections: &mut SectionMap, policy: &PolicyConfig, rec: &mut ExplainRecorder) {
    if policy.drop_question_marked {
        drop_question_marked(sections, rec);
    }
    cap_sections(sections, policy, rec);
    if policy.include_diag {
        enforce_diag_budget(sections, policy.diag_total_max, rec);
    } else {
        remove_diagnostics(sections, rec);
    }
    sections.retain(|_, lines| !lines.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rec() -> ExplainRecorder {
        ExplainRecorder::new("t")
    }

    fn section(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    fn numbered(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn call_trace_cap_keeps_the_first_lines_and_logs_the_cut() {
        let mut sections = SectionMap::new();
        let mut lines = vec!["Call Trace:".to_string()];
        lines.extend(numbered(" frame_", 7));
        sections.insert(SectionName::CallTrace, lines);

        let mut policy = PolicyConfig::default();
        policy.section_caps.insert(SectionName::CallTrace, 5);
        let mut rec = make_rec();
        enforce(&mut sections, &policy, &mut rec);

        let ct = &sections[&SectionName::CallTrace];
        assert_eq!(ct.len(), 5);
        assert_eq!(ct[0], "Call Trace:");
        assert_eq!(ct[4], " frame_3");

        let trace = rec.into_trace();
        assert!(trace
            .events
            .iter()
            .any(|e| e.action == "truncate" && e.detail == "call_trace kept=5 dropped=3"));
        let cap_drops = trace
            .events
            .iter()
            .filter(|e| e.detail.starts_with("policy_cap"))
            .count();
        assert_eq!(cap_drops, 3);
    }

    #[test]
    fn question_marked_lines_are_filtered_when_configured() {
        let mut sections = SectionMap::new();
        sections.insert(
            SectionName::CallTrace,
            section(&[
                "Call Trace:",
                " ? unreliable_frame+0x1/0x2",
                " solid_frame+0x3/0x4",
                " 另一个？frame",
            ]),
        );
        let mut rec = make_rec();
        enforce(&mut sections, &PolicyConfig::default(), &mut rec);
        assert_eq!(
            sections[&SectionName::CallTrace],
            section(&["Call Trace:", " solid_frame+0x3/0x4"])
        );
        let low = rec
            .into_trace()
            .events
            .iter()
            .filter(|e| e.detail.starts_with("low_confidence"))
            .count();
        assert_eq!(low, 2);
    }

    #[test]
    fn question_marked_lines_survive_when_filter_is_off() {
        let mut sections = SectionMap::new();
        sections.insert(
            SectionName::CallTrace,
            section(&["Call Trace:", " ? maybe_frame+0x1/0x2"]),
        );
        let policy = PolicyConfig {
            drop_question_marked: false,
            ..PolicyConfig::default()
        };
        let mut rec = make_rec();
        enforce(&mut sections, &policy, &mut rec);
        assert_eq!(sections[&SectionName::CallTrace].len(), 2);
    }

    #[test]
    fn diagnostics_vanish_when_not_requested() {
        let mut sections = SectionMap::new();
        sections.insert(SectionName::Bug, section(&["BUG: KASAN: x in y"]));
        sections.insert(SectionName::Registers, section(&["RIP: 0010:y+0x1/0x2"]));
        let mut rec = make_rec();
        enforce(&mut sections, &PolicyConfig::default(), &mut rec);
        assert!(sections.contains_key(&SectionName::Bug));
        assert!(!sections.contains_key(&SectionName::Registers));
        assert!(rec
            .into_trace()
            .events
            .iter()
            .any(|e| e.action == "remove_section" && e.detail.contains("registers")));
    }

    #[test]
    fn diag_budget_trims_lowest_priority_first() {
        let mut sections = SectionMap::new();
        sections.insert(SectionName::Ftrace, numbered("trace: evt_", 100));
        sections.insert(SectionName::Registers, numbered("RIP: 0010:f_", 100));
        let policy = PolicyConfig {
            max_lines_per_section: 500,
            diag_total_max: 150,
            include_diag: true,
            drop_question_marked: false,
            ..PolicyConfig::default()
        };
        let mut rec = make_rec();
        enforce(&mut sections, &policy, &mut rec);
        // Ftrace (priority 10) loses its tail; registers stay whole.
        assert_eq!(sections[&SectionName::Ftrace].len(), 50);
        assert_eq!(sections[&SectionName::Registers].len(), 100);
    }

    #[test]
    fn diag_budget_removes_whole_sections_when_needed() {
        let mut sections = SectionMap::new();
        sections.insert(SectionName::Ftrace, numbered("trace: evt_", 100));
        sections.insert(SectionName::Registers, numbered("RIP: 0010:f_", 100));
        let policy = PolicyConfig {
            max_lines_per_section: 500,
            diag_total_max: 90,
            include_diag: true,
            drop_question_marked: false,
            ..PolicyConfig::default()
        };
        let mut rec = make_rec();
        enforce(&mut sections, &policy, &mut rec);
        assert!(!sections.contains_key(&SectionName::Ftrace));
        assert_eq!(sections[&SectionName::Registers].len(), 90);
    }

    #[test]
    fn core_sections_are_never_budget_trimmed() {
        let mut sections = SectionMap::new();
        sections.insert(SectionName::MemoryState, numbered("Memory state around_", 90));
        sections.insert(SectionName::Registers, numbered("RIP: 0010:f_", 50));
        let policy = PolicyConfig {
            max_lines_per_section: 500,
            diag_total_max: 10,
            include_diag: true,
            drop_question_marked: false,
            ..PolicyConfig::default()
        };
        let mut rec = make_rec();
        enforce(&mut sections, &policy, &mut rec);
        assert_eq!(sections[&SectionName::MemoryState].len(), 90);
        assert_eq!(sections[&SectionName::Registers].len(), 10);
    }

    #[test]
    fn section_emptied_by_filtering_is_removed() {
        let mut sections = SectionMap::new();
        sections.insert(SectionName::CallTrace, section(&[" ? only_frame+0x1/0x2"]));
        sections.insert(SectionName::Bug, section(&["BUG: KASAN: x in y"]));
        let mut rec = make_rec();
        enforce(&mut sections, &PolicyConfig::default(), &mut rec);
        assert!(!sections.contains_key(&SectionName::CallTrace));
        assert!(sections.contains_key(&SectionName::Bug));
    }

    #[test]
    fn enforcement_is_deterministic_and_idempotent() {
        let build = || {
            let mut sections = SectionMap::new();
            sections.insert(SectionName::Bug, section(&["BUG: KASAN: x in y"]));
            sections.insert(SectionName::CallTrace, {
                let mut v = vec!["Call Trace:".to_string()];
                v.extend(numbered(" frame_", 40));
                v
            });
            sections.insert(SectionName::Ftrace, numbered("trace: evt_", 30));
            sections
        };
        let policy = PolicyConfig::default();

        let mut a = build();
        let mut rec_a = make_rec();
        enforce(&mut a, &policy, &mut rec_a);
        let mut b = build();
        let mut rec_b = make_rec();
        enforce(&mut b, &policy, &mut rec_b);
        assert_eq!(a, b);
        assert_eq!(rec_a.into_trace(), rec_b.into_trace());

        let mut again = a.clone();
        let mut rec_c = make_rec();
        enforce(&mut again, &policy, &mut rec_c);
        assert_eq!(a, again);
    }
}
