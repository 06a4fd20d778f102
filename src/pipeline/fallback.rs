//! Oracle-independent extraction, used when the oracle is unusable.
//!
//! Sweeps the raw log for every core section the registry knows and
//! lifts each block verbatim, first occurrence winning. The result is
//! plain text so it rides the exact same sanitize → attribute → order →
//! policy path as oracle output; the fallback gets no shortcut past any
//! downstream check.

use tracing::warn;

use crate::pipeline::augmenter::{collect_block, find_opener};
use crate::registry;

/// Extract a best-effort report from the raw text alone. Returns `None`
/// when no core section header exists anywhere in the log, since there
/// is nothing recognizable to extract.
pub fn rule_extract(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut out: Vec<String> = Vec::new();
    for name in registry::core_sections() {
        let Some(start) = find_opener(&lines, name) else {
            continue;
        };
        let block = collect_block(&lines, start, name, registry::spec(name).collect_max);
        out.extend(block.into_iter().filter(|l| !l.trim().is_empty()));
    }
    if out.is_empty() {
        warn!("rule extraction found no recognizable report");
        return None;
    }
    Some(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
systemd[1]: some unrelated noise
BUG: KASAN: use-after-free in io_poll_remove+0x1a/0x2b
Read of size 8 at addr ffff888012345678 by task syz-executor/1234
CPU: 1 PID: 1234 Comm: syz-executor Not tainted 6.1.0 #1
Call Trace:
 io_poll_remove+0x1a/0x2b
 do_syscall_64+0x3f/0x110
Allocated by task 1234:
 kmalloc_reserve+0x3a/0x70
Freed by task 0:
 kfree_skbmem+0x52/0xa0
more trailing noise
";

    #[test]
    fn extracts_core_blocks_from_a_kasan_report() {
        let text = rule_extract(REPORT).unwrap();
        assert!(text.contains("BUG: KASAN: use-after-free"));
        assert!(text.contains("Read of size 8"));
        assert!(text.contains("Call Trace:"));
        assert!(text.contains("Allocated by task 1234:"));
    }

    #[test]
    fn blocks_come_out_in_canonical_order() {
        let text = rule_extract(REPORT).unwrap();
        let bug = text.find("BUG: KASAN").unwrap();
        let rw = text.find("Read of size").unwrap();
        let ct = text.find("Call Trace:").unwrap();
        let freed = text.find("Freed by task").unwrap();
        assert!(bug < rw && rw < ct && ct < freed);
    }

    #[test]
    fn a_block_never_swallows_the_next_section() {
        let text = rule_extract(REPORT).unwrap();
        let alloc_at = text.find("Allocated by task").unwrap();
        let freed_at = text.find("Freed by task").unwrap();
        let between = &text[alloc_at..freed_at];
        assert!(between.contains("kmalloc_reserve"));
        assert!(!between.contains("kfree_skbmem"));
    }

    #[test]
    fn call_trace_only_log_still_extracts() {
        let raw = "noise\nCall Trace:\n frame_a+0x1/0x2\n frame_b+0x3/0x4\nnoise tail\n";
        let text = rule_extract(raw).unwrap();
        assert!(text.starts_with("Call Trace:"));
        assert!(text.contains("frame_a"));
    }

    #[test]
    fn unrecognizable_log_yields_none() {
        assert_eq!(rule_extract("just\nplain\nnoise\n"), None);
        assert_eq!(rule_extract(""), None);
    }

    #[test]
    fn first_report_wins_when_headers_repeat() {
        let raw = "\
BUG: KASAN: use-after-free in first_fn
Read of size 8 at addr ffff111111111111 by task a/1
BUG: KASAN: use-after-free in second_fn
";
        let text = rule_extract(raw).unwrap();
        assert!(text.contains("first_fn"));
        assert!(!text.contains("second_fn"));
    }

    #[test]
    fn every_extracted_line_is_verbatim_raw() {
        let text = rule_extract(REPORT).unwrap();
        for line in text.lines() {
            assert!(REPORT.contains(line), "{line:?} must come from the log");
        }
    }
}
