//! Deterministic crash classification.
//!
//! A decision table over the report text: no oracle, no state, the same
//! report always yields the same facts. Classification never fails; a
//! report the table cannot read comes back as `unknown` everywhere.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

/// Bug classes in match priority order. The first pattern that hits
/// anywhere in the report names the class, so the specific classes sit
/// above the bare sanitizer names.
static BUG_CLASSES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("use-after-free", rx(r"(?i)\buse-after-free\b")),
        (
            "null-ptr-deref",
            rx(r"(?i)\bnull[- ]?ptr[- ]?deref(erence)?\b|\bNULL pointer dereference\b"),
        ),
        ("out-of-bounds", rx(r"(?i)\b(out[- ]?of[- ]?bounds|oob)\b")),
        ("kasan-generic", rx(r"(?i)\bKASAN\b")),
        ("kcsan-race", rx(r"(?i)\bKCSAN\b|\bdata[- ]?race\b")),
        (
            "lockdep",
            rx(r"(?i)\blockdep\b|\bpossible recursive locking\b|\bdeadlock\b"),
        ),
        ("ubsan", rx(r"(?i)\bUBSAN\b|\bundefined behavior\b")),
    ]
});

/// Subsystem hints in match priority order.
static SUBSYS_HINTS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("io_uring", rx(r"(?i)\bio_uring\b")),
        ("net", rx(r"(?i)\b(net/|net_)\b")),
        ("mm", rx(r"(?i)\b(mm/|kmalloc|slab|page)\b")),
        ("fs", rx(r"(?i)\b(fs/|vfs|inode|dentry)\b")),
        ("block", rx(r"(?i)\b(block/|bio|blk_)\b")),
    ]
});

static RW_LINE: LazyLock<Regex> =
    LazyLock::new(|| rx(r"(?i)\b(Read|Write)\s+of\s+size\s+(\d+)\b.*?\baddr\b\s+([0-9a-fx]+)"));

static BUG_TITLE: LazyLock<Regex> =
    LazyLock::new(|| rx(r"(?i)^BUG:\s*(KASAN|KCSAN|lockdep|UBSAN).*?\b(in|at)\b\s+([A-Za-z0-9_./:-]+)"));

/// Fallback trigger-function scan, applied to the report head only.
static FUNC_HINT: LazyLock<Regex> = LazyLock::new(|| rx(r"\b(in|at)\b\s+([A-Za-z0-9_./:-]+)"));

static CALL_TRACE_HDR: LazyLock<Regex> = LazyLock::new(|| rx(r"(?i)^\s*Call Trace:\s*$"));

static STACK_FRAME: LazyLock<Regex> =
    LazyLock::new(|| rx(r"(?i)^\s*([A-Za-z0-9_./:-]+)\+0x[0-9a-f]+/0x[0-9a-f]+(?:\s+\S+)?"));

static CPU_TASK: LazyLock<Regex> =
    LazyLock::new(|| rx(r"(?i)^\s*CPU:\s*\d+.*?\btask\b\s+([A-Za-z0-9._-]+)(?:/(\d+))?"));

/// How many leading lines the trigger-function fallback scan may read.
const HEAD_SCAN_LINES: usize = 10;

/// Everything the decision table could read out of one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashFacts {
    pub bug_class: String,
    pub subsystem: String,
    pub function: Option<String>,
    /// `"read"` or `"write"`, lowercased.
    pub rw_dir: Option<String>,
    pub rw_size: Option<u64>,
    pub rw_addr: Option<String>,
    pub task: Option<String>,
    pub tid: Option<String>,
    pub top_frame: Option<String>,
    pub frame_count: usize,
}

impl CrashFacts {
    /// One-line access summary; `"unknown access pattern"` when the
    /// report carried no explicit read/write line.
    pub fn access_pattern(&self) -> String {
        match (&self.rw_dir, self.rw_size, &self.rw_addr) {
            (Some(dir), Some(size), Some(addr)) => format!("{dir} of size {size} at {addr}"),
            _ => "unknown access pattern".to_string(),
        }
    }
}

/// Read the facts out of one rendered report.
pub fn parse_crash_facts(report: &str) -> CrashFacts {
    let lines: Vec<&str> = report.lines().collect();

    let bug_title = first_capture(&BUG_TITLE, &lines);
    let rw = first_capture(&RW_LINE, &lines);
    let cpu = first_capture(&CPU_TASK, &lines);
    let frames = collect_call_trace(&lines);

    let function = match &bug_title {
        Some(caps) => caps.get(3).map(|m| m.as_str().to_string()),
        None => first_capture(&FUNC_HINT, &lines[..lines.len().min(HEAD_SCAN_LINES)])
            .and_then(|caps| caps.get(2).map(|m| m.as_str().to_string())),
    };

    let (rw_dir, rw_size, rw_addr) = match &rw {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_ascii_lowercase()),
            caps.get(2).and_then(|m| m.as_str().parse::<u64>().ok()),
            caps.get(3).map(|m| m.as_str().to_string()),
        ),
        None => (None, None, None),
    };

    let (task, tid) = match &cpu {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (None, None),
    };

    CrashFacts {
        bug_class: classify(&BUG_CLASSES, report).to_string(),
        subsystem: classify(&SUBSYS_HINTS, report).to_string(),
        function,
        rw_dir,
        rw_size,
        rw_addr,
        task,
        tid,
        top_frame: frames.first().cloned(),
        frame_count: frames.len(),
    }
}

fn classify(table: &[(&'static str, Regex)], report: &str) -> &'static str {
    table
        .iter()
        .find(|(_, pattern)| pattern.is_match(report))
        .map(|(name, _)| *name)
        .unwrap_or("unknown")
}

fn first_capture<'t>(pattern: &Regex, lines: &[&'t str]) -> Option<Captures<'t>> {
    lines.iter().find_map(|line| pattern.captures(line))
}

/// Stack frames after the first `Call Trace:` header. A blank line or a
/// block header (anything ending in `:`) ends the trace; other
/// non-frame lines are skipped.
fn collect_call_trace(lines: &[&str]) -> Vec<String> {
    let mut frames = Vec::new();
    let mut in_trace = false;
    for line in lines {
        if CALL_TRACE_HDR.is_match(line) {
            in_trace = true;
            continue;
        }
        if !in_trace {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if STACK_FRAME.is_match(line) {
            frames.push(trimmed.to_string());
        } else if trimmed.ends_with(':') {
            break;
        }
    }
    frames
}
