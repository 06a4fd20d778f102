//! Section catalog: the single source of truth for what a crash-report
//! section is.
//!
//! Every downstream stage (augmenter, fallback, orderer, policy) resolves
//! section identity through this registry: detection patterns, core vs
//! diagnostic class, per-section collection limits, and the trim priority
//! used when the diagnostic budget overflows. Canonical output order is
//! the declaration order of [`SectionName`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Section identifiers
// ═══════════════════════════════════════════

/// All recognized crash-report sections, in canonical output order.
///
/// The derived `Ord` follows declaration order, so a
/// `BTreeMap<SectionName, _>` serializes sections canonically for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    // Core: expected in nearly every valid report.
    Bug,
    ReadWrite,
    Cpu,
    Hardware,
    CallTrace,
    AllocatedBy,
    FreedBy,
    BuggyAddress,
    MemoryState,
    // Diagnostic: optional tail content, included only on request.
    PageOwner,
    PageDump,
    SlabObject,
    Disassembly,
    Ftrace,
    Registers,
}

impl SectionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::ReadWrite => "read_write",
            Self::Cpu => "cpu",
            Self::Hardware => "hardware",
            Self::CallTrace => "call_trace",
            Self::AllocatedBy => "allocated_by",
            Self::FreedBy => "freed_by",
            Self::BuggyAddress => "buggy_address",
            Self::MemoryState => "memory_state",
            Self::PageOwner => "page_owner",
            Self::PageDump => "page_dump",
            Self::SlabObject => "slab_object",
            Self::Disassembly => "disassembly",
            Self::Ftrace => "ftrace",
            Self::Registers => "registers",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|n| n.as_str() == s)
    }

    pub fn all() -> &'static [SectionName] {
        &[
            Self::Bug,
            Self::ReadWrite,
            Self::Cpu,
            Self::Hardware,
            Self::CallTrace,
            Self::AllocatedBy,
            Self::FreedBy,
            Self::BuggyAddress,
            Self::MemoryState,
            Self::PageOwner,
            Self::PageDump,
            Self::SlabObject,
            Self::Disassembly,
            Self::Ftrace,
            Self::Registers,
        ]
    }

    pub fn class(&self) -> SectionClass {
        spec(*self).class
    }

    pub fn is_core(&self) -> bool {
        self.class() == SectionClass::Core
    }
}

impl std::fmt::Display for SectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Core sections open every report; diagnostic sections are tail content
/// gated behind `include_diag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionClass {
    Core,
    Diagnostic,
}

// ═══════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════

/// One catalog entry: detection patterns plus the limits that govern the
/// section across the pipeline.
pub struct SectionSpec {
    pub name: SectionName,
    pub class: SectionClass,
    patterns: Vec<Regex>,
    /// Budget-trim priority among diagnostic sections; higher survives
    /// longer. Core sections carry the maximum and are never budget-trimmed.
    pub trim_priority: u8,
    /// Maximum lines collected when the augmenter lifts this section's
    /// block out of the raw log.
    pub collect_max: usize,
}

impl SectionSpec {
    /// True if `line` (already match-normalized) opens this section.
    pub fn matches(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }
}

fn entry(
    name: SectionName,
    class: SectionClass,
    patterns: &[&str],
    trim_priority: u8,
    collect_max: usize,
) -> SectionSpec {
    SectionSpec {
        name,
        class,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).expect("valid section pattern"))
            .collect(),
        trim_priority,
        collect_max,
    }
}

/// The catalog, in canonical order. Built once, read-only everywhere.
static CATALOG: LazyLock<Vec<SectionSpec>> = LazyLock::new(|| {
    use SectionClass::{Core, Diagnostic};
    use SectionName::*;
    vec![
        entry(Bug, Core, &[r"(?i)BUG:\s*KASAN"], 100, 120),
        entry(ReadWrite, Core, &[r"(?i)\b(Read|Write) of size \d+"], 100, 120),
        entry(Cpu, Core, &[r"(?i)^CPU:\s*\d+"], 100, 120),
        entry(Hardware, Core, &[r"(?i)^Hardware name:"], 100, 120),
        entry(CallTrace, Core, &[r"(?i)^Call Trace:"], 100, 200),
        entry(AllocatedBy, Core, &[r"(?i)^Allocated by task"], 100, 300),
        entry(FreedBy, Core, &[r"(?i)^Freed by task"], 100, 300),
        entry(BuggyAddress, Core, &[r"(?i)^The buggy address belongs to"], 100, 300),
        entry(MemoryState, Core, &[r"(?i)^Memory state around"], 100, 300),
        entry(PageOwner, Diagnostic, &[r"(?i)\bpage_owner\b"], 30, 800),
        entry(PageDump, Diagnostic, &[r"(?i)^page:\s*[0-9a-fx]+"], 40, 800),
        entry(
            SlabObject,
            Diagnostic,
            &[r"(?i)\b(slab|kmalloc|kmem_cache|object)\b"],
            20,
            800,
        ),
        entry(Disassembly, Diagnostic, &[r"(?i)\bDisassembly\b|^Code:"], 50, 800),
        entry(
            Ftrace,
            Diagnostic,
            &[r"(?i)\bftrace\b|\btracing\b|^trace:"],
            10,
            800,
        ),
        entry(
            Registers,
            Diagnostic,
            &[r"(?i)^RIP:|^RSP:|^RAX:|^RBX:|^RCX:|^RDX:|^RSI:|^RDI:|^RBP:|^R\d{2}:|^EIP:|^ESP:"],
            60,
            800,
        ),
    ]
});

/// Look up the catalog entry for a section.
pub fn spec(name: SectionName) -> &'static SectionSpec {
    // Canonical order matches declaration order, so the index is the
    // position in `all()`.
    let idx = SectionName::all()
        .iter()
        .position(|n| *n == name)
        .expect("every section is cataloged");
    &CATALOG[idx]
}

/// Which section does this raw line open, if any?
///
/// First match in canonical order wins, so core headers shadow the looser
/// diagnostic patterns.
pub fn detect(line: &str) -> Option<SectionName> {
    let norm = normalize_for_match(line);
    CATALOG.iter().find(|s| s.matches(&norm)).map(|s| s.name)
}

pub fn core_sections() -> impl Iterator<Item = SectionName> {
    SectionName::all().iter().copied().filter(|n| n.is_core())
}

pub fn diagnostic_sections() -> impl Iterator<Item = SectionName> {
    SectionName::all().iter().copied().filter(|n| !n.is_core())
}

// ═══════════════════════════════════════════
// Match normalization
// ═══════════════════════════════════════════

/// Console timestamp prefix, e.g. `[ 12.345678]` or `[ 12.3][ T4523]`.
static TS_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\[[^\]]+\]\s*){1,2}").expect("valid regex"));

static WS_MULTI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Drop a leading console timestamp prefix, borrowing from the input.
pub fn strip_timestamps(line: &str) -> &str {
    match TS_PREFIX.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// Normalize a line for pattern matching and duplicate comparison:
/// timestamp prefix dropped, runs of whitespace collapsed, ends trimmed.
pub fn normalize_for_match(line: &str) -> String {
    WS_MULTI
        .replace_all(strip_timestamps(line), " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_is_declaration_order() {
        let all = SectionName::all();
        let mut sorted = all.to_vec();
        sorted.sort();
        assert_eq!(all, sorted.as_slice());
    }

    #[test]
    fn core_precedes_diagnostic() {
        assert!(SectionName::MemoryState < SectionName::PageOwner);
        assert!(SectionName::Bug < SectionName::Registers);
    }

    #[test]
    fn round_trips_names() {
        for name in SectionName::all() {
            assert_eq!(SectionName::from_str(name.as_str()), Some(*name));
        }
        assert_eq!(SectionName::from_str("not_a_section"), None);
    }

    #[test]
    fn detects_bug_header() {
        assert_eq!(
            detect("BUG: KASAN: use-after-free in io_poll_remove_entry"),
            Some(SectionName::Bug)
        );
    }

    #[test]
    fn detects_through_timestamp_prefix() {
        assert_eq!(
            detect("[  512.346850] Call Trace:"),
            Some(SectionName::CallTrace)
        );
        assert_eq!(
            detect("[  512.3][ T4523] CPU: 1 PID: 4523 Comm: syz-executor"),
            Some(SectionName::Cpu)
        );
    }

    #[test]
    fn detects_read_write_line() {
        assert_eq!(
            detect("Read of size 8 at addr ffff8880751bc0a8 by task syz-executor/4523"),
            Some(SectionName::ReadWrite)
        );
        assert_eq!(
            detect("Write of size 4 at addr ffff888000000000"),
            Some(SectionName::ReadWrite)
        );
    }

    #[test]
    fn core_shadows_diagnostic() {
        // This line also matches the SlabObject "object" pattern; the
        // core header must win.
        assert_eq!(
            detect("The buggy address belongs to the object at ffff8880466fc280"),
            Some(SectionName::BuggyAddress)
        );
        assert_eq!(
            detect("Allocated by task 4523:"),
            Some(SectionName::AllocatedBy)
        );
    }

    #[test]
    fn detects_diagnostic_sections() {
        assert_eq!(detect("page_owner tracks the page as allocated"), Some(SectionName::PageOwner));
        assert_eq!(
            detect("page:ffffea0001d9ff80 refcount:1 mapcount:0"),
            Some(SectionName::PageDump)
        );
        assert_eq!(detect("RIP: 0010:io_poll_remove_entry+0x2d0/0x870"), Some(SectionName::Registers));
        assert_eq!(detect("Code: 48 8b 44 24 10 48 89 44"), Some(SectionName::Disassembly));
    }

    #[test]
    fn plain_frame_line_opens_nothing() {
        assert_eq!(detect(" __fput+0x3f9/0x8e0 fs/file_table.c:280"), None);
        assert_eq!(detect(""), None);
    }

    #[test]
    fn boundary_guard_ignores_compound_symbols() {
        // slab/kmalloc inside a larger symbol must not open SlabObject.
        assert_eq!(detect(" __kasan_slab_free+0x11/0x20"), None);
        assert_eq!(detect(" kmem_cache_free_bulk+0x2d0/0x870"), None);
    }

    #[test]
    fn strips_single_and_double_timestamp() {
        assert_eq!(strip_timestamps("[   12.345] BUG: KASAN"), "BUG: KASAN");
        assert_eq!(strip_timestamps("[  12.3][ T123] foo"), "foo");
        assert_eq!(strip_timestamps("no prefix here"), "no prefix here");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_for_match("[ 1.2]  CPU:   0  PID: 1"),
            "CPU: 0 PID: 1"
        );
    }

    #[test]
    fn trim_priority_orders_diagnostics() {
        // Registers survive longest, ftrace is trimmed first.
        let mut diags: Vec<_> = diagnostic_sections().collect();
        diags.sort_by_key(|n| spec(*n).trim_priority);
        assert_eq!(diags.first(), Some(&SectionName::Ftrace));
        assert_eq!(diags.last(), Some(&SectionName::Registers));
    }

    #[test]
    fn core_sections_have_max_priority() {
        for name in core_sections() {
            assert_eq!(spec(name).trim_priority, 100);
        }
    }
}
