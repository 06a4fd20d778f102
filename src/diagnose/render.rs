//! Presentation for diagnosis artifacts. Pure string building; no
//! parsing, no oracle.

use super::rules::CrashFacts;

/// Markdown bullet summary of one set of facts. Covers the same ground
/// as the narrative mode, but mechanically.
pub fn render_rules_markdown(facts: &CrashFacts) -> String {
    let mut bullets: Vec<String> = Vec::new();

    let function = facts.function.as_deref().unwrap_or("unknown");
    bullets.push(format!(
        "- **Bug type**: `{}`; **trigger function**: `{}`; **suspected subsystem**: `{}`.",
        facts.bug_class, function, facts.subsystem
    ));

    if facts.rw_dir.is_some() {
        bullets.push(format!("- **Memory access**: {}.", facts.access_pattern()));
    } else {
        bullets.push(
            "- **Memory access**: unknown access pattern (no explicit `Read/Write of size ... addr` line)."
                .to_string(),
        );
    }

    match &facts.top_frame {
        Some(top) => bullets.push(format!(
            "- **Stack top**: `{top}` ({} frames total).",
            facts.frame_count
        )),
        None => bullets.push(
            "- **Call trace**: no `Call Trace:` section or stack frames detected.".to_string(),
        ),
    }

    if let Some(task) = &facts.task {
        let tid = facts.tid.as_deref().unwrap_or("?");
        bullets.push(format!("- **Task**: `{task}/{tid}` (from the CPU line)."));
    }

    let mut risk: Vec<&str> = Vec::new();
    match facts.bug_class.as_str() {
        "use-after-free" => {
            risk.push(
                "Access to an already-freed object; typical root causes are a racy free, \
                 a dangling pointer left by a double free, or an object lifetime that was \
                 never extended.",
            );
            risk.push(
                "Behavior is unpredictable; in the worst case the kernel crashes or the \
                 bug becomes exploitable.",
            );
        }
        "null-ptr-deref" => {
            risk.push(
                "NULL pointer dereference, usually a mishandled error path or an \
                 uninitialized object.",
            );
            risk.push("Normally ends in an oops or crash (KASAN may catch it first).");
        }
        "out-of-bounds" => {
            risk.push("Out-of-bounds read/write; can corrupt neighboring objects or leak data.");
        }
        "kcsan-race" => {
            risk.push(
                "Data race between unsynchronized accesses; needs locking or explicit \
                 memory ordering.",
            );
        }
        "lockdep" => {
            risk.push(
                "Lock dependency problem (deadlock or recursive locking); review lock \
                 ordering and hold windows.",
            );
        }
        "ubsan" => {
            risk.push("Undefined behavior, typically unchecked arithmetic or a type conversion.");
        }
        _ => {
            risk.push(
                "Generic memory or synchronization anomaly; correlate with the full log \
                 to narrow it down.",
            );
        }
    }
    bullets.push(format!("- **Risk**:\n  - {}", risk.join("\n  - ")));

    let mut hints: Vec<String> = Vec::new();
    match facts.subsystem.as_str() {
        "io_uring" => {
            hints.push(
                "Check request/context lifetimes on the submission and completion paths, \
                 in particular frees scheduled through task_work or completion callbacks."
                    .to_string(),
            );
            hints.push(
                "Audit refcounts and the cancelation path for a double free or reuse.".to_string(),
            );
        }
        "mm" => {
            hints.push("Check slab/page lifetimes for races between free and reuse.".to_string());
        }
        "fs" => {
            hints.push(
                "Watch inode/dentry lifetimes and mount/umount racing against file \
                 operations."
                    .to_string(),
            );
        }
        "net" => {
            hints.push(
                "Watch skb and socket refcounts against concurrent teardown paths.".to_string(),
            );
        }
        _ => {}
    }
    if let Some(function) = facts.function.as_deref().filter(|name| *name != "unknown") {
        hints.push(format!(
            "Add breakpoints or prints around `{function}` to trace how the object is \
             allocated, freed and accessed."
        ));
    }
    if !hints.is_empty() {
        bullets.push(format!("- **Debug suggestions**:\n  - {}", hints.join("\n  - ")));
    }

    bullets.join("\n")
}

/// Per-record Markdown document: heading plus body.
pub fn render_record_markdown(id: &str, body: &str) -> String {
    format!("# Diagnosis for {id}\n\n{body}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_facts() -> CrashFacts {
        CrashFacts {
            bug_class: "use-after-free".to_string(),
            subsystem: "io_uring".to_string(),
            function: Some("io_rsrc_node_ref_zero".to_string()),
            rw_dir: Some("read".to_string()),
            rw_size: Some(8),
            rw_addr: Some("ffff8880466fc2c8".to_string()),
            task: Some("syz-executor147".to_string()),
            tid: Some("5417".to_string()),
            top_frame: Some("io_rsrc_node_ref_zero+0x1c2/0x610".to_string()),
            frame_count: 4,
        }
    }

    #[test]
    fn summary_names_class_function_and_subsystem() {
        let md = render_rules_markdown(&sample_facts());
        assert!(md.contains("`use-after-free`"));
        assert!(md.contains("`io_rsrc_node_ref_zero`"));
        assert!(md.contains("`io_uring`"));
        assert!(md.contains("read of size 8 at ffff8880466fc2c8"));
        assert!(md.contains("`io_rsrc_node_ref_zero+0x1c2/0x610` (4 frames total)"));
        assert!(md.contains("`syz-executor147/5417`"));
    }

    #[test]
    fn missing_access_line_reads_unknown_access_pattern() {
        let mut facts = sample_facts();
        facts.rw_dir = None;
        facts.rw_size = None;
        facts.rw_addr = None;
        let md = render_rules_markdown(&facts);
        assert!(md.contains("unknown access pattern"));
    }

    #[test]
    fn missing_frames_render_a_note_instead_of_a_stack_top() {
        let mut facts = sample_facts();
        facts.top_frame = None;
        facts.frame_count = 0;
        let md = render_rules_markdown(&facts);
        assert!(md.contains("no `Call Trace:` section or stack frames detected"));
        assert!(!md.contains("Stack top"));
    }

    #[test]
    fn tid_defaults_to_a_question_mark() {
        let mut facts = sample_facts();
        facts.tid = None;
        let md = render_rules_markdown(&facts);
        assert!(md.contains("`syz-executor147/?`"));
    }

    #[test]
    fn io_uring_facts_carry_subsystem_and_function_hints() {
        let md = render_rules_markdown(&sample_facts());
        assert!(md.contains("task_work or completion callbacks"));
        assert!(md.contains("Add breakpoints or prints around `io_rsrc_node_ref_zero`"));
    }

    #[test]
    fn unknown_function_suppresses_the_instrument_hint() {
        let mut facts = sample_facts();
        facts.function = None;
        facts.subsystem = "unknown".to_string();
        let md = render_rules_markdown(&facts);
        assert!(md.contains("**trigger function**: `unknown`"));
        assert!(!md.contains("Add breakpoints"));
        assert!(!md.contains("Debug suggestions"));
    }

    #[test]
    fn unknown_class_still_renders_a_generic_risk_bullet() {
        let mut facts = sample_facts();
        facts.bug_class = "unknown".to_string();
        let md = render_rules_markdown(&facts);
        assert!(md.contains("Generic memory or synchronization anomaly"));
    }

    #[test]
    fn record_markdown_carries_a_per_record_heading() {
        let doc = render_record_markdown("r1", "- body bullet");
        assert!(doc.starts_with("# Diagnosis for r1\n\n- body bullet"));
        assert!(doc.ends_with('\n'));
    }
}
