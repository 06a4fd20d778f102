use std::collections::BTreeMap;

use regex::Regex;

/// System prompt for the extraction oracle. The sanitizer re-checks every
/// returned line against the raw log, so these rules are the first filter,
/// not the last.
pub const EXTRACT_RULES: &str = r#"You are extracting a syzbot-style crash report from a Linux kernel log.
STRICT RULES:
- Output ONLY raw lines that appear VERBATIM in the input logs (you may drop leading timestamps like "[ 12.345]").
- Output MUST follow this order IF present in the logs (skip any missing parts WITHOUT commentary):
  1) BUG/KASAN line(s)
  2) "Read/Write of size ..." line
  3) "CPU:" (and optional "Hardware name:")
  4) "Call Trace:" and subsequent stack frames (skip tool frames like dump_stack/kasan_report/__asan_/printk)
  5) KASAN details in this exact order:
     5.1) "Allocated by task" block
     5.2) "Freed by task" block
     5.3) "The buggy address belongs to" block
     5.4) "Memory state around" block
- If you see diagnostic blocks like "page_owner", "page:", "slab/object/kmalloc/kmem_cache", "Disassembly/Code:", "ftrace/tracing", or register dumps (RIP/RSP/RAX...), copy them verbatim as well.
- Do NOT invent or rewrite text. If a section is missing, omit it (no JSON, no explanations, no headings, no extra punctuation).
- IMPORTANT: Do not output any line that contains a question mark ('?' or '？'); if such a line appears in the logs, skip that line."#;

/// Rough character allowance per prompt; budgets are token counts and four
/// chars per token is close enough for kernel log text.
const CHARS_PER_TOKEN: usize = 4;

/// Budgets below this are rounded up so a prompt always carries some text.
const MIN_TOKEN_BUDGET: usize = 200;

/// Chunk ids are `{record_id}#c{n}` with `n` 1-based.
pub fn chunk_id(record_id: &str, index: usize) -> String {
    format!("{}#c{}", record_id, index + 1)
}

/// Assemble the user prompt for one chunk group: per chunk, an input
/// envelope with the chunk text, the copy instructions, and the answer
/// envelope the model must reply inside. Chunk text is clipped against a
/// shared char budget, first come first served.
pub fn build_chunk_prompt(chunks: &[(String, String)], token_budget: usize) -> String {
    let mut remain = token_budget.max(MIN_TOKEN_BUDGET) * CHARS_PER_TOKEN;
    let mut blocks = Vec::with_capacity(chunks.len());
    for (cid, text) in chunks {
        let clipped = clip(text, remain);
        remain = remain.saturating_sub(clipped.len());
        blocks.push(chunk_block(cid, clipped));
    }
    blocks.join("\n")
}

fn chunk_block(cid: &str, text: &str) -> String {
    format!(
        r#"### INPUT CHUNK {cid} START
{text}
### INPUT CHUNK {cid} END
From this chunk, copy every crash-report section that appears within it, line by line and verbatim (a leading "[ 12.345]"-style timestamp may be dropped).
Pay close attention:
- Stack frame lines must be kept whole, including offsets, source paths, line numbers, and [inline] markers (e.g. do_check_common+0x13f/0x20b0 kernel/bpf/verifier.c:22798 [inline]). Never truncate or omit any part.
- Never keep only the function name; copy the entire line.
- Apart from timestamps, no character may be removed or rewritten.

Sections to extract:
1) Lines starting with "BUG: KASAN:" (skip if this chunk has none)
2) "Read of size N..." or "Write of size N..." (skip if absent)
3) "CPU:" (and the optional "Hardware name:") (skip if absent)
4) "Call Trace:" and the stack frames that follow:
   - Keep every frame line, copied verbatim.
   - Skip tool frames such as dump_stack/kasan_report/__asan_/printk.
   - Copy every other frame line in full, including paths, line numbers, and [inline].
5) Copy any of the following KASAN detail or diagnostic blocks in full:
   5.1) "Allocated by task"; 5.2) "Freed by task"; 5.3) "The buggy address belongs to"; 5.4) "Memory state around" (with its hex byte rows)
   5.5) "page_owner" / page dumps starting with "page:"; slab/object/kmalloc/kmem_cache blocks; "Disassembly/Code:"; "ftrace/tracing"; register dumps (RIP/RSP/RAX...)

Output only raw log lines; no commentary, JSON, labels, or extra punctuation.
Important: skip any line containing a question mark ('?' or '？').
### CHUNK {cid} START
...copied raw lines...
### CHUNK {cid} END
"#
    )
}

/// Pull each chunk's answer out of its `### CHUNK {cid} START/END`
/// envelope. A chunk the model did not answer maps to an empty string.
pub fn align_answer(output: &str, chunk_ids: &[String]) -> BTreeMap<String, String> {
    let mut answers = BTreeMap::new();
    for cid in chunk_ids {
        let escaped = regex::escape(cid);
        let pattern = Regex::new(&format!(
            r"(?is)###\s*CHUNK\s*{escaped}\s*START\s*\n(.*?)\n###\s*CHUNK\s*{escaped}\s*END"
        ))
        .expect("valid regex");
        let answer = pattern
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_matches('\n').to_string())
            .unwrap_or_default();
        answers.insert(cid.clone(), answer);
    }
    answers
}

/// Clip `text` to at most `max` bytes, backing off to a char boundary.
fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
