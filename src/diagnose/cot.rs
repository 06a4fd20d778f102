//! Oracle-backed diagnosis: a chain-of-thought narrative per report.
//!
//! The oracle is asked to reason step by step but to return only the
//! final Markdown between `<final>` tags. An oracle error or an answer
//! without a usable final block surfaces as a [`DiagnoseError`]; there
//! is no silent fallback to the rules table.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::DiagnoseError;
use crate::oracle::Oracle;

/// System prompt for the analyst role. The answer format is pinned so
/// the final block can be lifted out mechanically.
pub const ANALYST_RULES: &str = r#"You are a senior Linux kernel crash analyst.
You will read a syzkaller/syzbot-style crash report and produce a diagnosis using Chain-of-Thought reasoning.

Instructions:
1. Show your step-by-step analysis process explicitly
2. Walk through each section of the crash report systematically
3. Explain your reasoning for each conclusion
4. Then provide a final structured summary

Analysis Steps to Follow:
Step 1: Identify the crash type from error messages/stack traces
Step 2: Locate the faulting instruction and memory access details
Step 3: Trace the call stack to find the trigger function
Step 4: Determine the affected kernel subsystem
Step 5: Assess the security/stability impact
Step 6: Suggest debugging approaches

Format:
## Step-by-Step Analysis
[Show your reasoning for each step]

## Final Diagnosis
- Bug type: [conclusion with reasoning]
- Suspected subsystem: [conclusion with reasoning]
- Trigger function(s): [conclusion with reasoning]
- Memory access: [details if present]
- Stack highlight: [top 1-3 frames]
- Risk assessment: [1-3 bullets]
- Debug suggestions: [1-5 bullets]
"#;

static FINAL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<final>(.*?)</final>").expect("valid regex"));

/// How much of a malformed answer is kept in the error for logs.
const MALFORMED_HEAD_CHARS: usize = 240;

/// Wrap one rendered report for the analyst. The closing reminder keeps
/// the model from returning its reasoning steps as the answer.
pub fn build_narrative_prompt(report: &str) -> String {
    let divider = "-".repeat(40);
    format!(
        "Report:\n{divider}\n{report}\n{divider}\n\
         Remember: produce ONLY the final Markdown between <final> and </final>."
    )
}

/// Lift the payload between `<final>` and `</final>` out of an answer.
/// Tag casing is ignored and surrounding whitespace is trimmed; `None`
/// when the block is missing or empty.
pub fn extract_final_block(answer: &str) -> Option<String> {
    let caps = FINAL_BLOCK.captures(answer)?;
    let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// Ask the oracle for a narrative diagnosis of one rendered report.
pub fn diagnose_cot(report: &str, oracle: &dyn Oracle) -> Result<String, DiagnoseError> {
    let user = build_narrative_prompt(report);
    debug!(report_chars = report.len(), "requesting narrative diagnosis");
    let answer = oracle.extract(ANALYST_RULES, &user)?;
    match extract_final_block(&answer) {
        Some(body) => Ok(body),
        None => {
            warn!(
                answer_chars = answer.len(),
                "diagnosis answer carried no usable final block"
            );
            Err(DiagnoseError::MalformedNarrative(head(&answer)))
        }
    }
}

fn head(text: &str) -> String {
    text.chars().take(MALFORMED_HEAD_CHARS).collect()
}
