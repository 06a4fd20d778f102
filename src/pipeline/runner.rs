//! Per-record orchestration and the batch worker pool.
//!
//! A record is processed end to end with no shared mutable state, so the
//! batch layer is plain fan-out/fan-in over borrowed inputs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::oracle::{prompt, Oracle};
use crate::pipeline::augmenter;
use crate::pipeline::chunker;
use crate::pipeline::explain::{ExplainRecorder, ExplainTrace, Stage};
use crate::pipeline::fallback;
use crate::pipeline::orderer;
use crate::pipeline::policy;
use crate::pipeline::sanitizer::{sanitize_lines, VerbatimIndex};
use crate::pipeline::types::{
    Candidate, DropReason, ExtractOptions, LogRecord, PolicyConfig, ProcessMode,
};

/// Everything one record produces: the final candidate, its provenance
/// trace, and the fallback reason when the rule extractor fired.
#[derive(Debug)]
pub struct RecordOutcome {
    pub candidate: Candidate,
    pub trace: ExplainTrace,
    pub fallback_reason: Option<String>,
}

/// Aggregate counters for one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub fallback_hits: usize,
    pub elapsed_ms: u64,
}

/// Run one record through chunking, oracle extraction, sanitization,
/// fallback, augmentation, ordering, and policy. Never fails: oracle
/// trouble routes to the rule extractor and an empty log yields an empty
/// candidate.
pub fn process_record(
    record: &LogRecord,
    opts: &ExtractOptions,
    policy: &PolicyConfig,
    oracle: Option<&dyn Oracle>,
) -> RecordOutcome {
    let mut rec = ExplainRecorder::new(&record.id);
    let lines = record.lines();
    let plan = chunker::plan_chunks(&lines, opts.span, opts.max_lines_per_chunk, opts.chunk_stride);
    rec.note_pipeline(opts.span, opts.mode, plan.chunks.len(), plan.anchor_hits);
    debug!(
        record = %record.id,
        chunks = plan.chunks.len(),
        anchor_hits = plan.anchor_hits,
        "planned chunks"
    );

    let chunk_texts: Vec<(String, String)> = plan
        .chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            (
                prompt::chunk_id(&record.id, i),
                chunker::chunk_text(&lines, chunk),
            )
        })
        .collect();
    for ((cid, _), chunk) in chunk_texts.iter().zip(&plan.chunks) {
        rec.note_chunk(cid, chunk.kind.as_str(), chunk.start, chunk.end);
    }

    let index = VerbatimIndex::new(&record.raw_text);
    let rules_only = matches!(opts.mode, ProcessMode::Rules) || oracle.is_none();

    // Kept lines from all chunks, in chunk order, with immediately
    // repeated lines collapsed across chunk boundaries.
    let mut merged: Vec<String> = Vec::new();
    let mut last_line: Option<String> = None;
    let mut total_groups = 0usize;
    let mut failed_groups = 0usize;
    let mut last_failure = "";

    if let (ProcessMode::Oracle, Some(oracle)) = (opts.mode, oracle) {
        let deadline = Instant::now() + opts.record_deadline;
        for group in chunk_texts.chunks(opts.group_size.max(1)) {
            total_groups += 1;
            if Instant::now() >= deadline {
                warn!(record = %record.id, "record deadline exhausted before oracle call");
                for (cid, _) in group {
                    rec.note_oracle_failure(cid, "timeout");
                }
                failed_groups += 1;
                last_failure = "timeout";
                continue;
            }

            let user_prompt = prompt::build_chunk_prompt(group, opts.token_budget);
            match oracle.extract(prompt::EXTRACT_RULES, &user_prompt) {
                Ok(output) => {
                    let ids: Vec<String> = group.iter().map(|(cid, _)| cid.clone()).collect();
                    let answers = prompt::align_answer(&output, &ids);
                    for cid in &ids {
                        let answer = answers.get(cid).map(String::as_str).unwrap_or("");
                        let outcome = sanitize_lines(answer, &index);
                        rec.note_oracle_result(cid, answer.lines().count(), outcome.kept.len());
                        for line in &outcome.dropped {
                            rec.note_drop(Stage::Sanitize, DropReason::NonVerbatim, line);
                        }
                        for line in outcome.kept {
                            if last_line.as_deref() != Some(line.as_str()) {
                                merged.push(line.clone());
                            }
                            last_line = Some(line);
                        }
                    }
                }
                Err(err) => {
                    warn!(record = %record.id, error = %err, "oracle call failed");
                    for (cid, _) in group {
                        rec.note_oracle_failure(cid, err.reason());
                    }
                    failed_groups += 1;
                    last_failure = err.reason();
                }
            }
        }
    }

    let mut sections = orderer::bucketize(&merged, &mut rec);

    let fallback_reason = if rules_only {
        Some("rules_only_mode".to_string())
    } else if total_groups > 0 && failed_groups == total_groups {
        Some(format!("oracle_failed:{last_failure}"))
    } else if total_groups > 0 && !sections.keys().any(|n| n.is_core()) {
        Some("no_core_sections".to_string())
    } else {
        None
    };

    let fallback_used = fallback_reason.is_some();
    if let Some(reason) = &fallback_reason {
        rec.note_fallback(reason);
        match fallback::rule_extract(&record.raw_text) {
            Some(text) => {
                let outcome = sanitize_lines(&text, &index);
                for line in &outcome.dropped {
                    rec.note_drop(Stage::Fallback, DropReason::NonVerbatim, line);
                }
                if !outcome.kept.is_empty() {
                    sections = orderer::bucketize(&outcome.kept, &mut rec);
                }
            }
            None => {
                debug!(record = %record.id, "rule extraction found nothing; keeping oracle sections");
            }
        }
    }

    augmenter::augment_missing(&mut sections, &lines, policy.include_diag, &mut rec);
    orderer::canonicalize(&mut sections, &mut rec);
    policy::enforce(&mut sections, policy, &mut rec);
    rec.note_final(&sections, fallback_used);

    RecordOutcome {
        candidate: Candidate {
            id: record.id.clone(),
            sections,
            fallback_used,
        },
        trace: rec.into_trace(),
        fallback_reason,
    }
}

/// Fan `records` out over a bounded worker pool and collect outcomes back
/// in input order. Workers share only borrowed, immutable state.
pub fn run_batch(
    records: &[LogRecord],
    opts: &ExtractOptions,
    policy: &PolicyConfig,
    oracle: Option<&dyn Oracle>,
) -> (Vec<RecordOutcome>, RunSummary) {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let t0 = Instant::now();

    let workers = opts.worker_threads.max(1).min(records.len().max(1));
    info!(%run_id, total = records.len(), workers, "starting extraction run");

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, RecordOutcome)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || loop {
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= records.len() {
                    break;
                }
                let outcome = process_record(&records[i], opts, policy, oracle);
                if tx.send((i, outcome)).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<RecordOutcome>> = records.iter().map(|_| None).collect();
    for (i, outcome) in rx {
        slots[i] = Some(outcome);
    }
    let outcomes: Vec<RecordOutcome> = slots.into_iter().flatten().collect();

    let fallback_hits = outcomes
        .iter()
        .filter(|o| o.candidate.fallback_used)
        .count();
    let failed = outcomes
        .iter()
        .filter(|o| o.candidate.sections.is_empty())
        .count();
    let summary = RunSummary {
        run_id,
        started_at,
        total: records.len(),
        succeeded: outcomes.len() - failed,
        failed,
        fallback_hits,
        elapsed_ms: t0.elapsed().as_millis() as u64,
    };
    info!(
        %run_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        fallback_hits = summary.fallback_hits,
        elapsed_ms = summary.elapsed_ms,
        "extraction run finished"
    );
    (outcomes, summary)
}
