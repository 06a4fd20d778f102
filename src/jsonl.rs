//! JSONL artifact I/O.
//!
//! One JSON object per line, UTF-8. Readers collect per-line problems
//! instead of aborting: a malformed record costs that record, never the
//! batch.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::pipeline::{Candidate, LogRecord, PipelineError};

/// Read input records. Blank lines are skipped. A line that fails to
/// parse is reported with its 1-based line number; a line that repeats
/// an earlier id is rejected (the first occurrence wins). Either way
/// the batch continues.
pub fn read_log_records(
    path: &Path,
) -> Result<(Vec<LogRecord>, Vec<PipelineError>), PipelineError> {
    let reader = BufReader::new(File::open(path)?);

    let mut records = Vec::new();
    let mut problems = Vec::new();
    let mut seen = HashSet::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let number = index + 1;
        match serde_json::from_str::<LogRecord>(&line) {
            Ok(record) => {
                if seen.contains(&record.id) {
                    warn!(line = number, id = %record.id, "duplicate record id; keeping the first");
                    problems.push(PipelineError::DuplicateId(record.id));
                    continue;
                }
                seen.insert(record.id.clone());
                records.push(record);
            }
            Err(err) => {
                warn!(line = number, error = %err, "skipping malformed record");
                problems.push(PipelineError::MalformedRecord {
                    line: number,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok((records, problems))
}

/// Read previously written candidates back for diagnosis. Same lenient
/// contract as [`read_log_records`], minus the duplicate check.
pub fn read_candidates(path: &Path) -> Result<(Vec<Candidate>, Vec<PipelineError>), PipelineError> {
    let reader = BufReader::new(File::open(path)?);

    let mut candidates = Vec::new();
    let mut problems = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Candidate>(&line) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping malformed candidate");
                problems.push(PipelineError::MalformedRecord {
                    line: index + 1,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok((candidates, problems))
}

/// Serialize `items` one object per line, creating parent directories
/// as needed.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
