//! Crash diagnosis over extracted candidates.
//!
//! Two modes share one record shape: `rules` runs a deterministic
//! decision table locally, `cot` asks the oracle for a step-by-step
//! narrative and keeps only its final block. Both read the candidate's
//! rendered report text, one record at a time.

pub mod cot;
pub mod render;
pub mod rules;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cot::diagnose_cot;
pub use rules::{parse_crash_facts, CrashFacts};

use crate::oracle::OracleError;

/// Errors from the oracle-backed diagnosis path. The rules path never
/// fails; a report the table cannot read still classifies as unknown.
#[derive(Debug, Clone, Error)]
pub enum DiagnoseError {
    #[error("oracle diagnosis failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("diagnosis answer carried no usable final block (head: {0})")]
    MalformedNarrative(String),
}

/// Which engine produced a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisMode {
    Rules,
    Cot,
}

impl DiagnosisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisMode::Rules => "rules",
            DiagnosisMode::Cot => "cot",
        }
    }
}

/// Payload of one diagnosis: structured facts from the rules engine,
/// narrative Markdown from the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Diagnosis {
    Facts(CrashFacts),
    Narrative(String),
}

/// One line of `diagnose.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: String,
    pub mode: DiagnosisMode,
    pub diagnosis: Diagnosis,
}

impl DiagnosisRecord {
    pub fn rules(id: &str, facts: CrashFacts) -> Self {
        Self {
            id: id.to_string(),
            mode: DiagnosisMode::Rules,
            diagnosis: Diagnosis::Facts(facts),
        }
    }

    pub fn cot(id: &str, narrative: String) -> Self {
        Self {
            id: id.to_string(),
            mode: DiagnosisMode::Cot,
            diagnosis: Diagnosis::Narrative(narrative),
        }
    }
}
