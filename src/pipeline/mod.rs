pub mod augmenter;
pub mod chunker;
pub mod error;
pub mod explain;
pub mod fallback;
pub mod orderer;
pub mod policy;
pub mod runner;
pub mod sanitizer;
pub mod types;

pub use error::PipelineError;
pub use explain::{ExplainTrace, Stage, TraceEvent};
pub use runner::{process_record, run_batch, RecordOutcome, RunSummary};
pub use types::{
    Candidate, Chunk, ExtractOptions, LogRecord, PolicyConfig, ProcessMode, SectionMap, SpanMode,
};
