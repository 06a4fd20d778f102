use thiserror::Error;

/// Errors raised while loading or processing records.
///
/// Processing itself is designed to be infallible per record (a record
/// that cannot be extracted still yields a candidate, possibly empty);
/// these cover the boundaries around it: input parsing and artifact I/O.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("duplicate record id: {0}")]
    DuplicateId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
