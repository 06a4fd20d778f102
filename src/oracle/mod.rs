pub mod chat;
pub mod prompt;
pub mod types;

pub use chat::*;
pub use types::*;

use thiserror::Error;

/// Failure modes of a single oracle call. The extraction pipeline treats
/// every variant the same way (the answer is unusable); the variants only
/// feed logging and the per-record fallback reason.
#[derive(Error, Debug, Clone)]
pub enum OracleError {
    #[error("oracle request timed out")]
    Timeout,

    #[error("oracle rate limited (HTTP 429)")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("oracle returned HTTP {code}: {body_head}")]
    Status { code: u16, body_head: String },

    #[error("malformed oracle response: {0}")]
    Malformed(String),

    #[error("oracle returned an empty answer")]
    Empty,
}

impl OracleError {
    /// Stable short tag used in traces and fallback-hit records.
    pub fn reason(&self) -> &'static str {
        match self {
            OracleError::Timeout => "timeout",
            OracleError::RateLimited => "rate_limited",
            OracleError::Transport(_) => "transport",
            OracleError::Status { .. } => "status",
            OracleError::Malformed(_) => "malformed",
            OracleError::Empty => "empty",
        }
    }
}
