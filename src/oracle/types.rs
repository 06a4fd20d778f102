use super::OracleError;

/// A text-extraction backend. `system` carries the extraction rules and
/// `user` the per-chunk prompt; the return value is the raw model output,
/// trimmed but otherwise unparsed.
///
/// Implementations are shared across worker threads behind an `Arc`.
pub trait Oracle: Send + Sync {
    fn extract(&self, system: &str, user: &str) -> Result<String, OracleError>;
}
