//! Deterministic extraction and diagnosis of kernel-sanitizer crash
//! reports from raw console logs.
//!
//! A raw log is chunked into windows, an extraction oracle (or a local
//! rule table) proposes report lines, and every returned line is
//! verified verbatim against the raw input before it is ordered,
//! augmented and capped into a stable candidate. Diagnosis runs as a
//! separate pass over finished candidates.

pub mod config;
pub mod diagnose;
pub mod jsonl;
pub mod oracle;
pub mod pipeline;
pub mod registry;

use tracing_subscriber::EnvFilter;

/// Initialize tracing: `RUST_LOG` wins, otherwise the crate default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
