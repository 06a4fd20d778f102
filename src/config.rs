use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::ExtractOptions;

/// Application-level constants
pub const APP_NAME: &str = "syzslice";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config file probed in the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "syzslice.json";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info")
}

const DEFAULT_CONNECT_TIMEOUT_S: u64 = 10;
const DEFAULT_READ_TIMEOUT_S: u64 = 55;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("oracle mode needs `{0}`; set it in the config file, the environment, or on the command line")]
    MissingOracleField(&'static str),
}

/// The file layer of the configuration. Every field is optional; the
/// environment and CLI flags override whatever the file sets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub connect_timeout_s: Option<u64>,
    pub read_timeout_s: Option<u64>,
    pub record_deadline_s: Option<u64>,
    pub worker_threads: Option<usize>,
    pub max_lines_per_chunk: Option<usize>,
    pub chunk_stride: Option<usize>,
    pub group_size: Option<usize>,
    pub token_budget: Option<usize>,
}

/// Resolved oracle endpoint, ready to build a client from.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

/// Load the file layer. An explicitly given path must exist; the
/// default path is probed and silently skipped when absent.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if !required && !path.exists() {
        return Ok(FileConfig::default());
    }
    let text = fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Invalid { path, source })
}

impl FileConfig {
    /// Overlay the file's chunking and concurrency knobs onto run
    /// options. Unset fields leave the defaults alone.
    pub fn apply_to(&self, opts: &mut ExtractOptions) {
        if let Some(v) = self.max_lines_per_chunk {
            opts.max_lines_per_chunk = v;
        }
        if let Some(v) = self.chunk_stride {
            opts.chunk_stride = v;
        }
        if let Some(v) = self.group_size {
            opts.group_size = v;
        }
        if let Some(v) = self.token_budget {
            opts.token_budget = v;
        }
        if let Some(v) = self.record_deadline_s {
            opts.record_deadline = Duration::from_secs(v);
        }
        if let Some(v) = self.worker_threads {
            opts.worker_threads = v;
        }
    }

    /// Resolve the oracle endpoint, failing fast when a required field
    /// is missing anywhere. The `api_url`/`api_key`/`model` arguments
    /// are the CLI/env layer and take precedence over the file.
    pub fn oracle_config(
        &self,
        api_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<OracleConfig, ConfigError> {
        let api_url = api_url
            .or_else(|| self.api_url.clone())
            .ok_or(ConfigError::MissingOracleField("api_url"))?;
        let api_key = api_key
            .or_else(|| self.api_key.clone())
            .ok_or(ConfigError::MissingOracleField("api_key"))?;
        let model = model
            .or_else(|| self.model.clone())
            .ok_or(ConfigError::MissingOracleField("model"))?;
        Ok(OracleConfig {
            api_url,
            api_key,
            model,
            connect_timeout: Duration::from_secs(
                self.connect_timeout_s.unwrap_or(DEFAULT_CONNECT_TIMEOUT_S),
            ),
            request_timeout: Duration::from_secs(
                self.read_timeout_s.unwrap_or(DEFAULT_READ_TIMEOUT_S),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn log_filter_names_the_crate() {
        assert_eq!(default_log_filter(), "syzslice=info");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(
            load_file_config(Some(&path)),
            Err(ConfigError::Unreadable { .. })
        ));
    }

    #[test]
    fn partial_file_parses_and_overlays_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syzslice.json");
        fs::write(
            &path,
            r#"{"api_url": "http://oracle.local/v1/chat", "max_lines_per_chunk": 40, "worker_threads": 4}"#,
        )
        .unwrap();

        let cfg = load_file_config(Some(&path)).unwrap();
        assert_eq!(cfg.api_url.as_deref(), Some("http://oracle.local/v1/chat"));

        let mut opts = ExtractOptions::default();
        cfg.apply_to(&mut opts);
        assert_eq!(opts.max_lines_per_chunk, 40);
        assert_eq!(opts.chunk_stride, 50);
        assert_eq!(opts.worker_threads, 4);
    }

    #[test]
    fn garbled_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syzslice.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_file_config(Some(&path)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn oracle_config_prefers_the_override_layer() {
        let cfg = FileConfig {
            api_url: Some("http://file.local".to_string()),
            api_key: Some("file-key".to_string()),
            model: Some("file-model".to_string()),
            connect_timeout_s: Some(3),
            ..FileConfig::default()
        };
        let oracle = cfg
            .oracle_config(Some("http://cli.local".to_string()), None, None)
            .unwrap();
        assert_eq!(oracle.api_url, "http://cli.local");
        assert_eq!(oracle.api_key, "file-key");
        assert_eq!(oracle.model, "file-model");
        assert_eq!(oracle.connect_timeout, Duration::from_secs(3));
        assert_eq!(oracle.request_timeout, Duration::from_secs(55));
    }

    #[test]
    fn oracle_config_names_the_missing_field() {
        let cfg = FileConfig {
            api_url: Some("http://file.local".to_string()),
            ..FileConfig::default()
        };
        match cfg.oracle_config(None, None, None) {
            Err(ConfigError::MissingOracleField(field)) => assert_eq!(field, "api_key"),
            other => panic!("expected a missing-field error, got {other:?}"),
        }
    }
}
