use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::Oracle;
use super::OracleError;

/// Default connect timeout for a single oracle call.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read timeout. Kept below the per-record deadline so one stalled
/// call cannot eat the whole record budget.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(55);

/// How much of an error body is carried in `OracleError::Status`.
const BODY_HEAD_MAX: usize = 8000;

/// Chat-completions HTTP client for the extraction oracle.
///
/// One request per call, no internal retries; retry and degrade decisions
/// belong to the pipeline runner.
pub struct ChatOracle {
    api_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl ChatOracle {
    /// Create a client with the default connect/read timeouts.
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Self {
        Self::with_timeouts(
            api_url,
            api_key,
            model,
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_READ_TIMEOUT,
        )
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(
        api_url: &str,
        api_key: &str,
        model: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }
}

/// Request body for an OpenAI-style chat-completions endpoint.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    top_p: u32,
    n: u32,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body. Providers disagree on where the answer text lives, so
/// every known location is optional and probed in order.
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    /// `choices[0].message.content`, else `choices[0].text`, else the
    /// top-level `text`/`output` fields.
    fn into_content(self) -> Option<String> {
        if let Some(choice) = self.choices.into_iter().next() {
            if let Some(content) = choice.message.and_then(|m| m.content) {
                return Some(content);
            }
            if let Some(text) = choice.text {
                return Some(text);
            }
        }
        self.text.or(self.output)
    }
}

impl Oracle for ChatOracle {
    fn extract(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            top_p: 1,
            n: 1,
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout
                } else if e.is_connect() {
                    OracleError::Transport(format!("connection to {} failed: {e}", self.api_url))
                } else {
                    OracleError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::Status {
                code: status.as_u16(),
                body_head: truncate_head(&body, BODY_HEAD_MAX),
            });
        }

        let raw = response.text().map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout
            } else {
                OracleError::Transport(e.to_string())
            }
        })?;
        let parsed: ChatResponse = serde_json::from_str(&raw)
            .map_err(|_| OracleError::Malformed(truncate_head(&raw, BODY_HEAD_MAX)))?;

        match parsed.into_content() {
            Some(content) => {
                let content = content.trim();
                if content.is_empty() {
                    Err(OracleError::Empty)
                } else {
                    Ok(content.to_string())
                }
            }
            None => Err(OracleError::Malformed(truncate_head(&raw, BODY_HEAD_MAX))),
        }
    }
}

/// Clip `text` to at most `max` bytes, backing off to a char boundary.
fn truncate_head(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Scripted oracle for tests. Pops queued responses in order, then repeats
/// the final one; counts every call.
pub struct MockOracle {
    script: Mutex<VecDeque<Result<String, OracleError>>>,
    repeat: Result<String, OracleError>,
    calls: AtomicUsize,
}

impl MockOracle {
    /// Always answer `text`.
    pub fn echo(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `err`.
    pub fn fail(err: OracleError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer from `responses` in order, repeating the last one once the
    /// script runs out.
    pub fn script(responses: Vec<Result<String, OracleError>>) -> Self {
        let repeat = responses
            .last()
            .cloned()
            .unwrap_or(Err(OracleError::Empty));
        Self {
            script: Mutex::new(responses.into()),
            repeat,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `extract` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Oracle for MockOracle {
    fn extract(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("mock script lock");
        match script.pop_front() {
            Some(next) => next,
            None => self.repeat.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Option<String> {
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        parsed.into_content()
    }

    #[test]
    fn content_from_chat_choices() {
        let got = parse(r#"{"choices":[{"message":{"content":"BUG: KASAN: use-after-free"}}]}"#);
        assert_eq!(got.as_deref(), Some("BUG: KASAN: use-after-free"));
    }

    #[test]
    fn content_from_completion_style_text() {
        let got = parse(r#"{"choices":[{"text":"Call Trace:"}]}"#);
        assert_eq!(got.as_deref(), Some("Call Trace:"));
    }

    #[test]
    fn content_from_top_level_fields() {
        assert_eq!(parse(r#"{"text":"a"}"#).as_deref(), Some("a"));
        assert_eq!(parse(r#"{"output":"b"}"#).as_deref(), Some("b"));
    }

    #[test]
    fn unrecognized_shape_yields_none() {
        assert_eq!(parse(r#"{"result":"nope"}"#), None);
        assert_eq!(parse(r#"{"choices":[]}"#), None);
    }

    #[test]
    fn request_serializes_expected_fields() {
        let body = ChatRequest {
            model: "m",
            temperature: 0.0,
            top_p: 1,
            n: 1,
            stream: false,
            messages: vec![ChatMessage {
                role: "system",
                content: "rules",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["stream"], false);
        assert_eq!(json["n"], 1);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "rules");
    }

    #[test]
    fn chat_oracle_constructor_stores_endpoint() {
        let oracle = ChatOracle::new("https://api.example.com/v1/chat/completions", "k", "gpt-4o");
        assert_eq!(oracle.api_url, "https://api.example.com/v1/chat/completions");
        assert_eq!(oracle.model, "gpt-4o");
    }

    #[test]
    fn mock_pops_script_then_repeats_last() {
        let oracle = MockOracle::script(vec![
            Ok("first".into()),
            Err(OracleError::RateLimited),
        ]);
        assert_eq!(oracle.extract("s", "u").unwrap(), "first");
        assert!(matches!(
            oracle.extract("s", "u"),
            Err(OracleError::RateLimited)
        ));
        assert!(matches!(
            oracle.extract("s", "u"),
            Err(OracleError::RateLimited)
        ));
    }

    #[test]
    fn mock_counts_calls() {
        let oracle = MockOracle::echo("answer");
        assert_eq!(oracle.calls(), 0);
        let _ = oracle.extract("s", "u");
        let _ = oracle.extract("s", "u");
        assert_eq!(oracle.calls(), 2);
    }

    #[test]
    fn error_reason_tags_are_stable() {
        assert_eq!(OracleError::Timeout.reason(), "timeout");
        assert_eq!(OracleError::RateLimited.reason(), "rate_limited");
        assert_eq!(OracleError::Transport("x".into()).reason(), "transport");
        assert_eq!(
            OracleError::Status {
                code: 500,
                body_head: String::new()
            }
            .reason(),
            "status"
        );
        assert_eq!(OracleError::Malformed("x".into()).reason(), "malformed");
        assert_eq!(OracleError::Empty.reason(), "empty");
    }

    #[test]
    fn truncate_head_respects_char_boundaries() {
        assert_eq!(truncate_head("abcdef", 4), "abcd");
        assert_eq!(truncate_head("abc", 8), "abc");
        // '？' is three bytes; clipping inside it must back off.
        assert_eq!(truncate_head("a？b", 2), "a");
    }
}
