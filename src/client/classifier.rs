//! Classification of transport and API failures
//!
//! Every response that is not a 2xx, and every transport error, passes through
//! [`ErrorClassifier`] before it reaches the engine. The result carries a retry
//! decision and a message fit for a terminal: structured error bodies are reduced
//! to their detail text, and oversized raw bodies (typically an HTML page from a
//! gateway or auth proxy) are cut down with an explicit note.

use serde_json::Value;
use tracing::debug;

use crate::config::ErrorConfig;
use crate::error::{Error, ErrorKind};

/// Raw bodies longer than this many characters are truncated
pub const MAX_ERROR_BODY_CHARS: usize = 10_000;

const RETRYABLE_CLIENT_STATUSES: [u16; 2] = [408, 429];

/// Uniform, retry-decidable view of a failure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ErrorClassifier {
    max_body_chars: usize,
    extra_retryable: Vec<u16>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            max_body_chars: MAX_ERROR_BODY_CHARS,
            extra_retryable: Vec::new(),
        }
    }
}

impl ErrorClassifier {
    pub fn new(config: &ErrorConfig) -> Self {
        Self {
            max_body_chars: config.max_body_chars,
            extra_retryable: config.retryable_statuses.clone(),
        }
    }

    /// Retry decision for an HTTP status
    pub fn kind_for_status(&self, status: u16) -> ErrorKind {
        if status == 404 {
            ErrorKind::NotFound
        } else if status >= 500
            || RETRYABLE_CLIENT_STATUSES.contains(&status)
            || self.extra_retryable.contains(&status)
        {
            ErrorKind::Retryable
        } else {
            ErrorKind::Fatal
        }
    }

    /// Classify a non-success HTTP response
    pub fn classify_status(&self, status: u16, body: &str) -> Classification {
        let kind = self.kind_for_status(status);
        let message = self.extract_message(body);
        debug!(status, ?kind, "classified API failure");
        Classification { kind, message }
    }

    /// Classify a failure that never produced a response (or a broken one)
    pub fn classify_transport(&self, err: &reqwest::Error) -> Classification {
        let kind = if err.is_timeout() || err.is_connect() {
            ErrorKind::Retryable
        } else if let Some(status) = err.status() {
            self.kind_for_status(status.as_u16())
        } else if err.is_request() || err.is_body() {
            // Connection dropped mid-request
            ErrorKind::Retryable
        } else {
            ErrorKind::Fatal
        };
        Classification {
            kind,
            message: err.to_string(),
        }
    }

    /// Pull a readable message out of an error body
    pub fn extract_message(&self, body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return "empty response body".to_string();
        }

        if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
            if let Some(message) = structured_message(&json) {
                return self.truncate(&message);
            }
        }

        self.truncate(body)
    }

    /// Cut `body` to the configured bound, noting what was dropped.
    /// Bodies within the bound are returned unchanged.
    pub fn truncate(&self, body: &str) -> String {
        truncate_body(body, self.max_body_chars)
    }

    pub fn api_error(&self, status: u16, body: &str) -> Error {
        let Classification { kind, message } = self.classify_status(status, body);
        Error::ApiError {
            kind,
            status,
            message,
        }
    }

    pub fn transport_error(&self, err: &reqwest::Error) -> Error {
        let Classification { kind, message } = self.classify_transport(err);
        Error::TransportError { kind, message }
    }
}

/// Known error body shapes, most specific first
fn structured_message(json: &Value) -> Option<String> {
    let candidates = [
        json.pointer("/error/detail"),
        json.pointer("/error/message"),
        json.get("error").filter(|v| v.is_string()),
        json.get("message"),
        json.get("detail"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(64).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Truncate to `max_chars` characters with a trailing marker
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let total = body.chars().count();
    if total <= max_chars {
        return body.to_string();
    }

    let kept: String = body.chars().take(max_chars).collect();
    let hint = if looks_like_html(body) {
        " (HTML response, likely an authentication or gateway failure)"
    } else {
        ""
    };
    format!(
        "{kept}\n... [truncated: response body was {total} characters, showing the first {max_chars}]{hint}"
    )
}
