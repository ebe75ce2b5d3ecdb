//! Engine configuration
//!
//! Everything that tunes the engine is passed in explicitly at construction
//! time. The binary builds an [`EngineConfig`] once from a TOML file plus CLI
//! and environment overrides; nothing in the library reads the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::classifier::MAX_ERROR_BODY_CHARS;
use crate::controller::poller::RetryPolicy;
use crate::error::Result;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_POLL_DEADLINE_SECS: u64 = 3600;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub features: FeatureFlags,
    pub errors: ErrorConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the control-plane API, e.g. `https://cloud.example.com`
    pub base_url: String,
    /// Bearer token; how it was obtained is not this crate's concern
    pub api_key: String,
    pub account_id: String,
    pub project_id: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            account_id: String::new(),
            project_id: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub deadline_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            deadline_secs: DEFAULT_POLL_DEADLINE_SECS,
        }
    }
}

impl PollingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.deadline_secs),
        )
    }
}

/// Optional code paths. Every flag defaults to off.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureFlags {
    /// Allow `connection_pooling` on clusters
    pub connection_pooling: bool,
    /// Allow `AuditLog` resources
    pub db_audit_logging: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ErrorConfig {
    /// Raw error bodies longer than this are truncated
    pub max_body_chars: usize,
    /// Extra HTTP statuses (besides 408, 429 and 5xx) to treat as retryable
    pub retryable_statuses: Vec<u16>,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            max_body_chars: MAX_ERROR_BODY_CHARS,
            retryable_statuses: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
