//! Error types for dbplane

use std::time::Duration;

use thiserror::Error;

use crate::model::{OperationKind, SpecValidationError};

/// How a failure should be handled by whoever sees it next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient; the same call may succeed later
    Retryable,
    /// Permanent for this input
    Fatal,
    /// The target resource does not exist
    NotFound,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Desired state is invalid or contradictory; detected before any network call
    #[error("Invalid configuration: {}", join_issues(.0))]
    ConfigurationError(Vec<SpecValidationError>),

    /// Network or connection failure
    #[error("Transport failure: {message}")]
    TransportError { kind: ErrorKind, message: String },

    /// The service answered with an application-level failure
    #[error("API error (HTTP {status}): {message}")]
    ApiError {
        kind: ErrorKind,
        status: u16,
        message: String,
    },

    /// No terminal state was observed before the deadline or cancellation.
    /// The mutation may still complete on the service side.
    #[error(
        "{operation} of {resource} {resource_id} did not settle after {elapsed:?}{} (last status: {})",
        cancel_note(.cancelled),
        .last_status.as_deref().unwrap_or("unknown")
    )]
    OperationTimeout {
        resource: &'static str,
        resource_id: String,
        operation: OperationKind,
        elapsed: Duration,
        last_status: Option<String>,
        cancelled: bool,
    },

    /// The operation settled in a failure state
    #[error("{operation} of {resource} {resource_id} failed with status {status}")]
    OperationFailed {
        resource: &'static str,
        resource_id: String,
        operation: OperationKind,
        status: String,
    },

    /// The resource does not exist on the service
    #[error("{resource} {id} not found")]
    NotFoundError { resource: &'static str, id: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Config file error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn join_issues(issues: &[SpecValidationError]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn cancel_note(cancelled: &bool) -> &'static str {
    if *cancelled {
        " (cancelled)"
    } else {
        ""
    }
}

impl Error {
    /// Shorthand for a single-issue configuration error
    pub fn configuration(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Error::ConfigurationError(vec![SpecValidationError::new(field, message, how_to_fix)])
    }

    /// Short human-readable title shown above the message
    pub fn title(&self) -> &'static str {
        match self {
            Error::ConfigurationError(_) => "Invalid configuration",
            Error::TransportError { .. } => "Transport failure",
            Error::ApiError { .. } => "API request failed",
            Error::OperationTimeout {
                cancelled: true, ..
            } => "Operation cancelled",
            Error::OperationTimeout { .. } => "Operation timed out",
            Error::OperationFailed { .. } => "Operation failed",
            Error::NotFoundError { .. } => "Resource not found",
            Error::SerializationError(_) => "Unexpected response",
            Error::YamlError(_) => "Invalid manifest",
            Error::TomlError(_) => "Invalid engine configuration",
            Error::IoError(_) => "I/O failure",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TransportError { kind, .. } | Error::ApiError { kind, .. } => *kind,
            Error::NotFoundError { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<Vec<SpecValidationError>> for Error {
    fn from(issues: Vec<SpecValidationError>) -> Self {
        Error::ConfigurationError(issues)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_and_failure_are_distinct() {
        let timeout = Error::OperationTimeout {
            resource: "cluster",
            resource_id: "c-1".to_string(),
            operation: OperationKind::Create,
            elapsed: Duration::from_secs(3600),
            last_status: Some("CREATING".to_string()),
            cancelled: false,
        };
        let failed = Error::OperationFailed {
            resource: "cluster",
            resource_id: "c-1".to_string(),
            operation: OperationKind::Create,
            status: "FAILED".to_string(),
        };

        assert_eq!(timeout.title(), "Operation timed out");
        assert_eq!(failed.title(), "Operation failed");
        assert!(timeout.to_string().contains("last status: CREATING"));
        assert!(!timeout.to_string().contains("cancelled"));
    }

    #[test]
    fn test_configuration_error_lists_fields() {
        let err = Error::ConfigurationError(vec![
            SpecValidationError::new("credentials.username", "conflict", "pick one"),
            SpecValidationError::new("regions", "empty", "add one"),
        ]);
        let text = err.to_string();
        assert!(text.contains("credentials.username: conflict"));
        assert!(text.contains("regions: empty"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_of_network_errors() {
        let retry = Error::TransportError {
            kind: ErrorKind::Retryable,
            message: "timed out".to_string(),
        };
        assert!(retry.is_retryable());

        let missing = Error::NotFoundError {
            resource: "cluster",
            id: "c-1".to_string(),
        };
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "cluster c-1 not found");
    }
}
