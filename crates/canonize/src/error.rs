//! Error types for the canonize library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// How an external provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceFailure {
    /// The request could not be sent or the connection dropped.
    Request,
    /// The provider did not answer in time.
    Timeout,
    /// The provider rejected the request because of rate limits.
    RateLimited,
    /// The provider answered with a non-success HTTP status.
    Status(u16),
    /// The provider answered, but the payload could not be used.
    MalformedResponse,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceFailure::Request => write!(f, "request failed"),
            ServiceFailure::Timeout => write!(f, "timed out"),
            ServiceFailure::RateLimited => write!(f, "rate limited"),
            ServiceFailure::Status(code) => write!(f, "HTTP {}", code),
            ServiceFailure::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

/// Main error type for canonize operations.
#[derive(Debug, Error)]
pub enum CanonizeError {
    /// Unknown method name, missing credential or out-of-range parameter.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An embedding or reasoning provider failed.
    #[error("Service error from {provider} ({kind}): {message}")]
    Service {
        provider: String,
        kind: ServiceFailure,
        message: String,
    },

    /// Input data is unusable (missing column, nothing to cluster, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CanonizeError {
    /// Build a service error.
    pub fn service(
        provider: impl Into<String>,
        kind: ServiceFailure,
        message: impl Into<String>,
    ) -> Self {
        CanonizeError::Service {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Build a malformed-response service error.
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::service(provider, ServiceFailure::MalformedResponse, message)
    }

    /// Classify a reqwest failure.
    pub(crate) fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ServiceFailure::Timeout
        } else if let Some(status) = err.status() {
            ServiceFailure::Status(status.as_u16())
        } else {
            ServiceFailure::Request
        };
        Self::service(provider, kind, err.to_string())
    }

    /// True for a provider answer that could not be parsed.
    pub fn is_malformed_response(&self) -> bool {
        matches!(
            self,
            CanonizeError::Service {
                kind: ServiceFailure::MalformedResponse,
                ..
            }
        )
    }
}

/// Result type alias for canonize operations.
pub type Result<T> = std::result::Result<T, CanonizeError>;
