use std::time::Duration;

use notekeep_core::error::{ErrorRecord, GENERIC_FAILURE_MESSAGE};

/// Failure of a single REST call after retries were exhausted.
///
/// `Clone` so a single outcome can be handed to every caller waiting on a
/// coalesced request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The connection could not be made or broke mid-request.
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt exceeded the per-request timeout.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status}: {}", .record.message)]
    Http { status: u16, record: ErrorRecord },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The response body could not be decoded.
    #[error("Malformed response: {0}")]
    Parse(String),
}

impl ClientError {
    pub fn http(status: u16, record: ErrorRecord) -> Self {
        Self::Http { status, record }
    }

    /// Whether the retry loop may try again after this error.
    ///
    /// Network failures, timeouts and 502/503/504 are transient; every
    /// other status and every cancellation is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => matches!(status, 502..=504),
            Self::Cancelled | Self::Parse(_) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status, if the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The user-facing error record for this failure.
    pub fn record(&self) -> ErrorRecord {
        match self {
            Self::Http { record, .. } => record.clone(),
            Self::Network(_) => ErrorRecord::new(self.to_string()).with_code("NETWORK_ERROR"),
            Self::Timeout(_) => ErrorRecord::new(self.to_string()).with_code("TIMEOUT"),
            Self::Cancelled => ErrorRecord::new(self.to_string()).with_code("CANCELLED"),
            Self::Parse(_) => ErrorRecord::new(GENERIC_FAILURE_MESSAGE).with_code("PARSE_ERROR"),
        }
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors raised while constructing an [`ApiClient`](crate::ApiClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("Invalid API base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
