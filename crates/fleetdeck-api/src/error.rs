//! Typed failures raised by fleet API clients.

use thiserror::Error;

/// Remote call failures.
///
/// Clients raise these; the terminal session classifies them into a
/// connection state rather than propagating them.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Non-success HTTP status not covered by a more specific variant
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Credentials rejected or expired
    #[error("Authentication required: {0}")]
    Auth(String),

    /// Request rejected as malformed or semantically invalid
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No API key is available for the tenant
    #[error("No API key configured for tenant {tenant} (set {env_var})")]
    MissingKey { tenant: String, env_var: String },

    /// Connection could not be established or was reset
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Anything else, carried as text
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Map an HTTP status and body into the most specific variant.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.is_empty() {
            "no response body".to_string()
        } else {
            body.chars().take(200).collect()
        };
        match status {
            401 | 403 => ApiError::Auth(format!("HTTP {status}: {message}")),
            400 | 422 => ApiError::Validation(format!("HTTP {status}: {message}")),
            _ => ApiError::Http { status, message },
        }
    }

    /// HTTP status when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for transient failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(0)
        } else if err.is_connect() || err.is_request() {
            ApiError::Network(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), &err.to_string())
        } else {
            ApiError::Other(err.to_string())
        }
    }
}

/// Result type for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;
