//! Connection state classification.
//!
//! Every remote failure is mapped to one [`ConnectionState`] and one
//! [`ErrorClass`]. Only the network class is retriable.

use std::fmt;

use serde::{Deserialize, Serialize};

use fleetdeck_api::ApiError;

/// Health of the connection to the fleet platform, as last observed.
///
/// Variants are ordered by severity so that aggregating several loads is a
/// plain `max`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    RateLimited,
    NetworkError,
    Timeout,
    AuthRequired,
    MissingKey,
    UnknownError,
    #[default]
    NotChecked,
}

impl ConnectionState {
    /// Wire name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::RateLimited => "rate_limited",
            ConnectionState::NetworkError => "network_error",
            ConnectionState::Timeout => "timeout",
            ConnectionState::AuthRequired => "auth_required",
            ConnectionState::MissingKey => "missing_key",
            ConnectionState::UnknownError => "unknown_error",
            ConnectionState::NotChecked => "not_checked",
        }
    }

    /// Short human label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "Connected",
            ConnectionState::RateLimited => "Rate limited",
            ConnectionState::NetworkError => "Network error",
            ConnectionState::Timeout => "Timed out",
            ConnectionState::AuthRequired => "Sign-in required",
            ConnectionState::MissingKey => "API key missing",
            ConnectionState::UnknownError => "Error",
            ConnectionState::NotChecked => "Not checked",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Network,
    Auth,
    Validation,
    Unknown,
}

impl ErrorClass {
    /// Only transient network failures are worth retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorClass::Network)
    }
}

/// A remote failure after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub state: ConnectionState,
    pub class: ErrorClass,
    pub retriable: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ClassifiedError {
    fn new(state: ConnectionState, class: ErrorClass, message: String, status: Option<u16>) -> Self {
        Self {
            state,
            class,
            retriable: class.is_retriable(),
            message,
            status,
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.state.label(), self.message)
    }
}

/// Classify an API failure.
pub fn classify(err: &ApiError) -> ClassifiedError {
    let message = err.to_string();
    match err {
        ApiError::Auth(_) => {
            ClassifiedError::new(ConnectionState::AuthRequired, ErrorClass::Auth, message, None)
        }
        ApiError::MissingKey { .. } => {
            ClassifiedError::new(ConnectionState::MissingKey, ErrorClass::Auth, message, None)
        }
        ApiError::Validation(_) => ClassifiedError::new(
            ConnectionState::UnknownError,
            ErrorClass::Validation,
            message,
            None,
        ),
        ApiError::Timeout(_) => {
            ClassifiedError::new(ConnectionState::Timeout, ErrorClass::Network, message, None)
        }
        ApiError::Network(_) => ClassifiedError::new(
            ConnectionState::NetworkError,
            ErrorClass::Network,
            message,
            None,
        ),
        ApiError::Http { status, .. } => {
            let (state, class) = classify_status(*status);
            ClassifiedError::new(state, class, message, Some(*status))
        }
        ApiError::Decode(_) => ClassifiedError::new(
            ConnectionState::UnknownError,
            ErrorClass::Unknown,
            message,
            None,
        ),
        ApiError::Other(text) => {
            let (state, class) = classify_message(text);
            ClassifiedError::new(state, class, message, None)
        }
    }
}

/// Classify by HTTP status.
pub fn classify_status(status: u16) -> (ConnectionState, ErrorClass) {
    match status {
        401 | 403 => (ConnectionState::AuthRequired, ErrorClass::Auth),
        400 | 422 => (ConnectionState::UnknownError, ErrorClass::Validation),
        429 => (ConnectionState::RateLimited, ErrorClass::Network),
        408 | 504 => (ConnectionState::Timeout, ErrorClass::Network),
        500..=599 => (ConnectionState::NetworkError, ErrorClass::Network),
        _ => (ConnectionState::UnknownError, ErrorClass::Unknown),
    }
}

/// Best-effort classification of an untyped error message.
pub fn classify_message(message: &str) -> (ConnectionState, ErrorClass) {
    let lower = message.to_lowercase();

    if lower.contains("rate limit") || lower.contains("too many requests") || lower.contains("429") {
        return (ConnectionState::RateLimited, ErrorClass::Network);
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return (ConnectionState::Timeout, ErrorClass::Network);
    }

    if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("network")
        || lower.contains("broken pipe")
        || lower.contains("service unavailable")
        || lower.contains("bad gateway")
    {
        return (ConnectionState::NetworkError, ErrorClass::Network);
    }

    if lower.contains("api key") || lower.contains("missing key") {
        return (ConnectionState::MissingKey, ErrorClass::Auth);
    }

    if lower.contains("unauthorized") || lower.contains("forbidden") || lower.contains("401") {
        return (ConnectionState::AuthRequired, ErrorClass::Auth);
    }

    if lower.contains("invalid") || lower.contains("validation") {
        return (ConnectionState::UnknownError, ErrorClass::Validation);
    }

    (ConnectionState::UnknownError, ErrorClass::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_errors() {
        let auth = classify(&ApiError::Auth("expired".into()));
        assert_eq!(auth.state, ConnectionState::AuthRequired);
        assert_eq!(auth.class, ErrorClass::Auth);
        assert!(!auth.retriable);

        let missing = classify(&ApiError::MissingKey {
            tenant: "acme".into(),
            env_var: "ACME_KEY".into(),
        });
        assert_eq!(missing.state, ConnectionState::MissingKey);
        assert!(!missing.retriable);

        let timeout = classify(&ApiError::Timeout(20));
        assert_eq!(timeout.state, ConnectionState::Timeout);
        assert!(timeout.retriable);

        let validation = classify(&ApiError::Validation("bad id".into()));
        assert_eq!(validation.class, ErrorClass::Validation);
        assert!(!validation.retriable);
    }

    #[test]
    fn test_http_status() {
        let limited = classify(&ApiError::from_status(429, "slow down"));
        assert_eq!(limited.state, ConnectionState::RateLimited);
        assert!(limited.retriable);
        assert_eq!(limited.status, Some(429));

        let unavailable = classify(&ApiError::from_status(503, ""));
        assert_eq!(unavailable.state, ConnectionState::NetworkError);
        assert!(unavailable.retriable);

        let not_found = classify(&ApiError::from_status(404, ""));
        assert_eq!(not_found.class, ErrorClass::Unknown);
        assert!(!not_found.retriable);
    }

    #[test]
    fn test_message_fallback() {
        assert_eq!(
            classify_message("Connection reset by peer").0,
            ConnectionState::NetworkError
        );
        assert_eq!(classify_message("429 Too Many Requests").0, ConnectionState::RateLimited);
        assert_eq!(classify_message("operation timed out").0, ConnectionState::Timeout);
        assert_eq!(classify_message("something odd").1, ErrorClass::Unknown);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::AuthRequired).unwrap();
        assert_eq!(json, "\"auth_required\"");
    }
}
