//! Error types for the terminal session.

use fleetdeck_core::FleetError;
use thiserror::Error;

/// Session-level failures.
///
/// Remote call failures never show up here: loaders classify them into a
/// connection state and keep the session running.
#[derive(Debug, Error)]
pub enum TuiError {
    // =========================================================================
    // Terminal
    // =========================================================================
    /// Terminal I/O failed (raw mode, alternate screen, draw)
    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    // =========================================================================
    // Headless protocol
    // =========================================================================
    /// A frame could not be serialized
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// Headless output only supports JSON lines
    #[error("Unsupported headless format '{0}' (expected 'json')")]
    UnsupportedFormat(String),

    // =========================================================================
    // Session control
    // =========================================================================
    /// Typed confirmation did not match the expected token
    #[error("Confirmation text did not match '{expected}'")]
    ConfirmationMismatch { expected: String },

    /// The same error repeated often enough to end the session
    #[error("Session stopped after {count} repeated errors: {message}")]
    ErrorStorm { message: String, count: u32 },

    /// Unknown screen name
    #[error("Unknown screen '{0}' (expected dashboard, devices, spaces, incidents or tickets)")]
    UnknownScreen(String),

    // =========================================================================
    // Passthrough
    // =========================================================================
    #[error(transparent)]
    Core(#[from] FleetError),
}

impl TuiError {
    /// Exit code a CLI should use for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            TuiError::ErrorStorm { .. } => 3,
            TuiError::UnsupportedFormat(_) | TuiError::UnknownScreen(_) => 2,
            _ => 1,
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, TuiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let storm = TuiError::ErrorStorm {
            message: "render failed".into(),
            count: 5,
        };
        assert_eq!(storm.exit_code(), 3);
        assert_eq!(TuiError::UnsupportedFormat("yaml".into()).exit_code(), 2);
        assert_eq!(
            TuiError::Terminal(std::io::Error::other("gone")).exit_code(),
            1
        );
    }

    #[test]
    fn test_storm_message() {
        let err = TuiError::ErrorStorm {
            message: "boom".into(),
            count: 5,
        };
        assert_eq!(err.to_string(), "Session stopped after 5 repeated errors: boom");
    }
}
