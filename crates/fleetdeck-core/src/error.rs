//! Error types for fleetdeck operations.
//!
//! [`FleetError`] covers failures that are not remote-call failures:
//! configuration and local I/O. Remote call
//! failures live in `fleetdeck-api` and are classified, not propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`FleetError`].
pub type Result<T> = std::result::Result<T, FleetError>;

/// Error type for local fleetdeck operations.
#[derive(Debug, Error)]
pub enum FleetError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    /// A tenant was requested that the configuration does not define
    #[error("Unknown tenant: {tenant}")]
    UnknownTenant { tenant: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Home directory could not be determined
    #[error("Could not determine home directory")]
    NoHomeDirectory,
}

impl FleetError {
    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an invalid configuration error from a YAML parse failure.
    pub fn config_invalid(path: impl Into<PathBuf>, source: &serde_yaml::Error) -> Self {
        let message = match source.location() {
            Some(loc) => format!("{} (line {}, column {})", source, loc.line(), loc.column()),
            None => source.to_string(),
        };
        Self::ConfigInvalid {
            path: path.into(),
            message,
        }
    }

    /// Create a configuration validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in ~/.fleetdeck/config.yaml"),
            Self::UnknownTenant { .. } => {
                Some("Add the tenant under 'tenants:' in ~/.fleetdeck/config.yaml or pass --tenant")
            }
            Self::NoHomeDirectory => Some("Set HOME or pass --config and --log-dir explicitly"),
            _ => None,
        }
    }
}
