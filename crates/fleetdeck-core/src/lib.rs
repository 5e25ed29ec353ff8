//! # fleetdeck-core
//!
//! Core types, errors, and utilities shared by the fleetdeck crates.
//!
//! This crate provides:
//! - [`FleetError`] - Error type for configuration, I/O and terminal failures
//! - [`logging`] - Tracing setup, the debug event log and log file locations
//! - [`config`] - YAML configuration with tenant and session tuning sections
//! - [`types`] - Fleet domain records (devices, spaces, incidents, tickets)
//!
//! ## Example
//!
//! ```no_run
//! use fleetdeck_core::{config::Config, logging::{self, LogOptions}};
//!
//! fn main() -> fleetdeck_core::Result<()> {
//!     let _guard = logging::init_logging(LogOptions::default())?;
//!     let config = Config::load_or_default(None)?;
//!     tracing::info!(tenants = config.tenants.len(), "configuration loaded");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use config::{Config, TenantConfig, TuiConfig};
pub use error::{FleetError, Result};
pub use logging::{LogGuard, LogOptions, init_logging};
pub use types::{Device, DeviceStatus, Incident, OperationKind, OperationReceipt, Space, Ticket};
