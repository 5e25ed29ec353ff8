//! Fleet platform API client boundary.
//!
//! The terminal session only talks to the platform through the [`FleetApi`]
//! trait. Every call takes the tenant id it is scoped to and raises typed
//! [`ApiError`]s that the session classifies.
//!
//! ## Implementations
//!
//! - [`HttpFleetApi`] - reqwest client against a tenant's REST endpoint
//! - [`ScriptedFleetApi`] - in-memory fixture with scripted failures, used by
//!   tests and the `--demo` data source
//! - [`UnavailableFleetApi`] - stands in when no client could be built, so the
//!   session still starts in a degraded state

pub mod error;
pub mod http;
pub mod scripted;

use async_trait::async_trait;
use fleetdeck_core::types::{Device, Incident, OperationKind, OperationReceipt, Space, Ticket};

pub use error::{ApiError, Result};
pub use http::HttpFleetApi;
pub use scripted::{Resource, ScriptedFleetApi, UnavailableFleetApi};

/// Per-resource namespaces of the fleet platform API.
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// List all devices visible to the tenant.
    async fn list_devices(&self, tenant: &str) -> Result<Vec<Device>>;

    /// List spaces (sites, floors, rooms).
    async fn list_spaces(&self, tenant: &str) -> Result<Vec<Space>>;

    /// List the devices assigned to one space.
    async fn list_space_devices(&self, tenant: &str, space_id: &str) -> Result<Vec<Device>>;

    /// List incidents.
    async fn list_incidents(&self, tenant: &str) -> Result<Vec<Incident>>;

    /// List support tickets.
    async fn list_tickets(&self, tenant: &str) -> Result<Vec<Ticket>>;

    /// Invoke a remote operation on a device.
    async fn invoke_operation(
        &self,
        tenant: &str,
        device_id: &str,
        operation: OperationKind,
    ) -> Result<OperationReceipt>;

    /// Client name for logging.
    fn name(&self) -> &str;
}
