//! In-memory fleet API with scripted failures.
//!
//! Serves fixed fleet data and lets callers queue failures per resource,
//! which makes retry, degradation and staleness behaviour reproducible.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use fleetdeck_core::types::{
    Device, DeviceStatus, Incident, OperationKind, OperationReceipt, Space, Ticket,
};

use crate::FleetApi;
use crate::error::{ApiError, Result};

/// Resource namespaces, used to target scripted failures and delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Devices,
    Spaces,
    SpaceDevices,
    Incidents,
    Tickets,
    Operations,
}

#[derive(Debug, Default)]
struct Script {
    failures: HashMap<Resource, VecDeque<ApiError>>,
    delays: HashMap<Resource, Duration>,
    space_delays: HashMap<String, Duration>,
    calls: HashMap<Resource, u32>,
}

/// Fixture-backed [`FleetApi`].
#[derive(Debug, Default)]
pub struct ScriptedFleetApi {
    devices: Vec<Device>,
    spaces: Vec<Space>,
    incidents: Vec<Incident>,
    tickets: Vec<Ticket>,
    script: Mutex<Script>,
    operation_counter: AtomicU32,
}

impl ScriptedFleetApi {
    /// Empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A small sample fleet for demos and tests.
    pub fn demo() -> Self {
        let device = |id: &str, name: &str, status, space: &str| Device {
            id: id.to_string(),
            name: name.to_string(),
            status,
            space_id: Some(space.to_string()),
            model: Some("FX-200".to_string()),
            last_seen: None,
        };
        let devices = vec![
            device("dev-001", "lobby-display", DeviceStatus::Online, "spc-hq"),
            device("dev-002", "dock-sensor", DeviceStatus::Offline, "spc-wh"),
            device("dev-003", "boardroom-panel", DeviceStatus::Online, "spc-hq"),
            device("dev-004", "gate-camera", DeviceStatus::Degraded, "spc-wh"),
        ];
        let spaces = vec![
            Space {
                id: "spc-hq".to_string(),
                name: "Headquarters".to_string(),
                parent_id: None,
                device_count: 2,
            },
            Space {
                id: "spc-wh".to_string(),
                name: "Warehouse".to_string(),
                parent_id: None,
                device_count: 2,
            },
        ];
        let incidents = vec![Incident {
            id: "inc-17".to_string(),
            title: "dock-sensor unreachable".to_string(),
            severity: "high".to_string(),
            state: "open".to_string(),
            device_id: Some("dev-002".to_string()),
            opened_at: None,
        }];
        let tickets = vec![Ticket {
            id: "tkt-204".to_string(),
            subject: "Replace gate camera housing".to_string(),
            status: "open".to_string(),
            priority: "normal".to_string(),
            assignee: Some("ops".to_string()),
        }];
        Self::new()
            .with_devices(devices)
            .with_spaces(spaces)
            .with_incidents(incidents)
            .with_tickets(tickets)
    }

    pub fn with_devices(mut self, devices: Vec<Device>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_spaces(mut self, spaces: Vec<Space>) -> Self {
        self.spaces = spaces;
        self
    }

    pub fn with_incidents(mut self, incidents: Vec<Incident>) -> Self {
        self.incidents = incidents;
        self
    }

    pub fn with_tickets(mut self, tickets: Vec<Ticket>) -> Self {
        self.tickets = tickets;
        self
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a failure for the next call to `resource`. Failures are consumed
    /// in the order they were queued.
    pub fn fail_next(&self, resource: Resource, error: ApiError) {
        self.script().failures.entry(resource).or_default().push_back(error);
    }

    /// Delay every call to `resource`.
    pub fn set_delay(&self, resource: Resource, delay: Duration) {
        self.script().delays.insert(resource, delay);
    }

    /// Delay drill-down calls for one space.
    pub fn set_space_delay(&self, space_id: &str, delay: Duration) {
        self.script().space_delays.insert(space_id.to_string(), delay);
    }

    /// Number of calls made to `resource` so far.
    pub fn calls(&self, resource: Resource) -> u32 {
        self.script().calls.get(&resource).copied().unwrap_or(0)
    }

    /// Record a call and return its scripted delay and failure, if any.
    fn begin(&self, resource: Resource, space_id: Option<&str>) -> (Option<Duration>, Option<ApiError>) {
        let mut script = self.script();
        *script.calls.entry(resource).or_insert(0) += 1;
        let delay = space_id
            .and_then(|id| script.space_delays.get(id).copied())
            .or_else(|| script.delays.get(&resource).copied());
        let failure = script.failures.get_mut(&resource).and_then(|q| q.pop_front());
        (delay, failure)
    }

    async fn call<T>(&self, resource: Resource, space_id: Option<&str>, value: impl FnOnce() -> T) -> Result<T> {
        let (delay, failure) = self.begin(resource, space_id);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(value()),
        }
    }
}

#[async_trait]
impl FleetApi for ScriptedFleetApi {
    async fn list_devices(&self, _tenant: &str) -> Result<Vec<Device>> {
        self.call(Resource::Devices, None, || self.devices.clone()).await
    }

    async fn list_spaces(&self, _tenant: &str) -> Result<Vec<Space>> {
        self.call(Resource::Spaces, None, || self.spaces.clone()).await
    }

    async fn list_space_devices(&self, _tenant: &str, space_id: &str) -> Result<Vec<Device>> {
        self.call(Resource::SpaceDevices, Some(space_id), || {
            self.devices
                .iter()
                .filter(|d| d.space_id.as_deref() == Some(space_id))
                .cloned()
                .collect()
        })
        .await
    }

    async fn list_incidents(&self, _tenant: &str) -> Result<Vec<Incident>> {
        self.call(Resource::Incidents, None, || self.incidents.clone()).await
    }

    async fn list_tickets(&self, _tenant: &str) -> Result<Vec<Ticket>> {
        self.call(Resource::Tickets, None, || self.tickets.clone()).await
    }

    async fn invoke_operation(
        &self,
        _tenant: &str,
        device_id: &str,
        operation: OperationKind,
    ) -> Result<OperationReceipt> {
        if !self.devices.iter().any(|d| d.id == device_id) {
            let (_, failure) = self.begin(Resource::Operations, None);
            return Err(failure.unwrap_or_else(|| ApiError::Validation(format!("unknown device {device_id}"))));
        }
        let n = self.operation_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.call(Resource::Operations, None, || OperationReceipt {
            operation_id: format!("op-{n}"),
            device_id: device_id.to_string(),
            operation,
            accepted: true,
        })
        .await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Client used when no real one could be built, for example when the
/// tenant's API key is missing. Every call fails with the same error so the
/// session can still start and show the degraded connection state.
#[derive(Debug, Clone)]
pub struct UnavailableFleetApi {
    error: ApiError,
}

impl UnavailableFleetApi {
    pub fn new(error: ApiError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl FleetApi for UnavailableFleetApi {
    async fn list_devices(&self, _tenant: &str) -> Result<Vec<Device>> {
        Err(self.error.clone())
    }

    async fn list_spaces(&self, _tenant: &str) -> Result<Vec<Space>> {
        Err(self.error.clone())
    }

    async fn list_space_devices(&self, _tenant: &str, _space_id: &str) -> Result<Vec<Device>> {
        Err(self.error.clone())
    }

    async fn list_incidents(&self, _tenant: &str) -> Result<Vec<Incident>> {
        Err(self.error.clone())
    }

    async fn list_tickets(&self, _tenant: &str) -> Result<Vec<Ticket>> {
        Err(self.error.clone())
    }

    async fn invoke_operation(
        &self,
        _tenant: &str,
        _device_id: &str,
        _operation: OperationKind,
    ) -> Result<OperationReceipt> {
        Err(self.error.clone())
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
