//! Screen implementations.

mod dashboard;
mod devices;
mod records;
mod spaces;

pub use dashboard::DashboardScreen;
pub use devices::DevicesScreen;
pub use records::{IncidentsScreen, ListRecord, RecordScreen, TicketsScreen};
pub use spaces::{SpacesScreen, load_space_devices};

use std::future::Future;
use std::sync::Arc;

use fleetdeck_api::{ApiError, FleetApi};
use fleetdeck_core::types::Device;

use crate::loader::LoadOutcome;
use crate::scene::RenderError;
use crate::session::SessionContext;

/// Load a list through the session's retrying loader, falling back to an
/// empty list. The returned future owns everything it needs.
pub(crate) fn fetch_list<T, F, Fut>(
    ctx: &SessionContext,
    label: &'static str,
    call: F,
) -> impl Future<Output = LoadOutcome<Vec<T>>> + Send + 'static
where
    T: Send + 'static,
    F: Fn(Arc<dyn FleetApi>, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, ApiError>> + Send + 'static,
{
    let api = ctx.api.clone();
    let tenant = ctx.tenant_key();
    let loader = ctx.loader.clone();
    async move {
        loader
            .load(label, Vec::new(), || call(api.clone(), tenant.clone()))
            .await
    }
}

/// Reject records the platform sent without an id.
pub(crate) fn ensure_ids<'a>(
    kind: &str,
    ids: impl IntoIterator<Item = &'a str>,
) -> Result<(), RenderError> {
    for (position, id) in ids.into_iter().enumerate() {
        if id.trim().is_empty() {
            return Err(RenderError::new(format!(
                "{kind} record at position {position} has no id"
            )));
        }
    }
    Ok(())
}

pub(crate) const DEVICE_COLUMNS: &[&str] = &["ID", "Name", "Status", "Space", "Model"];

pub(crate) fn device_row(device: &Device) -> Vec<String> {
    vec![
        device.id.clone(),
        device.name.clone(),
        format!("{} {}", device.status.indicator(), device.status),
        device.space_id.clone().unwrap_or_else(|| "-".to_string()),
        device.model.clone().unwrap_or_else(|| "-".to_string()),
    ]
}

/// Raw id/status lines for render fallback.
pub(crate) fn device_fallback_lines(devices: &[Device]) -> Vec<String> {
    devices
        .iter()
        .map(|d| format!("{} {:?}", d.id, d.status))
        .collect()
}

/// Placeholder shown before the first load completes.
pub(crate) fn loading_lines(what: &str) -> Vec<String> {
    vec![format!("Loading {what}...")]
}

#[cfg(test)]
mod tests {
    use fleetdeck_core::types::DeviceStatus;

    use super::*;

    #[test]
    fn test_ensure_ids() {
        assert!(ensure_ids("device", ["a", "b"]).is_ok());
        let err = ensure_ids("device", ["a", " "]).unwrap_err();
        assert!(err.message.contains("position 1"));
    }

    #[test]
    fn test_device_row() {
        let device = Device {
            id: "dev-1".into(),
            name: "lobby".into(),
            status: DeviceStatus::Online,
            space_id: None,
            model: None,
            last_seen: None,
        };
        let row = device_row(&device);
        assert_eq!(row.len(), DEVICE_COLUMNS.len());
        assert_eq!(row[3], "-");
    }
}
