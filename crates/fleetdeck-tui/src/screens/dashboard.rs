//! Fleet summary.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use fleetdeck_core::types::DeviceStatus;

use crate::loader::OutcomeSummary;
use crate::scene::{RenderError, ScenePanel, StatItem};
use crate::screen::{DashboardData, Screen, ScreenData, ScreenId};
use crate::session::SessionContext;

use super::{ensure_ids, fetch_list, loading_lines};

const RECENT_LIMIT: usize = 5;

#[derive(Debug, Default)]
pub struct DashboardScreen {
    data: Option<DashboardData>,
}

impl DashboardScreen {
    fn panels(data: &DashboardData) -> Result<Vec<ScenePanel>, RenderError> {
        let devices = &data.devices.data;
        let incidents = &data.incidents.data;
        let tickets = &data.tickets.data;
        ensure_ids("device", devices.iter().map(|d| d.id.as_str()))?;
        ensure_ids("incident", incidents.iter().map(|i| i.id.as_str()))?;
        ensure_ids("ticket", tickets.iter().map(|t| t.id.as_str()))?;

        let count = |status: DeviceStatus| devices.iter().filter(|d| d.status == status).count();
        let open_incidents: Vec<_> = incidents.iter().filter(|i| i.is_open()).collect();
        let open_tickets: Vec<_> = tickets.iter().filter(|t| t.is_open()).collect();

        let fleet = ScenePanel::stats(
            "fleet",
            "Fleet",
            vec![
                StatItem::new("Devices", devices.len()),
                StatItem::new("Online", count(DeviceStatus::Online)),
                StatItem::new("Degraded", count(DeviceStatus::Degraded)),
                StatItem::new("Offline", count(DeviceStatus::Offline)),
                StatItem::new("Open incidents", open_incidents.len()),
                StatItem::new("Open tickets", open_tickets.len()),
            ],
        )
        .with_status(data.summary().status_text());

        let incident_rows = open_incidents
            .iter()
            .take(RECENT_LIMIT)
            .map(|i| {
                vec![
                    i.id.clone(),
                    i.severity.clone(),
                    i.title.clone(),
                    i.device_id.clone().unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        let incidents_panel = ScenePanel::table(
            "incidents",
            "Open incidents",
            &["ID", "Severity", "Title", "Device"],
            incident_rows,
            None,
        )
        .with_status(data.incidents.summary().status_text());

        let ticket_rows = open_tickets
            .iter()
            .take(RECENT_LIMIT)
            .map(|t| vec![t.id.clone(), t.priority.clone(), t.subject.clone()])
            .collect();
        let tickets_panel = ScenePanel::table(
            "tickets",
            "Open tickets",
            &["ID", "Priority", "Subject"],
            ticket_rows,
            None,
        )
        .with_status(data.tickets.summary().status_text());

        Ok(vec![fleet, incidents_panel, tickets_panel])
    }
}

impl Screen for DashboardScreen {
    fn id(&self) -> ScreenId {
        ScreenId::Dashboard
    }

    fn refresh_job(&self, ctx: &SessionContext) -> BoxFuture<'static, ScreenData> {
        let devices = fetch_list(ctx, "devices", |api, tenant| async move {
            api.list_devices(&tenant).await
        });
        let incidents = fetch_list(ctx, "incidents", |api, tenant| async move {
            api.list_incidents(&tenant).await
        });
        let tickets = fetch_list(ctx, "tickets", |api, tenant| async move {
            api.list_tickets(&tenant).await
        });
        async move {
            let (devices, incidents, tickets) = tokio::join!(devices, incidents, tickets);
            ScreenData::Dashboard(Box::new(DashboardData {
                devices,
                incidents,
                tickets,
            }))
        }
        .boxed()
    }

    fn apply(&mut self, data: ScreenData) {
        if let ScreenData::Dashboard(data) = data {
            self.data = Some(*data);
        }
    }

    fn connection(&self) -> OutcomeSummary {
        self.data
            .as_ref()
            .map(DashboardData::summary)
            .unwrap_or_default()
    }

    fn scene(&self) -> Result<Vec<ScenePanel>, RenderError> {
        match &self.data {
            Some(data) => Self::panels(data),
            None => Ok(vec![ScenePanel::text(
                "fleet",
                "Fleet",
                loading_lines("fleet summary"),
            )]),
        }
    }

    fn fallback_lines(&self) -> Vec<String> {
        let Some(data) = &self.data else {
            return loading_lines("fleet summary");
        };
        let mut lines = vec![format!("devices: {}", data.devices.data.len())];
        lines.extend(data.devices.data.iter().map(|d| format!("  {} {:?}", d.id, d.status)));
        lines.push(format!("incidents: {}", data.incidents.data.len()));
        lines.extend(data.incidents.data.iter().map(|i| format!("  {} {}", i.id, i.state)));
        lines.push(format!("tickets: {}", data.tickets.data.len()));
        lines.extend(data.tickets.data.iter().map(|t| format!("  {} {}", t.id, t.status)));
        lines
    }

    fn key_hints(&self) -> &'static str {
        "r refresh"
    }
}
