//! Space list with device drill-down.
//!
//! Moving the cursor in the space list asks the session to load that
//! space's devices. The session runs those loads through a stale-safe
//! loader, so fast scrolling only ever shows the last selection's devices.

use crossterm::event::KeyCode;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use fleetdeck_core::types::{Device, Space};

use crate::dispatch::{ArrowDirection, ArrowResult};
use crate::input::InputEvent;
use crate::loader::{LoadOutcome, OutcomeSummary};
use crate::scene::{RenderError, ScenePanel};
use crate::screen::{Screen, ScreenCommand, ScreenData, ScreenId};
use crate::selection::{ListSelection, SelectionChange, SelectionOrigin};
use crate::session::SessionContext;

use super::{DEVICE_COLUMNS, device_fallback_lines, device_row, ensure_ids, fetch_list, loading_lines};

const PANES: &[&str] = &["spaces", "devices"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Pane {
    #[default]
    Spaces,
    Devices,
}

#[derive(Debug)]
struct SpaceDetail {
    space_id: String,
    outcome: LoadOutcome<Vec<Device>>,
}

#[derive(Debug)]
pub struct SpacesScreen {
    spaces: LoadOutcome<Vec<Space>>,
    loaded: bool,
    selection: ListSelection,
    pane: Pane,
    detail: Option<SpaceDetail>,
    pending: Option<String>,
    commands: Vec<ScreenCommand>,
}

impl Default for SpacesScreen {
    fn default() -> Self {
        Self {
            spaces: LoadOutcome::pending(Vec::new()),
            loaded: false,
            selection: ListSelection::default(),
            pane: Pane::Spaces,
            detail: None,
            pending: None,
            commands: Vec::new(),
        }
    }
}

impl SpacesScreen {
    fn selected(&self) -> Option<&Space> {
        self.selection.index().and_then(|i| self.spaces.data.get(i))
    }

    fn request_detail(&mut self) {
        if let Some(space_id) = self.selected().map(|s| s.id.clone()) {
            self.pending = Some(space_id.clone());
            self.commands.push(ScreenCommand::LoadSpaceDevices(space_id));
        }
    }

    fn on_selection(&mut self, change: Option<SelectionChange>) -> ArrowResult {
        match change {
            Some(change) => {
                if change.should_load() {
                    self.request_detail();
                }
                ArrowResult::Handled
            }
            None => ArrowResult::Boundary,
        }
    }

    /// Space id the drill-down pane currently shows.
    pub fn detail_space(&self) -> Option<&str> {
        self.detail.as_ref().map(|d| d.space_id.as_str())
    }
}

/// Drill-down job for one space, owned and ready to run off the screen.
pub fn load_space_devices(ctx: &SessionContext, space_id: String) -> BoxFuture<'static, ScreenData> {
    let key = space_id.clone();
    fetch_list(ctx, "space devices", move |api, tenant| {
        let space_id = key.clone();
        async move { api.list_space_devices(&tenant, &space_id).await }
    })
    .map(move |outcome| ScreenData::SpaceDevices { space_id, outcome })
    .boxed()
}

impl Screen for SpacesScreen {
    fn id(&self) -> ScreenId {
        ScreenId::Spaces
    }

    fn unmount(&mut self) {
        self.pending = None;
    }

    fn focus(&mut self) {
        self.pane = Pane::Spaces;
    }

    fn refresh_job(&self, ctx: &SessionContext) -> BoxFuture<'static, ScreenData> {
        fetch_list(ctx, "spaces", |api, tenant| async move {
            api.list_spaces(&tenant).await
        })
        .map(ScreenData::Spaces)
        .boxed()
    }

    fn apply(&mut self, data: ScreenData) {
        match data {
            ScreenData::Spaces(outcome) => {
                self.spaces = outcome;
                self.loaded = true;
                // Cursor repositioning here is programmatic and does not load
                // by itself; the drill-down is reconciled once below instead.
                self.selection.set_len(self.spaces.data.len());
                let selected = self.selected().map(|s| s.id.clone());
                match selected {
                    Some(id) if self.detail_space() != Some(id.as_str()) => self.request_detail(),
                    Some(_) => {}
                    None => self.detail = None,
                }
            }
            ScreenData::SpaceDevices { space_id, outcome } => {
                if self.selected().map(|s| s.id.as_str()) == Some(space_id.as_str()) {
                    if self.pending.as_deref() == Some(space_id.as_str()) {
                        self.pending = None;
                    }
                    self.detail = Some(SpaceDetail { space_id, outcome });
                }
            }
            _ => {}
        }
    }

    fn available_panes(&self) -> &'static [&'static str] {
        PANES
    }

    fn active_pane(&self) -> Option<&'static str> {
        Some(match self.pane {
            Pane::Spaces => PANES[0],
            Pane::Devices => PANES[1],
        })
    }

    fn has_arrow_handler(&self) -> bool {
        true
    }

    fn handle_arrow(&mut self, direction: ArrowDirection) -> ArrowResult {
        match (direction, self.pane) {
            (ArrowDirection::Up, Pane::Spaces) => {
                let change = self.selection.move_by(-1, SelectionOrigin::User);
                self.on_selection(change)
            }
            (ArrowDirection::Down, Pane::Spaces) => {
                let change = self.selection.move_by(1, SelectionOrigin::User);
                self.on_selection(change)
            }
            (ArrowDirection::Up | ArrowDirection::Down, Pane::Devices) => ArrowResult::Unhandled,
            (ArrowDirection::Right, Pane::Spaces) => {
                self.pane = Pane::Devices;
                ArrowResult::Handled
            }
            (ArrowDirection::Left, Pane::Devices) => {
                self.pane = Pane::Spaces;
                ArrowResult::Handled
            }
            (ArrowDirection::Left, Pane::Spaces) | (ArrowDirection::Right, Pane::Devices) => {
                ArrowResult::Boundary
            }
        }
    }

    fn has_key_handler(&self) -> bool {
        true
    }

    fn handle_key(&mut self, event: &InputEvent) -> bool {
        if event.code() == KeyCode::Enter {
            self.request_detail();
            return true;
        }
        false
    }

    fn take_commands(&mut self) -> Vec<ScreenCommand> {
        std::mem::take(&mut self.commands)
    }

    fn connection(&self) -> OutcomeSummary {
        match &self.detail {
            Some(detail) => OutcomeSummary::aggregate([&self.spaces.summary(), &detail.outcome.summary()]),
            None => self.spaces.summary(),
        }
    }

    fn scene(&self) -> Result<Vec<ScenePanel>, RenderError> {
        if !self.loaded {
            return Ok(vec![ScenePanel::text("spaces", "Spaces", loading_lines("spaces"))]);
        }
        ensure_ids("space", self.spaces.data.iter().map(|s| s.id.as_str()))?;

        let rows = self
            .spaces
            .data
            .iter()
            .map(|s| {
                vec![
                    s.id.clone(),
                    s.name.clone(),
                    s.device_count.to_string(),
                    s.parent_id.clone().unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        let spaces = ScenePanel::table(
            "spaces",
            "Spaces",
            &["ID", "Name", "Devices", "Parent"],
            rows,
            self.selection.index(),
        )
        .with_status(self.spaces.summary().status_text())
        .focused(self.pane == Pane::Spaces);

        let title = match self.selected() {
            Some(space) => format!("Devices in {}", space.name),
            None => "Devices".to_string(),
        };
        let devices = match &self.detail {
            Some(detail) => {
                ensure_ids("device", detail.outcome.data.iter().map(|d| d.id.as_str()))?;
                let status = if self.pending.is_some() {
                    "Loading...".to_string()
                } else {
                    detail.outcome.summary().status_text()
                };
                ScenePanel::table(
                    "space-devices",
                    title,
                    DEVICE_COLUMNS,
                    detail.outcome.data.iter().map(device_row).collect(),
                    None,
                )
                .with_status(status)
            }
            None if self.pending.is_some() => {
                ScenePanel::text("space-devices", title, loading_lines("devices"))
            }
            None => ScenePanel::text("space-devices", title, vec!["No space selected".to_string()]),
        };

        Ok(vec![spaces, devices.focused(self.pane == Pane::Devices)])
    }

    fn fallback_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .spaces
            .data
            .iter()
            .map(|s| format!("{} {}", s.id, s.device_count))
            .collect();
        if let Some(detail) = &self.detail {
            lines.push(format!("devices in {}:", detail.space_id));
            lines.extend(device_fallback_lines(&detail.outcome.data));
        }
        lines
    }

    fn key_hints(&self) -> &'static str {
        "↑/↓ select space  Enter reload  Shift+←/→ panes"
    }
}

#[cfg(test)]
mod tests {
    use fleetdeck_core::types::DeviceStatus;

    use crate::connectivity::ConnectionState;
    use crate::loader::RetryState;

    use super::*;

    fn connected<T>(data: T) -> LoadOutcome<T> {
        LoadOutcome {
            data,
            state: ConnectionState::Connected,
            error: None,
            retry: RetryState { attempts: 1, retried: false },
        }
    }

    fn space(id: &str) -> Space {
        Space {
            id: id.into(),
            name: id.to_uppercase(),
            parent_id: None,
            device_count: 1,
        }
    }

    fn device_in(space: &str) -> Device {
        Device {
            id: format!("dev-{space}"),
            name: "d".into(),
            status: DeviceStatus::Online,
            space_id: Some(space.into()),
            model: None,
            last_seen: None,
        }
    }

    #[test]
    fn test_initial_load_requests_detail_once() {
        let mut screen = SpacesScreen::default();
        screen.apply(ScreenData::Spaces(connected(vec![space("a"), space("b")])));
        assert_eq!(
            screen.take_commands(),
            vec![ScreenCommand::LoadSpaceDevices("a".into())]
        );

        screen.apply(ScreenData::SpaceDevices {
            space_id: "a".into(),
            outcome: connected(vec![device_in("a")]),
        });
        assert_eq!(screen.detail_space(), Some("a"));

        // A refresh that keeps the same selection does not reload the detail.
        screen.apply(ScreenData::Spaces(connected(vec![space("a"), space("b")])));
        assert!(screen.take_commands().is_empty());
    }

    #[test]
    fn test_user_navigation_requests_detail() {
        let mut screen = SpacesScreen::default();
        screen.apply(ScreenData::Spaces(connected(vec![space("a"), space("b")])));
        screen.take_commands();

        assert_eq!(screen.handle_arrow(ArrowDirection::Down), ArrowResult::Handled);
        assert_eq!(
            screen.take_commands(),
            vec![ScreenCommand::LoadSpaceDevices("b".into())]
        );
        assert_eq!(screen.handle_arrow(ArrowDirection::Down), ArrowResult::Boundary);
        assert!(screen.take_commands().is_empty());
    }

    #[tokio::test]
    async fn test_load_space_devices_job() {
        use std::sync::Arc;

        use fleetdeck_api::ScriptedFleetApi;
        use fleetdeck_core::TuiConfig;

        let ctx = SessionContext::new(Arc::new(ScriptedFleetApi::demo()), None, TuiConfig::default());
        match load_space_devices(&ctx, "spc-wh".into()).await {
            ScreenData::SpaceDevices { space_id, outcome } => {
                assert_eq!(space_id, "spc-wh");
                assert_eq!(outcome.state, ConnectionState::Connected);
                assert!(outcome.data.iter().all(|d| d.space_id.as_deref() == Some("spc-wh")));
            }
            other => panic!("unexpected payload {}", other.kind()),
        }
    }

    #[test]
    fn test_detail_for_other_space_ignored() {
        let mut screen = SpacesScreen::default();
        screen.apply(ScreenData::Spaces(connected(vec![space("a"), space("b")])));
        screen.handle_arrow(ArrowDirection::Down);

        screen.apply(ScreenData::SpaceDevices {
            space_id: "a".into(),
            outcome: connected(vec![device_in("a")]),
        });
        assert_eq!(screen.detail_space(), None);

        screen.apply(ScreenData::SpaceDevices {
            space_id: "b".into(),
            outcome: connected(vec![device_in("b")]),
        });
        assert_eq!(screen.detail_space(), Some("b"));
        let panels = screen.scene().unwrap();
        assert_eq!(panels[1].title, "Devices in B");
    }
}
