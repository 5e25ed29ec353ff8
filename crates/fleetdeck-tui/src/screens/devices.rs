//! Device table with a detail pane and remote operations.
//!
//! Keys: `/` filters by name or id, `b` reboots the selected device (typed
//! confirmation), `l` asks it to identify itself. Shift+Left/Right move
//! between the table and detail panes.

use crossterm::event::KeyCode;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use fleetdeck_core::types::{Device, OperationKind};

use crate::dispatch::{ArrowDirection, ArrowResult};
use crate::input::InputEvent;
use crate::loader::{LoadOutcome, OutcomeSummary};
use crate::scene::{RenderError, ScenePanel};
use crate::screen::{DeviceAction, Screen, ScreenCommand, ScreenData, ScreenId};
use crate::selection::{ListSelection, SelectionOrigin};
use crate::session::SessionContext;

use super::{DEVICE_COLUMNS, device_fallback_lines, device_row, ensure_ids, fetch_list, loading_lines};

const PANES: &[&str] = &["devices", "detail"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Pane {
    #[default]
    Table,
    Detail,
}

/// Filter text being edited, with a character cursor.
#[derive(Debug, Default)]
struct FilterEdit {
    cursor: usize,
}

#[derive(Debug)]
pub struct DevicesScreen {
    outcome: LoadOutcome<Vec<Device>>,
    loaded: bool,
    selection: ListSelection,
    pane: Pane,
    filter: String,
    editing: Option<FilterEdit>,
    commands: Vec<ScreenCommand>,
}

impl Default for DevicesScreen {
    fn default() -> Self {
        Self {
            outcome: LoadOutcome::pending(Vec::new()),
            loaded: false,
            selection: ListSelection::default(),
            pane: Pane::Table,
            filter: String::new(),
            editing: None,
            commands: Vec::new(),
        }
    }
}

impl DevicesScreen {
    fn visible(&self) -> Vec<&Device> {
        let needle = self.filter.to_lowercase();
        self.outcome
            .data
            .iter()
            .filter(|d| {
                needle.is_empty()
                    || d.name.to_lowercase().contains(&needle)
                    || d.id.to_lowercase().contains(&needle)
            })
            .collect()
    }

    fn selected(&self) -> Option<&Device> {
        let index = self.selection.index()?;
        self.visible().get(index).copied()
    }

    fn sync_selection(&mut self) {
        let len = self.visible().len();
        self.selection.set_len(len);
    }

    fn action_for(&self, operation: OperationKind) -> Option<DeviceAction> {
        self.selected().map(|d| DeviceAction {
            device_id: d.id.clone(),
            device_name: d.name.clone(),
            operation,
        })
    }

    fn handle_filter_key(&mut self, event: &InputEvent) -> bool {
        let Some(edit) = self.editing.as_mut() else {
            return false;
        };
        match event.code() {
            KeyCode::Esc | KeyCode::Enter => {
                self.editing = None;
            }
            KeyCode::Backspace => {
                if edit.cursor > 0 {
                    let at = byte_offset(&self.filter, edit.cursor - 1);
                    self.filter.remove(at);
                    edit.cursor -= 1;
                }
                self.sync_selection();
            }
            _ => match event.character() {
                Some(c) => {
                    let at = byte_offset(&self.filter, edit.cursor);
                    self.filter.insert(at, c);
                    edit.cursor += 1;
                    self.sync_selection();
                }
                None => return false,
            },
        }
        true
    }

    fn filter_arrow(&mut self, direction: ArrowDirection) -> ArrowResult {
        let len = self.filter.chars().count();
        let Some(edit) = self.editing.as_mut() else {
            return ArrowResult::Unhandled;
        };
        match direction {
            ArrowDirection::Left if edit.cursor > 0 => {
                edit.cursor -= 1;
                ArrowResult::Handled
            }
            ArrowDirection::Right if edit.cursor < len => {
                edit.cursor += 1;
                ArrowResult::Handled
            }
            ArrowDirection::Left | ArrowDirection::Right => ArrowResult::Boundary,
            ArrowDirection::Up | ArrowDirection::Down => ArrowResult::Unhandled,
        }
    }

    fn detail_lines(device: &Device) -> Vec<String> {
        vec![
            format!("ID:        {}", device.id),
            format!("Name:      {}", device.name),
            format!("Status:    {} {}", device.status.indicator(), device.status),
            format!("Space:     {}", device.space_id.as_deref().unwrap_or("-")),
            format!("Model:     {}", device.model.as_deref().unwrap_or("-")),
            format!(
                "Last seen: {}",
                device
                    .last_seen
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
        ]
    }
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl Screen for DevicesScreen {
    fn id(&self) -> ScreenId {
        ScreenId::Devices
    }

    fn unmount(&mut self) {
        self.editing = None;
    }

    fn focus(&mut self) {
        self.pane = Pane::Table;
    }

    fn refresh_job(&self, ctx: &SessionContext) -> BoxFuture<'static, ScreenData> {
        fetch_list(ctx, "devices", |api, tenant| async move {
            api.list_devices(&tenant).await
        })
        .map(ScreenData::Devices)
        .boxed()
    }

    fn apply(&mut self, data: ScreenData) {
        if let ScreenData::Devices(outcome) = data {
            let previous = self.selected().map(|d| d.id.clone());
            self.outcome = outcome;
            self.loaded = true;
            self.sync_selection();
            // Keep the cursor on the same device across refreshes.
            let index = previous.and_then(|id| self.visible().iter().position(|d| d.id == id));
            if let Some(index) = index {
                self.selection.select(index, SelectionOrigin::Programmatic);
            }
        }
    }

    fn available_panes(&self) -> &'static [&'static str] {
        PANES
    }

    fn active_pane(&self) -> Option<&'static str> {
        Some(match self.pane {
            Pane::Table => PANES[0],
            Pane::Detail => PANES[1],
        })
    }

    fn has_arrow_handler(&self) -> bool {
        true
    }

    fn handle_arrow(&mut self, direction: ArrowDirection) -> ArrowResult {
        if self.editing.is_some() && direction.is_horizontal() {
            return self.filter_arrow(direction);
        }
        match (direction, self.pane) {
            (ArrowDirection::Up, Pane::Table) => self
                .selection
                .move_by(-1, SelectionOrigin::User)
                .map_or(ArrowResult::Boundary, |_| ArrowResult::Handled),
            (ArrowDirection::Down, Pane::Table) => self
                .selection
                .move_by(1, SelectionOrigin::User)
                .map_or(ArrowResult::Boundary, |_| ArrowResult::Handled),
            (ArrowDirection::Up | ArrowDirection::Down, Pane::Detail) => ArrowResult::Unhandled,
            (ArrowDirection::Right, Pane::Table) => {
                self.pane = Pane::Detail;
                ArrowResult::Handled
            }
            (ArrowDirection::Left, Pane::Detail) => {
                self.pane = Pane::Table;
                ArrowResult::Handled
            }
            (ArrowDirection::Left, Pane::Table) | (ArrowDirection::Right, Pane::Detail) => {
                ArrowResult::Boundary
            }
        }
    }

    fn claims_horizontal_arrows(&self) -> bool {
        self.editing.is_some()
    }

    fn has_key_handler(&self) -> bool {
        true
    }

    fn handle_key(&mut self, event: &InputEvent) -> bool {
        if self.editing.is_some() {
            return self.handle_filter_key(event);
        }
        match event.character() {
            Some('/') => {
                self.editing = Some(FilterEdit {
                    cursor: self.filter.chars().count(),
                });
                true
            }
            Some('b') => {
                if let Some(action) = self.action_for(OperationKind::Reboot) {
                    self.commands.push(ScreenCommand::Confirm {
                        title: "Reboot device".to_string(),
                        prompt: format!(
                            "Rebooting {} ({}) interrupts it. Type the device name to confirm.",
                            action.device_name, action.device_id
                        ),
                        token: action.device_name.clone(),
                        action,
                    });
                }
                true
            }
            Some('l') => {
                if let Some(action) = self.action_for(OperationKind::Locate) {
                    self.commands.push(ScreenCommand::Invoke(action));
                }
                true
            }
            _ if event.code() == KeyCode::Esc && !self.filter.is_empty() => {
                self.filter.clear();
                self.sync_selection();
                true
            }
            _ => false,
        }
    }

    fn take_commands(&mut self) -> Vec<ScreenCommand> {
        std::mem::take(&mut self.commands)
    }

    fn connection(&self) -> OutcomeSummary {
        self.outcome.summary()
    }

    fn status_line(&self) -> String {
        let mut line = self.outcome.summary().status_text();
        if !self.filter.is_empty() {
            line.push_str(&format!(" | filter: {}", self.filter));
        }
        line
    }

    fn scene(&self) -> Result<Vec<ScenePanel>, RenderError> {
        if !self.loaded {
            return Ok(vec![ScenePanel::text("devices", "Devices", loading_lines("devices"))]);
        }
        let visible = self.visible();
        ensure_ids("device", visible.iter().map(|d| d.id.as_str()))?;

        let title = match (&self.editing, self.filter.is_empty()) {
            (Some(_), _) => format!("Devices (filter: {}_)", self.filter),
            (None, false) => format!("Devices (filter: {})", self.filter),
            (None, true) => "Devices".to_string(),
        };
        let table = ScenePanel::table(
            "devices",
            title,
            DEVICE_COLUMNS,
            visible.iter().map(|d| device_row(d)).collect(),
            self.selection.index(),
        )
        .with_status(self.outcome.summary().status_text())
        .focused(self.pane == Pane::Table);

        let detail = match self.selected() {
            Some(device) => Self::detail_lines(device),
            None => vec!["No device selected".to_string()],
        };
        let detail = ScenePanel::text("detail", "Detail", detail).focused(self.pane == Pane::Detail);

        Ok(vec![table, detail])
    }

    fn fallback_lines(&self) -> Vec<String> {
        device_fallback_lines(&self.outcome.data)
    }

    fn key_hints(&self) -> &'static str {
        if self.editing.is_some() {
            "type to filter  Enter/Esc done"
        } else {
            "/ filter  b reboot  l locate  Shift+←/→ panes"
        }
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;

    use fleetdeck_core::types::DeviceStatus;

    use crate::connectivity::ConnectionState;
    use crate::loader::RetryState;

    use super::*;

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            status: DeviceStatus::Online,
            space_id: None,
            model: None,
            last_seen: None,
        }
    }

    fn loaded(devices: Vec<Device>) -> DevicesScreen {
        let mut screen = DevicesScreen::default();
        screen.apply(ScreenData::Devices(LoadOutcome {
            data: devices,
            state: ConnectionState::Connected,
            error: None,
            retry: RetryState { attempts: 1, retried: false },
        }));
        screen
    }

    #[test]
    fn test_vertical_navigation_reports_boundary() {
        let mut screen = loaded(vec![device("d1", "a"), device("d2", "b")]);
        assert_eq!(screen.handle_arrow(ArrowDirection::Up), ArrowResult::Boundary);
        assert_eq!(screen.handle_arrow(ArrowDirection::Down), ArrowResult::Handled);
        assert_eq!(screen.handle_arrow(ArrowDirection::Down), ArrowResult::Boundary);
        assert_eq!(screen.selected().map(|d| d.id.as_str()), Some("d2"));
    }

    #[test]
    fn test_pane_navigation() {
        let mut screen = loaded(vec![device("d1", "a")]);
        assert_eq!(screen.active_pane(), Some("devices"));
        assert_eq!(screen.handle_arrow(ArrowDirection::Left), ArrowResult::Boundary);
        assert_eq!(screen.handle_arrow(ArrowDirection::Right), ArrowResult::Handled);
        assert_eq!(screen.active_pane(), Some("detail"));
        assert_eq!(screen.handle_arrow(ArrowDirection::Right), ArrowResult::Boundary);
    }

    #[test]
    fn test_reboot_requests_confirmation_with_name() {
        let mut screen = loaded(vec![device("d1", "lobby-display")]);
        assert!(screen.handle_key(&InputEvent::char('b')));
        let commands = screen.take_commands();
        match commands.as_slice() {
            [ScreenCommand::Confirm { token, action, .. }] => {
                assert_eq!(token, "lobby-display");
                assert_eq!(action.operation, OperationKind::Reboot);
            }
            other => panic!("unexpected commands {other:?}"),
        }
        assert!(screen.take_commands().is_empty());
    }

    #[test]
    fn test_filter_editing_claims_horizontal_arrows() {
        let mut screen = loaded(vec![device("d1", "lobby"), device("d2", "dock")]);
        assert!(!screen.claims_horizontal_arrows());
        assert!(screen.handle_key(&InputEvent::char('/')));
        assert!(screen.claims_horizontal_arrows());

        for c in "dok".chars() {
            screen.handle_key(&InputEvent::char(c));
        }
        assert_eq!(screen.handle_arrow(ArrowDirection::Left), ArrowResult::Handled);
        screen.handle_key(&InputEvent::char('c'));
        assert_eq!(screen.filter, "dock");
        assert_eq!(screen.handle_arrow(ArrowDirection::Right), ArrowResult::Handled);
        assert_eq!(screen.handle_arrow(ArrowDirection::Right), ArrowResult::Boundary);

        screen.handle_key(&InputEvent::key(KeyCode::Enter));
        assert!(!screen.claims_horizontal_arrows());
        assert_eq!(screen.visible().len(), 1);
        assert_eq!(screen.selected().map(|d| d.id.as_str()), Some("d2"));

        // Esc outside editing clears the filter.
        assert!(screen.handle_key(&InputEvent::key(KeyCode::Esc)));
        assert_eq!(screen.visible().len(), 2);
    }

    #[test]
    fn test_unknown_keys_not_consumed() {
        let mut screen = loaded(vec![device("d1", "a")]);
        assert!(!screen.handle_key(&InputEvent::char('q')));
        assert!(!screen.handle_key(&InputEvent::with_modifiers(
            KeyCode::Char('r'),
            KeyModifiers::CONTROL
        )));
    }

    #[test]
    fn test_selection_survives_refresh() {
        let mut screen = loaded(vec![device("d1", "a"), device("d2", "b")]);
        screen.handle_arrow(ArrowDirection::Down);
        screen.apply(ScreenData::Devices(LoadOutcome {
            data: vec![device("d0", "z"), device("d1", "a"), device("d2", "b")],
            state: ConnectionState::Connected,
            error: None,
            retry: RetryState::default(),
        }));
        assert_eq!(screen.selected().map(|d| d.id.as_str()), Some("d2"));
    }
}
