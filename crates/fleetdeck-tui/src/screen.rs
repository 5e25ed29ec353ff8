//! Screen identifiers and the screen contract.
//!
//! Screens own their data and cursor state and describe their content as
//! scene panels. They never talk to the terminal, and their refresh jobs
//! never borrow them, so a screen can be unmounted while a load is still
//! running.

use std::fmt;
use std::str::FromStr;

use futures_util::future::BoxFuture;
use serde::Serialize;

use fleetdeck_core::types::{Device, Incident, OperationKind, Space, Ticket};

use crate::dispatch::{ArrowDirection, ArrowResult};
use crate::error::TuiError;
use crate::input::InputEvent;
use crate::loader::{LoadOutcome, OutcomeSummary};
use crate::runtime::RefreshPayload;
use crate::scene::{RenderError, ScenePanel};
use crate::session::SessionContext;

/// Available screens, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenId {
    /// Fleet summary across devices, incidents and tickets
    #[default]
    Dashboard,
    /// Device table with detail pane and remote operations
    Devices,
    /// Space hierarchy with device drill-down
    Spaces,
    /// Open and recent incidents
    Incidents,
    /// Support tickets
    Tickets,
}

impl ScreenId {
    /// All screens in display order (for Tab cycling).
    pub const ALL: [ScreenId; 5] = [
        ScreenId::Dashboard,
        ScreenId::Devices,
        ScreenId::Spaces,
        ScreenId::Incidents,
        ScreenId::Tickets,
    ];

    pub fn hotkey(&self) -> char {
        match self {
            ScreenId::Dashboard => '1',
            ScreenId::Devices => '2',
            ScreenId::Spaces => '3',
            ScreenId::Incidents => '4',
            ScreenId::Tickets => '5',
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ScreenId::Dashboard => "Dashboard",
            ScreenId::Devices => "Devices",
            ScreenId::Spaces => "Spaces",
            ScreenId::Incidents => "Incidents",
            ScreenId::Tickets => "Tickets",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenId::Dashboard => "dashboard",
            ScreenId::Devices => "devices",
            ScreenId::Spaces => "spaces",
            ScreenId::Incidents => "incidents",
            ScreenId::Tickets => "tickets",
        }
    }

    /// Tab bar label, e.g. "[2] Devices".
    pub fn hotkey_hint(&self) -> String {
        format!("[{}] {}", self.hotkey(), self.title())
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn next(&self) -> ScreenId {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(&self) -> ScreenId {
        let idx = self.index();
        if idx == 0 {
            Self::ALL[Self::ALL.len() - 1]
        } else {
            Self::ALL[idx - 1]
        }
    }

    pub fn from_hotkey(key: char) -> Option<ScreenId> {
        Self::ALL.into_iter().find(|s| s.hotkey() == key)
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for ScreenId {
    type Err = TuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted || (wanted.len() == 1 && wanted.starts_with(id.hotkey())))
            .ok_or_else(|| TuiError::UnknownScreen(s.to_string()))
    }
}

/// Everything the dashboard loads in one refresh.
#[derive(Debug, Clone)]
pub struct DashboardData {
    pub devices: LoadOutcome<Vec<Device>>,
    pub incidents: LoadOutcome<Vec<Incident>>,
    pub tickets: LoadOutcome<Vec<Ticket>>,
}

impl DashboardData {
    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary::aggregate([
            &self.devices.summary(),
            &self.incidents.summary(),
            &self.tickets.summary(),
        ])
    }
}

/// Result of a screen's refresh job or drill-down load.
#[derive(Debug, Clone)]
pub enum ScreenData {
    Dashboard(Box<DashboardData>),
    Devices(LoadOutcome<Vec<Device>>),
    Spaces(LoadOutcome<Vec<Space>>),
    SpaceDevices {
        space_id: String,
        outcome: LoadOutcome<Vec<Device>>,
    },
    Incidents(LoadOutcome<Vec<Incident>>),
    Tickets(LoadOutcome<Vec<Ticket>>),
}

impl ScreenData {
    /// Connection status of the payload.
    pub fn summary(&self) -> OutcomeSummary {
        match self {
            ScreenData::Dashboard(data) => data.summary(),
            ScreenData::Devices(o) => o.summary(),
            ScreenData::Spaces(o) => o.summary(),
            ScreenData::SpaceDevices { outcome, .. } => outcome.summary(),
            ScreenData::Incidents(o) => o.summary(),
            ScreenData::Tickets(o) => o.summary(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScreenData::Dashboard(_) => "dashboard",
            ScreenData::Devices(_) => "devices",
            ScreenData::Spaces(_) => "spaces",
            ScreenData::SpaceDevices { .. } => "space_devices",
            ScreenData::Incidents(_) => "incidents",
            ScreenData::Tickets(_) => "tickets",
        }
    }
}

impl RefreshPayload for ScreenData {
    fn refresh_error(&self) -> Option<String> {
        self.summary().error.map(|e| e.to_string())
    }
}

/// A remote operation on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAction {
    pub device_id: String,
    pub device_name: String,
    pub operation: OperationKind,
}

/// Work a screen asks the session to do after handling input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenCommand {
    /// Refresh this screen
    Refresh,
    /// Load the devices of a space (drill-down)
    LoadSpaceDevices(String),
    /// Ask for typed confirmation, then run the action
    Confirm {
        title: String,
        prompt: String,
        token: String,
        action: DeviceAction,
    },
    /// Run a non-destructive action right away
    Invoke(DeviceAction),
}

/// Contract every screen implements.
pub trait Screen: Send {
    fn id(&self) -> ScreenId;

    fn title(&self) -> String {
        self.id().title().to_string()
    }

    /// Called when the screen becomes active.
    fn mount(&mut self) {}

    /// Called when the screen stops being active.
    fn unmount(&mut self) {}

    /// Called after mount, once the screen has keyboard focus.
    fn focus(&mut self) {}

    /// Future that loads this screen's data. Must not borrow the screen.
    fn refresh_job(&self, ctx: &SessionContext) -> BoxFuture<'static, ScreenData>;

    /// Take loaded data.
    fn apply(&mut self, data: ScreenData);

    /// Focusable panes, in arrow order.
    fn available_panes(&self) -> &'static [&'static str] {
        &[]
    }

    fn active_pane(&self) -> Option<&'static str> {
        None
    }

    fn has_arrow_handler(&self) -> bool {
        false
    }

    fn handle_arrow(&mut self, _direction: ArrowDirection) -> ArrowResult {
        ArrowResult::Unhandled
    }

    /// Whether plain Left/Right belong to the screen right now.
    fn claims_horizontal_arrows(&self) -> bool {
        false
    }

    fn has_key_handler(&self) -> bool {
        false
    }

    /// Returns true when the key was consumed.
    fn handle_key(&mut self, _event: &InputEvent) -> bool {
        false
    }

    /// Commands produced by the last input.
    fn take_commands(&mut self) -> Vec<ScreenCommand> {
        Vec::new()
    }

    /// Connection status of the data on screen.
    fn connection(&self) -> OutcomeSummary;

    /// One-line status for the header.
    fn status_line(&self) -> String {
        self.connection().status_text()
    }

    fn scene(&self) -> Result<Vec<ScenePanel>, RenderError>;

    /// Plain lines shown when rich rendering keeps failing. Must not depend
    /// on anything that can make [`Screen::scene`] fail.
    fn fallback_lines(&self) -> Vec<String>;

    /// Keys shown in the footer.
    fn key_hints(&self) -> &'static str {
        ""
    }
}

/// Create the screen for `id`.
pub fn create(id: ScreenId) -> Box<dyn Screen> {
    use crate::screens::{DashboardScreen, DevicesScreen, IncidentsScreen, SpacesScreen, TicketsScreen};
    match id {
        ScreenId::Dashboard => Box::new(DashboardScreen::default()),
        ScreenId::Devices => Box::new(DevicesScreen::default()),
        ScreenId::Spaces => Box::new(SpacesScreen::default()),
        ScreenId::Incidents => Box::new(IncidentsScreen::default()),
        ScreenId::Tickets => Box::new(TicketsScreen::default()),
    }
}
