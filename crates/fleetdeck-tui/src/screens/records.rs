//! Incident and ticket lists.
//!
//! Both screens are the same table over a different record type, so they
//! share [`RecordScreen`] and differ only in their [`ListRecord`] impl.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use fleetdeck_api::{ApiError, FleetApi};
use fleetdeck_core::types::{Incident, Ticket};

use crate::dispatch::{ArrowDirection, ArrowResult};
use crate::input::InputEvent;
use crate::loader::{LoadOutcome, OutcomeSummary};
use crate::scene::{RenderError, ScenePanel, StatItem};
use crate::screen::{Screen, ScreenData, ScreenId};
use crate::selection::{ListSelection, SelectionOrigin};
use crate::session::SessionContext;

use super::{ensure_ids, fetch_list, loading_lines};

/// A record type shown by [`RecordScreen`].
pub trait ListRecord: Clone + Send + Sync + 'static {
    const SCREEN: ScreenId;
    const LABEL: &'static str;
    const COLUMNS: &'static [&'static str];

    fn record_id(&self) -> &str;
    fn raw_status(&self) -> &str;
    fn is_open(&self) -> bool;
    fn cells(&self) -> Vec<String>;
    fn detail(&self) -> Vec<String>;

    fn fetch(api: Arc<dyn FleetApi>, tenant: String) -> BoxFuture<'static, Result<Vec<Self>, ApiError>>;
    fn wrap(outcome: LoadOutcome<Vec<Self>>) -> ScreenData;
    fn unwrap(data: ScreenData) -> Option<LoadOutcome<Vec<Self>>>;
}

impl ListRecord for Incident {
    const SCREEN: ScreenId = ScreenId::Incidents;
    const LABEL: &'static str = "incidents";
    const COLUMNS: &'static [&'static str] = &["ID", "Severity", "State", "Title", "Device"];

    fn record_id(&self) -> &str {
        &self.id
    }

    fn raw_status(&self) -> &str {
        &self.state
    }

    fn is_open(&self) -> bool {
        Incident::is_open(self)
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.severity.clone(),
            self.state.clone(),
            self.title.clone(),
            self.device_id.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }

    fn detail(&self) -> Vec<String> {
        vec![
            format!("{} [{}] {}", self.id, self.severity, self.title),
            format!(
                "Opened: {}",
                self.opened_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "-".to_string())
            ),
        ]
    }

    fn fetch(api: Arc<dyn FleetApi>, tenant: String) -> BoxFuture<'static, Result<Vec<Self>, ApiError>> {
        async move { api.list_incidents(&tenant).await }.boxed()
    }

    fn wrap(outcome: LoadOutcome<Vec<Self>>) -> ScreenData {
        ScreenData::Incidents(outcome)
    }

    fn unwrap(data: ScreenData) -> Option<LoadOutcome<Vec<Self>>> {
        match data {
            ScreenData::Incidents(outcome) => Some(outcome),
            _ => None,
        }
    }
}

impl ListRecord for Ticket {
    const SCREEN: ScreenId = ScreenId::Tickets;
    const LABEL: &'static str = "tickets";
    const COLUMNS: &'static [&'static str] = &["ID", "Priority", "Status", "Subject", "Assignee"];

    fn record_id(&self) -> &str {
        &self.id
    }

    fn raw_status(&self) -> &str {
        &self.status
    }

    fn is_open(&self) -> bool {
        Ticket::is_open(self)
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.priority.clone(),
            self.status.clone(),
            self.subject.clone(),
            self.assignee.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }

    fn detail(&self) -> Vec<String> {
        vec![
            format!("{} ({})", self.id, self.priority),
            self.subject.clone(),
        ]
    }

    fn fetch(api: Arc<dyn FleetApi>, tenant: String) -> BoxFuture<'static, Result<Vec<Self>, ApiError>> {
        async move { api.list_tickets(&tenant).await }.boxed()
    }

    fn wrap(outcome: LoadOutcome<Vec<Self>>) -> ScreenData {
        ScreenData::Tickets(outcome)
    }

    fn unwrap(data: ScreenData) -> Option<LoadOutcome<Vec<Self>>> {
        match data {
            ScreenData::Tickets(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Table of records with an open-only toggle (`a`).
#[derive(Debug)]
pub struct RecordScreen<R> {
    outcome: LoadOutcome<Vec<R>>,
    loaded: bool,
    selection: ListSelection,
    show_all: bool,
}

pub type IncidentsScreen = RecordScreen<Incident>;
pub type TicketsScreen = RecordScreen<Ticket>;

impl<R: ListRecord> Default for RecordScreen<R> {
    fn default() -> Self {
        Self {
            outcome: LoadOutcome::pending(Vec::new()),
            loaded: false,
            selection: ListSelection::default(),
            show_all: false,
        }
    }
}

impl<R: ListRecord> RecordScreen<R> {
    fn visible(&self) -> Vec<&R> {
        self.outcome
            .data
            .iter()
            .filter(|r| self.show_all || r.is_open())
            .collect()
    }

    fn sync_selection(&mut self) {
        let len = self.visible().len();
        self.selection.set_len(len);
    }
}

impl<R: ListRecord> Screen for RecordScreen<R> {
    fn id(&self) -> ScreenId {
        R::SCREEN
    }

    fn refresh_job(&self, ctx: &SessionContext) -> BoxFuture<'static, ScreenData> {
        fetch_list(ctx, R::LABEL, R::fetch).map(R::wrap).boxed()
    }

    fn apply(&mut self, data: ScreenData) {
        if let Some(outcome) = R::unwrap(data) {
            self.outcome = outcome;
            self.loaded = true;
            self.sync_selection();
        }
    }

    fn has_arrow_handler(&self) -> bool {
        true
    }

    fn handle_arrow(&mut self, direction: ArrowDirection) -> ArrowResult {
        let delta = match direction {
            ArrowDirection::Up => -1,
            ArrowDirection::Down => 1,
            ArrowDirection::Left | ArrowDirection::Right => return ArrowResult::Unhandled,
        };
        match self.selection.move_by(delta, SelectionOrigin::User) {
            Some(_) => ArrowResult::Handled,
            None => ArrowResult::Boundary,
        }
    }

    fn has_key_handler(&self) -> bool {
        true
    }

    fn handle_key(&mut self, event: &InputEvent) -> bool {
        if event.character() == Some('a') {
            self.show_all = !self.show_all;
            self.sync_selection();
            return true;
        }
        false
    }

    fn connection(&self) -> OutcomeSummary {
        self.outcome.summary()
    }

    fn scene(&self) -> Result<Vec<ScenePanel>, RenderError> {
        if !self.loaded {
            return Ok(vec![ScenePanel::text(R::LABEL, R::SCREEN.title(), loading_lines(R::LABEL))]);
        }
        let visible = self.visible();
        ensure_ids(R::LABEL, visible.iter().map(|r| r.record_id()))?;

        let open = self.outcome.data.iter().filter(|r| r.is_open()).count();
        let counts = ScenePanel::stats(
            "counts",
            "Summary",
            vec![
                StatItem::new("Open", open),
                StatItem::new("Total", self.outcome.data.len()),
            ],
        );

        let title = if self.show_all {
            format!("All {}", R::LABEL)
        } else {
            format!("Open {}", R::LABEL)
        };
        let table = ScenePanel::table(
            R::LABEL,
            title,
            R::COLUMNS,
            visible.iter().map(|r| r.cells()).collect(),
            self.selection.index(),
        )
        .with_status(self.outcome.summary().status_text())
        .focused(true);

        let mut panels = vec![counts, table];
        if let Some(record) = self.selection.index().and_then(|i| visible.get(i)) {
            panels.push(ScenePanel::text("detail", "Detail", record.detail()));
        }
        Ok(panels)
    }

    fn fallback_lines(&self) -> Vec<String> {
        self.outcome
            .data
            .iter()
            .map(|r| format!("{} {}", r.record_id(), r.raw_status()))
            .collect()
    }

    fn key_hints(&self) -> &'static str {
        "↑/↓ select  a toggle open/all"
    }
}

#[cfg(test)]
mod tests {
    use fleetdeck_api::{Resource, ScriptedFleetApi};
    use fleetdeck_core::TuiConfig;

    use crate::connectivity::ConnectionState;
    use crate::loader::{RetryPolicy, RetryingLoader};
    use crate::scene::PanelBody;

    use super::*;

    fn ticket(id: &str, status: &str) -> Ticket {
        Ticket {
            id: id.into(),
            subject: format!("subject {id}"),
            status: status.into(),
            priority: "normal".into(),
            assignee: None,
        }
    }

    #[tokio::test]
    async fn test_incidents_load_through_api() {
        let api = ScriptedFleetApi::demo();
        let ctx = SessionContext::new(Arc::new(api), None, TuiConfig::default());
        let mut screen = IncidentsScreen::default();
        let data = screen.refresh_job(&ctx).await;
        screen.apply(data);

        assert_eq!(screen.connection().state, ConnectionState::Connected);
        let panels = screen.scene().unwrap();
        match &panels[1].body {
            PanelBody::Table { rows, .. } => assert_eq!(rows[0][0], "inc-17"),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_failure_shows_fallback_data() {
        let api = ScriptedFleetApi::demo();
        api.fail_next(Resource::Tickets, ApiError::Validation("bad filter".into()));
        let ctx = SessionContext::new(Arc::new(api), None, TuiConfig::default()).with_loader(
            RetryingLoader::new(RetryPolicy::no_retry()),
        );
        let mut screen = TicketsScreen::default();
        let data = screen.refresh_job(&ctx).await;
        screen.apply(data);

        assert_eq!(screen.connection().state, ConnectionState::UnknownError);
        assert!(screen.scene().is_ok());
        assert!(screen.fallback_lines().is_empty());
    }

    #[test]
    fn test_toggle_closed_records() {
        let mut screen = TicketsScreen::default();
        screen.apply(ScreenData::Tickets(LoadOutcome::pending(vec![
            ticket("t1", "open"),
            ticket("t2", "closed"),
        ])));
        assert_eq!(screen.visible().len(), 1);
        assert!(screen.handle_key(&InputEvent::char('a')));
        assert_eq!(screen.visible().len(), 2);
        assert_eq!(screen.handle_arrow(ArrowDirection::Down), ArrowResult::Handled);
        assert_eq!(screen.handle_arrow(ArrowDirection::Left), ArrowResult::Unhandled);
        assert_eq!(screen.fallback_lines(), vec!["t1 open", "t2 closed"]);
    }

    #[test]
    fn test_ignores_other_payloads() {
        let mut screen = TicketsScreen::default();
        screen.apply(ScreenData::Incidents(LoadOutcome::pending(Vec::new())));
        assert!(!screen.loaded);
    }
}
