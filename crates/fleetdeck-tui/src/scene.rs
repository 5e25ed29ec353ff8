//! Renderer-neutral screen content.
//!
//! Screens describe what they show as a list of [`ScenePanel`]s. The
//! interactive session paints them with ratatui and headless mode
//! serializes them into frames, so both outputs stay in step.

use serde::Serialize;
use thiserror::Error;

/// A screen could not turn its data into panels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One labelled value in a stats panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatItem {
    pub label: String,
    pub value: String,
}

impl StatItem {
    pub fn new(label: impl Into<String>, value: impl ToString) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
        }
    }
}

/// Panel content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PanelBody {
    Stats {
        items: Vec<StatItem>,
    },
    Text {
        lines: Vec<String>,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        selected: Option<usize>,
    },
}

/// A titled block of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenePanel {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub body: PanelBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Has keyboard focus (interactive only)
    #[serde(skip)]
    pub focused: bool,
}

impl ScenePanel {
    fn new(id: &str, title: impl Into<String>, body: PanelBody) -> Self {
        Self {
            id: id.to_string(),
            title: title.into(),
            body,
            status: None,
            focused: false,
        }
    }

    pub fn stats(id: &str, title: impl Into<String>, items: Vec<StatItem>) -> Self {
        Self::new(id, title, PanelBody::Stats { items })
    }

    pub fn text(id: &str, title: impl Into<String>, lines: Vec<String>) -> Self {
        Self::new(id, title, PanelBody::Text { lines })
    }

    pub fn table(
        id: &str,
        title: impl Into<String>,
        columns: &[&str],
        rows: Vec<Vec<String>>,
        selected: Option<usize>,
    ) -> Self {
        Self::new(
            id,
            title,
            PanelBody::Table {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
                selected,
            },
        )
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    /// Number of content lines, used for layout.
    pub fn content_height(&self) -> usize {
        match &self.body {
            PanelBody::Stats { items } => items.len(),
            PanelBody::Text { lines } => lines.len(),
            PanelBody::Table { rows, .. } => rows.len() + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_serializes_flat_with_kind() {
        let panel = ScenePanel::table(
            "devices",
            "Devices",
            &["ID", "Name"],
            vec![vec!["dev-1".into(), "lobby".into()]],
            Some(0),
        )
        .with_status("Connected");

        let value = serde_json::to_value(&panel).unwrap();
        assert_eq!(value["kind"], "table");
        assert_eq!(value["id"], "devices");
        assert_eq!(value["columns"][1], "Name");
        assert_eq!(value["rows"][0][0], "dev-1");
        assert_eq!(value["selected"], 0);
        assert_eq!(value["status"], "Connected");
        assert!(value.get("focused").is_none());
    }

    #[test]
    fn test_stats_and_text_kinds() {
        let stats = ScenePanel::stats("summary", "Summary", vec![StatItem::new("Online", 3)]);
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["kind"], "stats");
        assert_eq!(value["items"][0]["value"], "3");
        assert!(value.get("status").is_none());

        let text = ScenePanel::text("help", "Help", vec!["q quit".into()]);
        assert_eq!(serde_json::to_value(&text).unwrap()["kind"], "text");
        assert_eq!(text.content_height(), 1);
    }
}
