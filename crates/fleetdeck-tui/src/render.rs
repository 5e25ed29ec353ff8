//! Painting a session view with ratatui.
//!
//! The session takes a [`SessionView`] snapshot under its lock and paints
//! it afterwards, so drawing never blocks input handling.

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::connectivity::ConnectionState;
use crate::modal::Modal;
use crate::runtime::{RefreshState, RefreshStatus};
use crate::scene::{PanelBody, ScenePanel};
use crate::screen::ScreenId;

const ACCENT: Color = Color::Cyan;
const DIM: Color = Color::DarkGray;
const TEXT: Color = Color::White;

/// Everything needed to paint one frame.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub active: ScreenId,
    pub title: String,
    pub status_line: String,
    pub refresh: RefreshStatus,
    pub readiness: ConnectionState,
    pub tenant: String,
    pub logo: String,
    pub panels: Vec<ScenePanel>,
    pub fallback: bool,
    pub key_hints: &'static str,
    pub modal: Option<Modal>,
    pub message: Option<String>,
    pub dropped_events: u64,
}

pub fn draw(frame: &mut Frame, view: &SessionView) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(3),    // Content
            Constraint::Length(2), // Footer
        ])
        .split(area);

    draw_header(frame, chunks[0], view);
    draw_panels(frame, chunks[1], &view.panels);
    draw_footer(frame, chunks[2], view);

    if let Some(modal) = &view.modal {
        draw_modal(frame, area, modal);
    }
}

pub fn state_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::RateLimited | ConnectionState::NotChecked => Color::Yellow,
        _ => Color::Red,
    }
}

fn draw_header(frame: &mut Frame, area: Rect, view: &SessionView) {
    let mut spans = vec![
        Span::styled(
            format!("{} ", view.logo),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
    ];
    for id in ScreenId::ALL {
        let style = if id == view.active {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else {
            Style::default().fg(DIM)
        };
        spans.push(Span::styled(format!(" {} ", id.hotkey_hint()), style));
    }

    let refresh = match view.refresh.state {
        RefreshState::Idle => String::new(),
        RefreshState::Loading => " ⟳ loading".to_string(),
        RefreshState::Retrying => " ⟳ queued".to_string(),
        RefreshState::Error => " ✖ refresh failed".to_string(),
    };

    let right = vec![
        Span::styled(format!("{} ", view.tenant), Style::default().fg(DIM)),
        Span::styled(
            format!("[{}]", view.readiness.label()),
            Style::default().fg(state_color(view.readiness)),
        ),
        Span::styled(refresh, Style::default().fg(Color::Yellow)),
    ];

    let header = Paragraph::new(vec![Line::from(spans), Line::from(right).alignment(Alignment::Right)])
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(DIM)),
        );
    frame.render_widget(header, area);
}

fn draw_panels(frame: &mut Frame, area: Rect, panels: &[ScenePanel]) {
    if panels.is_empty() {
        return;
    }
    let last = panels.len() - 1;
    let constraints: Vec<Constraint> = panels
        .iter()
        .enumerate()
        .map(|(i, panel)| match (&panel.body, i == last) {
            (_, true) => Constraint::Min(3),
            (PanelBody::Stats { .. }, false) => Constraint::Length(3),
            (_, false) => Constraint::Max(panel.content_height() as u16 + 2),
        })
        .collect();
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    for (panel, area) in panels.iter().zip(areas.iter()) {
        draw_panel(frame, *area, panel);
    }
}

fn panel_block(panel: &ScenePanel) -> Block<'_> {
    let (border, title_style) = if panel.focused {
        (
            Style::default().fg(ACCENT),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )
    } else {
        (Style::default().fg(DIM), Style::default().fg(TEXT))
    };
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(Span::styled(format!(" {} ", panel.title), title_style));
    if let Some(status) = &panel.status {
        block = block
            .title_bottom(Line::from(Span::styled(format!(" {status} "), Style::default().fg(DIM))))
            .title_alignment(Alignment::Left);
    }
    block
}

fn draw_panel(frame: &mut Frame, area: Rect, panel: &ScenePanel) {
    let block = panel_block(panel);
    match &panel.body {
        PanelBody::Stats { items } => {
            let mut spans = Vec::with_capacity(items.len() * 3);
            for item in items {
                spans.push(Span::styled(format!("{}: ", item.label), Style::default().fg(DIM)));
                spans.push(Span::styled(
                    item.value.clone(),
                    Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
                ));
                spans.push(Span::raw("   "));
            }
            frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
        }
        PanelBody::Text { lines } => {
            let text: Vec<Line> = lines.iter().map(|l| Line::from(l.as_str())).collect();
            let paragraph = Paragraph::new(text)
                .style(Style::default().fg(TEXT))
                .block(block)
                .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        PanelBody::Table {
            columns,
            rows,
            selected,
        } => {
            let header = Row::new(columns.iter().map(String::as_str))
                .style(Style::default().fg(DIM).add_modifier(Modifier::BOLD));
            let body = rows.iter().map(|row| Row::new(row.iter().map(String::as_str)));
            let widths = vec![Constraint::Fill(1); columns.len().max(1)];
            let table = Table::new(body, widths)
                .header(header)
                .column_spacing(1)
                .block(block)
                .row_highlight_style(Style::default().fg(Color::Black).bg(ACCENT))
                .highlight_symbol("▸ ");
            let mut state = TableState::default().with_selected(*selected);
            frame.render_stateful_widget(table, area, &mut state);
        }
    }
}

fn draw_footer(frame: &mut Frame, area: Rect, view: &SessionView) {
    let hotkey = Style::default().fg(ACCENT);
    let mut spans = vec![
        Span::styled("[q]", hotkey),
        Span::raw("Quit "),
        Span::styled("[r]", hotkey),
        Span::raw("Refresh "),
        Span::styled("[?]", hotkey),
        Span::raw("Help  "),
        Span::styled(view.key_hints, Style::default().fg(DIM)),
    ];
    if view.fallback {
        spans.push(Span::styled("  plain view", Style::default().fg(Color::Yellow)));
    }

    let right = match (&view.message, view.dropped_events) {
        (Some(message), _) => message.clone(),
        (None, 0) => view.status_line.clone(),
        (None, dropped) => format!("{} | {dropped} keys dropped", view.status_line),
    };

    let footer = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(DIM))
            .title(Span::styled(format!(" {right} "), Style::default().fg(DIM)))
            .title_alignment(Alignment::Right),
    );
    frame.render_widget(footer, area);
}

/// Centered rectangle for overlays.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn draw_modal(frame: &mut Frame, area: Rect, modal: &Modal) {
    let lines = modal.lines();
    let overlay = centered(area, 64, lines.len() as u16 + 2);
    frame.render_widget(Clear, overlay);

    let border = match modal {
        Modal::Error { .. } => Color::Red,
        Modal::Confirm(_) => Color::Yellow,
        Modal::Help => ACCENT,
    };
    let text: Vec<Line> = lines.iter().map(|l| Line::from(l.as_str())).collect();
    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(TEXT))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(Span::styled(
                    format!(" {} ", modal.title()),
                    Style::default().fg(border).add_modifier(Modifier::BOLD),
                ))
                .style(Style::default().bg(Color::Black)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, overlay);
}
