//! Draw functions for the dashboard panes.

use super::app::{App, Pane, StatusLevel};
use crate::session::SessionState;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(1)])
        .split(f.area());

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[0]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(content[0]);

    draw_targets(f, app, left[0]);
    draw_sessions(f, app, left[1]);
    draw_logs(f, app, content[1]);
    draw_status_bar(f, app, chunks[1]);
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let border_color = if focused { Color::Cyan } else { Color::Blue };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
}

fn state_icon(state: SessionState) -> (&'static str, Color) {
    match state {
        SessionState::Starting => ("⋯", Color::Yellow),
        SessionState::Running => ("✓", Color::Green),
        SessionState::Stopping => ("⏸", Color::Yellow),
        SessionState::Stopped => ("○", Color::DarkGray),
        SessionState::Error => ("✗", Color::Red),
    }
}

fn draw_targets(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .targets
        .iter()
        .enumerate()
        .map(|(idx, target)| {
            let active = app.target_has_session(&target.key);
            let marker = if active { "●" } else { "○" };
            let marker_color = if active { Color::Green } else { Color::DarkGray };

            let line = Line::from(vec![
                Span::styled(format!(" {} ", marker), Style::default().fg(marker_color)),
                Span::styled(
                    target.key.to_string(),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("  {}:{}", target.env_cfg.remote_host, target.env_cfg.remote_port),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);

            let mut style = Style::default();
            if idx == app.target_selected && app.focused == Pane::Targets {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }

            ListItem::new(line).style(style)
        })
        .collect();

    let block = pane_block(" Targets ".to_string(), app.focused == Pane::Targets);
    f.render_widget(List::new(items).block(block), area);
}

fn draw_sessions(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .sessions
        .iter()
        .enumerate()
        .map(|(idx, session)| {
            let (icon, color) = state_icon(session.state);

            let line = Line::from(vec![
                Span::styled(format!(" {} ", icon), Style::default().fg(color)),
                Span::styled(
                    format!("{:<20}", session.key.to_string()),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!("{:<22}", session.endpoint()),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    format!("{:<9}", session.state.to_string()),
                    Style::default().fg(color),
                ),
                Span::styled(
                    session.uptime_display(),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);

            let mut style = Style::default();
            if idx == app.session_selected && app.focused == Pane::Sessions {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }

            ListItem::new(line).style(style)
        })
        .collect();

    let block = pane_block(
        format!(" Sessions ({}) ", app.sessions.len()),
        app.focused == Pane::Sessions,
    );
    f.render_widget(List::new(items).block(block), area);
}

fn draw_logs(f: &mut Frame, app: &App, area: Rect) {
    let follow_status = if app.follow_logs {
        "[FOLLOWING]"
    } else {
        "[PAUSED]"
    };
    let title = match &app.log_key {
        Some(key) => format!(" Logs: {} {} ", key, follow_status),
        None => " Logs ".to_string(),
    };

    let visible = area.height.saturating_sub(2) as usize;
    let total = app.log_lines.len();

    // log_scroll is the offset from the bottom; 0 pins the newest line.
    let end = total.saturating_sub(app.log_scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = app
        .log_lines
        .iter()
        .skip(start)
        .take(end - start)
        .map(|l| Line::from(Span::raw(l.as_str())))
        .collect();

    let block = pane_block(title, app.focused == Pane::Logs);
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    if let Some(ref msg) = app.status {
        let color = match msg.level {
            StatusLevel::Info => Color::Blue,
            StatusLevel::Success => Color::Green,
            StatusLevel::Warning => Color::Yellow,
            StatusLevel::Error => Color::Red,
        };

        let paragraph = Paragraph::new(msg.text.as_str()).style(
            Style::default()
                .fg(color)
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        );
        f.render_widget(paragraph, area);
        return;
    }

    let shortcuts = vec![
        Span::styled("[tab]", Style::default().fg(Color::Cyan)),
        Span::raw(" focus "),
        Span::styled("[j/k]", Style::default().fg(Color::Cyan)),
        Span::raw(" move "),
        Span::styled("[c]", Style::default().fg(Color::Cyan)),
        Span::raw("onnect "),
        Span::styled("[s]", Style::default().fg(Color::Cyan)),
        Span::raw("top "),
        Span::styled("[S]", Style::default().fg(Color::Cyan)),
        Span::raw(" stop-all "),
        Span::styled("[l]", Style::default().fg(Color::Cyan)),
        Span::raw(" follow "),
        Span::styled("[q]", Style::default().fg(Color::Cyan)),
        Span::raw("uit"),
    ];

    let paragraph =
        Paragraph::new(Line::from(shortcuts)).style(Style::default().bg(Color::DarkGray));
    f.render_widget(paragraph, area);
}
