pub mod colors;
pub mod detail;
pub mod stats;
pub mod timeline;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use watchtower::app::{App, Source};

pub fn render(f: &mut Frame, app: &App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),   // top: timeline + summary
            Constraint::Length(9), // bottom: selected event
            Constraint::Length(1), // status bar
        ])
        .split(f.area());

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(62), // timeline
            Constraint::Percentage(38), // summary
        ])
        .split(outer[0]);

    timeline::render(f, app, top[0]);
    stats::render(f, app, top[1]);
    detail::render(f, app, outer[1]);
    render_status_bar(f, app, outer[2]);
}

fn key_hint(key: &'static str, label: &'static str) -> [Span<'static>; 2] {
    [
        Span::styled(key, Style::default().fg(Color::DarkGray)),
        Span::raw(label),
    ]
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let status = if app.search_mode {
        let mut spans = vec![
            Span::styled(" /", Style::default().fg(Color::Yellow)),
            Span::raw(app.filter_query.as_str()),
            Span::styled("_", Style::default().fg(Color::Yellow)),
        ];
        if !app.suggestions.is_empty() {
            spans.push(Span::styled(
                format!("   [tab] {}", app.suggestions.join("  ")),
                Style::default().fg(Color::Gray),
            ));
        }
        Line::from(spans)
    } else if let Some(notice) = &app.notice {
        Line::from(Span::styled(format!(" {notice}"), Style::default().fg(Color::Yellow)))
    } else {
        let mut spans = vec![Span::raw(" ")];
        spans.extend(key_hint("[q]", "uit "));
        spans.extend(key_hint("[j/k]", "nav "));
        spans.extend(key_hint("[/]", "filter "));
        spans.extend(key_hint("[t]", "ime "));
        spans.extend(key_hint("[e]", "xport "));
        spans.extend(key_hint("[tab]", "focus "));
        if matches!(app.source, Source::Live { .. }) {
            spans.extend(key_hint("[p]", "ause "));
            spans.extend(key_hint("[s]", "top "));
        }
        if !app.filter_query.is_empty() {
            spans.push(Span::styled(
                format!(" filter: {}", app.filter_query),
                Style::default().fg(Color::Yellow),
            ));
        }
        Line::from(spans)
    };

    f.render_widget(
        Paragraph::new(status).style(Style::default().bg(Color::DarkGray).fg(Color::White)),
        area,
    );
}
