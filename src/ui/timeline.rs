use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use ratatui::Frame;

use watchtower::app::{App, FocusPanel, TimelineRow};
use watchtower::format::format_timestamp;
use watchtower::trace::TraceEvent;

use super::colors;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let border_style = if app.focus == FocusPanel::Timeline {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let title = if app.filter_query.is_empty() {
        format!(" Timeline ({}) ", app.events.len())
    } else {
        format!(" Timeline ({}/{}) ", app.matched, app.events.len())
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);

    let reference = app.reference_timestamp();
    let grouped = app.analysis.has_multiple_agents;
    let in_flight = app.in_flight_index();

    let items: Vec<ListItem> = app
        .rows
        .iter()
        .map(|row| match row {
            TimelineRow::Header { agent_name, events } => ListItem::new(Line::from(vec![
                Span::styled("▼ ", Style::default().fg(Color::DarkGray)),
                Span::styled(
                    agent_name.as_str(),
                    Style::default()
                        .fg(colors::ACCENT_MUTED)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("  ({events})"), Style::default().fg(Color::DarkGray)),
            ])),
            TimelineRow::Transfer {
                from_agent,
                to_agent,
                ..
            } => ListItem::new(Line::from(vec![Span::styled(
                format!("  ⇢ {from_agent} → {to_agent}"),
                Style::default().fg(colors::KIND_TRANSFER),
            )])),
            TimelineRow::Event(index) => match app.events.get(*index) {
                Some(event) if in_flight == Some(*index) => {
                    ListItem::new(in_flight_line(app, event, reference, grouped))
                }
                Some(event) => ListItem::new(event_line(app, event, reference, grouped)),
                None => ListItem::new(Line::from("")),
            },
        })
        .collect();

    let mut state = ListState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.selected_index));
    }

    let (bg, fg) = colors::highlight(app.theme);
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(bg).fg(fg).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(list, area, &mut state);
}

fn event_line<'a>(app: &App, event: &'a TraceEvent, reference: f64, grouped: bool) -> Line<'a> {
    let indent = if grouped { "  " } else { "" };
    let kind = event.kind();
    Line::from(vec![
        Span::raw(indent),
        Span::styled(
            format!("{:>10} ", format_timestamp(event.timestamp, app.timestamp_format, reference)),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{:<15}", kind.as_str()),
            Style::default().fg(colors::kind_color(kind, app.theme)),
        ),
        Span::raw(event.detail()),
    ])
}

/// The newest live event, still waiting for its successor.
fn in_flight_line<'a>(app: &App, event: &'a TraceEvent, reference: f64, grouped: bool) -> Line<'a> {
    let mut line = event_line(app, event, reference, grouped);
    if let Some(stamp) = line.spans.get_mut(1) {
        stamp.style = Style::default().fg(Color::Yellow);
    }
    line.spans.push(Span::styled(
        format!("  {} running", SPINNER[app.spinner_frame % SPINNER.len()]),
        Style::default().fg(Color::Yellow),
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use watchtower::app::Source;
    use watchtower::config::Config;
    use watchtower::live::{LiveMessage, ProcessStatus};
    use watchtower::trace::parse_trace_reader;

    const TRACE: &str = r#"{"type":"run.start","run_id":"r","timestamp":1,"agent_name":"planner"}
{"type":"tool.error","run_id":"r","timestamp":2,"tool_name":"search","error_type":"Timeout"}
{"type":"agent.transfer","run_id":"r","timestamp":3,"from_agent":"planner","to_agent":"coder"}
{"type":"run.end","run_id":"r","timestamp":4}
"#;

    fn test_app() -> App {
        let mut app = App::new(Source::File(PathBuf::from("t.jsonl")), &Config::default());
        app.load_trace(parse_trace_reader(TRACE.as_bytes()).unwrap());
        app
    }

    fn row_text(backend: &TestBackend, row: u16) -> String {
        let buf = backend.buffer();
        (0..buf.area.width).map(|x| buf[(x, row)].symbol().to_string()).collect()
    }

    /// Find the foreground color of the first cell in `row` that contains part of `text`.
    fn fg_color_of(backend: &TestBackend, row: u16, text: &str) -> Option<Color> {
        let row_str = row_text(backend, row);
        let col = row_str.find(text)?;
        let col = row_str[..col].chars().count() as u16;
        Some(backend.buffer()[(col, row)].fg)
    }

    #[test]
    fn render_groups_by_agent() {
        let app = test_app();
        let backend = TestBackend::new(70, 10);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &app, f.area())).unwrap();

        assert!(row_text(terminal.backend(), 0).contains("Timeline (4)"));
        assert!(row_text(terminal.backend(), 1).contains("planner"));
        assert!(row_text(terminal.backend(), 3).contains("search: Timeout"));
        assert!(row_text(terminal.backend(), 4).contains("planner → coder"));
        assert!(row_text(terminal.backend(), 5).contains("coder"));
    }

    #[test]
    fn render_colors_errors() {
        let app = test_app();
        let backend = TestBackend::new(70, 10);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &app, f.area())).unwrap();

        let color = fg_color_of(terminal.backend(), 3, "tool.error").unwrap();
        assert_eq!(color, colors::KIND_ERROR);
    }

    #[test]
    fn title_shows_match_count_when_filtered() {
        let mut app = test_app();
        app.filter_query = "error".into();
        app.rebuild_rows();
        let backend = TestBackend::new(70, 10);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &app, f.area())).unwrap();
        assert!(row_text(terminal.backend(), 0).contains("Timeline (1/4)"));
    }

    fn live_app() -> App {
        let mut app = App::live("agent.py".into(), None, &Config::default());
        app.apply_live(LiveMessage::Status { status: ProcessStatus::Running, error: None });
        for event in parse_trace_reader(TRACE.as_bytes()).unwrap().events {
            app.apply_live(LiveMessage::Event(event));
        }
        app.refresh();
        app
    }

    #[test]
    fn render_marks_in_flight_live_event() {
        let mut app = live_app();
        app.tick();
        // Keep the highlight off the rows under test.
        app.selected_index = 0;
        let backend = TestBackend::new(70, 10);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &app, f.area())).unwrap();

        let last = row_text(terminal.backend(), 6);
        assert!(last.contains("run.end"));
        assert!(last.contains("⠙ running"));
        assert_eq!(fg_color_of(terminal.backend(), 6, "+3000ms"), Some(Color::Yellow));

        let settled = row_text(terminal.backend(), 3);
        assert!(settled.contains("search: Timeout"));
        assert!(!settled.contains("running"));
        assert_eq!(fg_color_of(terminal.backend(), 3, "+1000ms"), Some(Color::DarkGray));
    }

    #[test]
    fn render_settles_last_event_after_exit() {
        let mut app = live_app();
        app.apply_live(LiveMessage::Status { status: ProcessStatus::Stopped, error: None });
        let backend = TestBackend::new(70, 10);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &app, f.area())).unwrap();

        assert!(!row_text(terminal.backend(), 6).contains("running"));
    }
}
