use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use watchtower::app::{App, FocusPanel};
use watchtower::format::iso_timestamp;

use super::colors;

/// Raw fields of the selected event.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let border_style = if app.focus == FocusPanel::Detail {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let block = Block::default()
        .title(" Event ")
        .borders(Borders::ALL)
        .border_style(border_style);

    let Some(event) = app.selected_event() else {
        let hint = if app.events.is_empty() {
            "  No events yet"
        } else {
            "  Select an event to inspect it"
        };
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
                .block(block),
            area,
        );
        return;
    };

    let kind = event.kind();
    let mut lines = vec![Line::from(vec![
        Span::styled(
            format!(" {} ", kind.as_str()),
            Style::default().fg(colors::kind_color(kind, app.theme)),
        ),
        Span::styled(iso_timestamp(event.timestamp), Style::default().fg(Color::DarkGray)),
    ])];

    let fields = serde_json::to_value(event)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    for (key, value) in fields {
        if matches!(key.as_str(), "type" | "timestamp") {
            continue;
        }
        let rendered = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" {key}: "), Style::default().fg(colors::ACCENT_MUTED)),
            Span::raw(rendered),
        ]));
    }

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use watchtower::app::Source;
    use watchtower::config::Config;
    use watchtower::trace::parse_trace_reader;

    fn buffer_text(backend: &TestBackend) -> String {
        let buf = backend.buffer();
        (0..buf.area.height)
            .map(|y| (0..buf.area.width).map(|x| buf[(x, y)].symbol().to_string()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn render_empty_hint() {
        let app = App::new(Source::File(PathBuf::from("t.jsonl")), &Config::default());
        let backend = TestBackend::new(60, 6);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &app, f.area())).unwrap();
        assert!(buffer_text(terminal.backend()).contains("No events yet"));
    }

    #[test]
    fn render_selected_event_fields() {
        let trace = r#"{"type":"tool.start","run_id":"r1","timestamp":0,"tool_name":"search","tool_args":{"q":"rust"}}"#;
        let mut app = App::new(Source::File(PathBuf::from("t.jsonl")), &Config::default());
        app.load_trace(parse_trace_reader(trace.as_bytes()).unwrap());

        let backend = TestBackend::new(60, 8);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| render(f, &app, f.area())).unwrap();

        let text = buffer_text(terminal.backend());
        assert!(text.contains("tool.start"));
        assert!(text.contains("1970-01-01T00:00:00.000Z"));
        assert!(text.contains("tool_name: search"));
        assert!(text.contains(r#"tool_args: {"q":"rust"}"#));
    }
}
