use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use watchtower::app::{App, FocusPanel};
use watchtower::format::{format_duration, format_tokens};

use super::colors;

pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let border_style = if app.focus == FocusPanel::Stats {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let block = Block::default()
        .title(" Summary ")
        .borders(Borders::ALL)
        .border_style(border_style);

    let mut lines = vec![Line::from("")];

    match &app.live {
        Some(live) => {
            lines.push(Line::from(vec![
                Span::raw("  Status: "),
                Span::styled(
                    live.status.to_string(),
                    Style::default()
                        .fg(colors::status_color(live.status))
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    if live.paused { "  (paused)" } else { "" },
                    Style::default().fg(Color::Yellow),
                ),
            ]));
            if let Some(err) = &live.error {
                lines.push(Line::from(Span::styled(
                    format!("  {err}"),
                    Style::default().fg(colors::STATUS_ERROR),
                )));
            }
            if let Some(session) = &live.session {
                lines.push(Line::from(vec![
                    Span::raw("  Run: "),
                    Span::styled(session.run_id().to_string(), Style::default().fg(colors::ACCENT_MUTED)),
                ]));
            }
            lines.push(Line::from(""));
            lines.push(stat_line("  Duration  ", format_duration(live.stats.duration_ms)));
            lines.push(stat_line("  LLM calls ", live.stats.llm_calls.to_string()));
            lines.push(stat_line("  Tool calls", live.stats.tool_calls.to_string()));
            lines.push(stat_line("  Tokens    ", format_tokens(live.stats.tokens)));
            lines.push(error_line(live.stats.errors));
            if live.stats.parse_errors > 0 {
                lines.push(stat_line("  Skipped   ", live.stats.parse_errors.to_string()));
            }
            // Tables below count every event; the timeline only keeps a window.
            let seen = live.feed.seen();
            if seen > app.events.len() {
                lines.push(Line::from(Span::styled(
                    format!("  Timeline: last {} of {seen}", app.events.len()),
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
        None => {
            let s = &app.analysis.summary;
            if !s.run_id.is_empty() {
                lines.push(Line::from(vec![
                    Span::raw("  Run: "),
                    Span::styled(short_id(&s.run_id), Style::default().fg(colors::ACCENT_MUTED)),
                ]));
            }
            if !s.agent_name.is_empty() {
                lines.push(Line::from(vec![
                    Span::raw("  Agent: "),
                    Span::styled(s.agent_name.clone(), Style::default().fg(Color::White)),
                ]));
            }
            lines.push(Line::from(""));
            lines.push(stat_line("  Duration  ", format_duration(s.duration)));
            lines.push(stat_line("  LLM calls ", s.llm_calls.to_string()));
            lines.push(stat_line("  Tool calls", s.tool_calls.to_string()));
            lines.push(stat_line("  Tokens    ", format_tokens(s.total_tokens)));
            lines.push(error_line(s.errors));
            if app.parse_errors > 0 {
                lines.push(stat_line("  Skipped   ", app.parse_errors.to_string()));
            }
        }
    }

    if !app.analysis.models.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("  Models", Style::default().fg(Color::White))));
        for m in &app.analysis.models {
            lines.push(Line::from(vec![
                Span::styled("  │ ", Style::default().fg(Color::DarkGray)),
                Span::styled(m.name.clone(), Style::default().fg(colors::KIND_LLM)),
                Span::styled(
                    format!("  {}× {} tok", m.request_count, format_tokens(m.total_tokens)),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
        }
    }

    if !app.analysis.tools.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("  Tools", Style::default().fg(Color::White))));
        for t in &app.analysis.tools {
            let color = if t.error_count > 0 { colors::KIND_ERROR } else { colors::KIND_TOOL };
            lines.push(Line::from(vec![
                Span::styled("  │ ", Style::default().fg(Color::DarkGray)),
                Span::styled(t.name.clone(), Style::default().fg(color)),
                Span::styled(
                    format!(
                        "  {}× ok {} err {} avg {}",
                        t.call_count,
                        t.success_count,
                        t.error_count,
                        format_duration(t.avg_duration_ms)
                    ),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
        }
    }

    if app.analysis.has_multiple_agents {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  Agents: {}", app.analysis.agents.len()),
            Style::default().fg(Color::White),
        )));
        for a in &app.analysis.agents {
            let color = if a.is_active { Color::Yellow } else { colors::ACCENT_MUTED };
            lines.push(Line::from(vec![
                Span::styled("  ├─ ", Style::default().fg(Color::DarkGray)),
                Span::styled(a.name.clone(), Style::default().fg(color)),
                Span::styled(format!("  {} events", a.event_count), Style::default().fg(Color::DarkGray)),
            ]));
        }
    }

    let paragraph = Paragraph::new(lines).block(block);
    f.render_widget(paragraph, area);
}

fn stat_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{:>8}", value), Style::default().fg(Color::White)),
    ])
}

fn error_line(errors: u64) -> Line<'static> {
    let color = if errors > 0 { colors::KIND_ERROR } else { Color::White };
    Line::from(vec![
        Span::styled("  Errors    : ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{:>8}", errors), Style::default().fg(color)),
    ])
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}
