//! Shared color palette for the TUI.

use ratatui::style::Color;

use watchtower::config::Theme;
use watchtower::live::ProcessStatus;
use watchtower::trace::EventKind;

// ── Event kinds ─────────────────────────────────────────────────────
pub const KIND_RUN: Color = Color::Rgb(120, 160, 220);
pub const KIND_LLM: Color = Color::Rgb(190, 130, 240);
pub const KIND_TOOL: Color = Color::Rgb(80, 200, 200);
pub const KIND_ERROR: Color = Color::Rgb(230, 90, 90);
pub const KIND_STATE: Color = Color::Rgb(160, 160, 160);
pub const KIND_TRANSFER: Color = Color::Rgb(255, 180, 50);

// ── Process status ──────────────────────────────────────────────────
pub const STATUS_STARTING: Color = Color::Rgb(200, 200, 80);
pub const STATUS_RUNNING: Color = Color::Rgb(80, 220, 120);
pub const STATUS_STOPPED: Color = Color::Rgb(160, 160, 160);
pub const STATUS_ERROR: Color = Color::Rgb(230, 90, 90);

// ── Accent / chrome ─────────────────────────────────────────────────
pub const ACCENT_MUTED: Color = Color::Rgb(120, 120, 180);
pub const HIGHLIGHT_BG: Color = Color::Rgb(60, 55, 50);
pub const HIGHLIGHT_FG: Color = Color::Rgb(255, 220, 150);
pub const LIGHT_HIGHLIGHT_BG: Color = Color::Rgb(220, 220, 235);
pub const LIGHT_HIGHLIGHT_FG: Color = Color::Rgb(30, 30, 80);

pub fn kind_color(kind: EventKind, theme: Theme) -> Color {
    if theme == Theme::Minimal {
        return if kind == EventKind::ToolError { KIND_ERROR } else { Color::Reset };
    }
    match kind {
        EventKind::RunStart | EventKind::RunEnd => KIND_RUN,
        EventKind::LlmRequest | EventKind::LlmResponse => KIND_LLM,
        EventKind::ToolStart | EventKind::ToolEnd => KIND_TOOL,
        EventKind::ToolError => KIND_ERROR,
        EventKind::StateChange => KIND_STATE,
        EventKind::AgentTransfer => KIND_TRANSFER,
    }
}

pub fn status_color(status: ProcessStatus) -> Color {
    match status {
        ProcessStatus::Starting => STATUS_STARTING,
        ProcessStatus::Running => STATUS_RUNNING,
        ProcessStatus::Stopped => STATUS_STOPPED,
        ProcessStatus::Error => STATUS_ERROR,
    }
}

/// Background and foreground of the selected row.
pub fn highlight(theme: Theme) -> (Color, Color) {
    match theme {
        Theme::Light => (LIGHT_HIGHLIGHT_BG, LIGHT_HIGHLIGHT_FG),
        Theme::Dark | Theme::Minimal => (HIGHLIGHT_BG, HIGHLIGHT_FG),
    }
}
