use std::path::PathBuf;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::analysis::{analyze_trace, AgentEventGroup, TraceAnalysis};
use crate::config::{Config, Theme};
use crate::export::{export_trace, ExportFormat, ExportOptions};
use crate::filter::{filter_events, filter_suggestions};
use crate::format::TimestampFormat;
use crate::live::{LiveFeed, LiveMessage, LiveSession, LiveStats, ProcessStatus};
use crate::trace::{ParsedTrace, TraceEvent};

/// Where the events on screen come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Live { command: String },
}

/// Which panel is focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPanel {
    Timeline,
    Stats,
    Detail,
}

/// A flattened row in the timeline, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineRow {
    /// Start of an agent section; only emitted for multi-agent traces.
    Header { agent_name: String, events: usize },
    Transfer { from_agent: String, to_agent: String, index: usize },
    /// Index into `App::events`.
    Event(usize),
}

impl TimelineRow {
    pub fn event_index(&self) -> Option<usize> {
        match self {
            TimelineRow::Event(i) => Some(*i),
            TimelineRow::Transfer { index, .. } => Some(*index),
            TimelineRow::Header { .. } => None,
        }
    }
}

/// Process state while tailing a command.
#[derive(Debug)]
pub struct LiveState {
    pub session: Option<LiveSession>,
    pub status: ProcessStatus,
    pub error: Option<String>,
    pub stats: LiveStats,
    pub feed: LiveFeed,
    pub paused: bool,
}

impl LiveState {
    pub fn new(session: Option<LiveSession>, max_events: usize) -> Self {
        Self {
            session,
            status: ProcessStatus::Starting,
            error: None,
            stats: LiveStats::default(),
            feed: LiveFeed::new(max_events),
            paused: false,
        }
    }
}

pub struct App {
    pub source: Source,
    pub events: Vec<TraceEvent>,
    pub analysis: TraceAnalysis,
    pub parse_errors: usize,
    pub should_quit: bool,

    // Timeline state.
    pub rows: Vec<TimelineRow>,
    pub matched: usize,
    pub selected_index: usize,

    pub focus: FocusPanel,

    // Filter box.
    pub search_mode: bool,
    pub filter_query: String,
    pub suggestions: Vec<String>,

    pub timestamp_format: TimestampFormat,
    pub theme: Theme,

    pub live: Option<LiveState>,

    /// One-shot message for the status bar.
    pub notice: Option<String>,

    /// Advances on every tick while a live event is in flight.
    pub spinner_frame: usize,

    dirty: bool,
}

impl App {
    pub fn new(source: Source, config: &Config) -> Self {
        let mut app = Self {
            source,
            events: Vec::new(),
            analysis: analyze_trace(&[]),
            parse_errors: 0,
            should_quit: false,
            rows: Vec::new(),
            matched: 0,
            selected_index: 0,
            focus: FocusPanel::Timeline,
            search_mode: false,
            filter_query: String::new(),
            suggestions: Vec::new(),
            timestamp_format: config.timestamp_format,
            theme: config.theme,
            live: None,
            notice: None,
            spinner_frame: 0,
            dirty: false,
        };
        app.rebuild_rows();
        app
    }

    /// App tailing `command` through `session`.
    pub fn live(command: String, session: Option<LiveSession>, config: &Config) -> Self {
        let mut app = Self::new(Source::Live { command }, config);
        app.live = Some(LiveState::new(session, config.max_events));
        app
    }

    /// Replace the displayed trace, e.g. after the file changed on disk.
    pub fn load_trace(&mut self, parsed: ParsedTrace) {
        self.events = parsed.events;
        self.parse_errors = parsed.errors;
        self.analysis = analyze_trace(&self.events);
        self.rebuild_rows();
    }

    pub fn apply_live(&mut self, message: LiveMessage) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        match message {
            LiveMessage::Status { status, error } => {
                live.status = status;
                live.error = error;
            }
            LiveMessage::Stats(stats) => {
                self.parse_errors = stats.parse_errors as usize;
                live.stats = stats;
            }
            LiveMessage::Event(event) => {
                live.feed.push(event);
                self.dirty = true;
            }
        }
    }

    /// Fold buffered live events into the displayed state. Called once per
    /// frame rather than once per event.
    pub fn refresh(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        let Some(live) = self.live.as_ref() else {
            return;
        };
        self.events = live.feed.events();
        let mut analysis = analyze_trace(&self.events);
        // History is bounded; the tables should cover everything seen.
        analysis.agents = live.feed.agents();
        analysis.models = live.feed.models();
        analysis.tools = live.feed.tools();
        analysis.has_multiple_agents = analysis.agents.len() > 1;
        self.analysis = analysis;
        self.rebuild_rows();
    }

    /// Index into `events` of the live event that has not been superseded
    /// yet. `None` once the process is gone.
    pub fn in_flight_index(&self) -> Option<usize> {
        let live = self.live.as_ref()?;
        if live.status.is_terminal() || live.feed.current().is_none() {
            return None;
        }
        self.events.len().checked_sub(1)
    }

    pub fn tick(&mut self) {
        if self.in_flight_index().is_some() {
            self.spinner_frame = self.spinner_frame.wrapping_add(1);
        }
    }

    /// Rebuild the flattened timeline from the events and current filter.
    pub fn rebuild_rows(&mut self) {
        let was_at_end = self.selected_index + 1 >= self.rows.len();
        let matched = filter_events(&self.events, &self.filter_query).matched_indices;
        let mut rows = Vec::new();

        for group in &self.analysis.event_groups {
            match group {
                AgentEventGroup::Section {
                    agent_name,
                    start_index,
                    end_index,
                } => {
                    let visible: Vec<usize> = matched.range(*start_index..=*end_index).copied().collect();
                    if visible.is_empty() {
                        continue;
                    }
                    if self.analysis.has_multiple_agents {
                        rows.push(TimelineRow::Header {
                            agent_name: agent_name.clone(),
                            events: visible.len(),
                        });
                    }
                    rows.extend(visible.into_iter().map(TimelineRow::Event));
                }
                AgentEventGroup::Transfer {
                    from_agent,
                    to_agent,
                    index,
                } => {
                    if matched.contains(index) {
                        rows.push(TimelineRow::Transfer {
                            from_agent: from_agent.clone(),
                            to_agent: to_agent.clone(),
                            index: *index,
                        });
                    }
                }
            }
        }

        self.matched = matched.len();
        self.rows = rows;
        if self.live.is_some() && was_at_end {
            self.select_last();
        } else if self.selected_index >= self.rows.len() {
            self.selected_index = self.rows.len().saturating_sub(1);
        }
    }

    pub fn selected_event(&self) -> Option<&TraceEvent> {
        self.rows
            .get(self.selected_index)
            .and_then(TimelineRow::event_index)
            .and_then(|i| self.events.get(i))
    }

    /// Timestamp that relative times are measured from.
    pub fn reference_timestamp(&self) -> f64 {
        if let Some(base) = self.live.as_ref().and_then(|l| l.feed.base_timestamp()) {
            return base;
        }
        match self.analysis.summary.start_time {
            t if t > 0.0 => t,
            _ => self.events.first().map(|e| e.timestamp).unwrap_or(0.0),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.search_mode {
            self.handle_search_key(key);
            return;
        }
        self.notice = None;

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('G') | KeyCode::End => self.select_last(),
            KeyCode::Char('g') | KeyCode::Home => self.select_first(),
            KeyCode::Char('/') => {
                self.search_mode = true;
                self.update_suggestions();
            }
            KeyCode::Esc if !self.filter_query.is_empty() => {
                self.filter_query.clear();
                self.rebuild_rows();
            }
            KeyCode::Char('t') => self.cycle_timestamp_format(),
            KeyCode::Char('p') => self.toggle_pause(),
            KeyCode::Char('s') => self.stop_live(),
            KeyCode::Char('e') => self.export(ExportFormat::Markdown),
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::PageDown => self.move_selection(20),
            KeyCode::PageUp => self.move_selection(-20),
            _ => {}
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.move_selection(-3),
            MouseEventKind::ScrollDown => self.move_selection(3),
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.search_mode = false;
                self.filter_query.clear();
                self.suggestions.clear();
                self.rebuild_rows();
            }
            KeyCode::Enter => {
                self.search_mode = false;
                self.suggestions.clear();
            }
            KeyCode::Tab => {
                if let Some(first) = self.suggestions.first().cloned() {
                    self.replace_last_token(&first);
                }
            }
            KeyCode::Backspace => {
                self.filter_query.pop();
                self.on_query_changed();
            }
            KeyCode::Char(c) => {
                self.filter_query.push(c);
                self.on_query_changed();
            }
            _ => {}
        }
    }

    fn on_query_changed(&mut self) {
        self.selected_index = 0;
        self.rebuild_rows();
        self.update_suggestions();
    }

    fn update_suggestions(&mut self) {
        let last = self.filter_query.split_whitespace().last().unwrap_or("");
        self.suggestions = if self.filter_query.ends_with(' ') || last.is_empty() {
            Vec::new()
        } else {
            filter_suggestions(last, &self.events)
        };
    }

    fn replace_last_token(&mut self, replacement: &str) {
        let keep = self
            .filter_query
            .rfind(char::is_whitespace)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.filter_query.truncate(keep);
        self.filter_query.push_str(replacement);
        self.on_query_changed();
    }

    fn move_selection(&mut self, delta: i32) {
        if self.rows.is_empty() {
            return;
        }
        let new_idx = self.selected_index as i32 + delta;
        self.selected_index = new_idx.clamp(0, self.rows.len() as i32 - 1) as usize;
    }

    fn select_first(&mut self) {
        self.selected_index = 0;
    }

    fn select_last(&mut self) {
        self.selected_index = self.rows.len().saturating_sub(1);
    }

    fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPanel::Timeline => FocusPanel::Stats,
            FocusPanel::Stats => FocusPanel::Detail,
            FocusPanel::Detail => FocusPanel::Timeline,
        };
    }

    fn cycle_timestamp_format(&mut self) {
        self.timestamp_format = match self.timestamp_format {
            TimestampFormat::Relative => TimestampFormat::Absolute,
            TimestampFormat::Absolute => TimestampFormat::Unix,
            TimestampFormat::Unix => TimestampFormat::Relative,
        };
    }

    fn toggle_pause(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if live.status.is_terminal() {
            return;
        }
        live.paused = !live.paused;
        if let Some(session) = &live.session {
            session.set_paused(live.paused);
        }
        self.notice = Some(if live.paused { "Paused" } else { "Resumed" }.to_string());
    }

    fn stop_live(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if let Some(session) = &live.session {
            if !live.status.is_terminal() {
                session.stop();
                self.notice = Some("Stopping…".to_string());
            }
        }
    }

    pub fn export(&mut self, format: ExportFormat) {
        let options = ExportOptions {
            format,
            output_path: None,
        };
        self.notice = Some(match export_trace(&self.events, &self.analysis, &options) {
            Ok(result) => format!("Exported {} ({} bytes)", result.path.display(), result.size),
            Err(e) => format!("[{}] {e}", e.code()),
        });
    }
}
