use std::collections::VecDeque;

use crate::analysis::{AgentInfo, ModelInfo, ToolInfo, TraceAccumulator};
use crate::trace::TraceEvent;

/// Rolling view of a live stream: the newest event is "current", older ones
/// settle into a bounded history. Per-agent/model/tool tables cover every
/// event seen, including those evicted from the history.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    max_events: usize,
    completed: VecDeque<TraceEvent>,
    current: Option<TraceEvent>,
    base_timestamp: Option<f64>,
    accumulator: TraceAccumulator,
    seen: usize,
}

impl LiveFeed {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events: max_events.max(1),
            completed: VecDeque::new(),
            current: None,
            base_timestamp: None,
            accumulator: TraceAccumulator::new(),
            seen: 0,
        }
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.base_timestamp.get_or_insert(event.timestamp);
        self.accumulator.observe(self.seen, &event);
        self.seen += 1;

        if let Some(previous) = self.current.replace(event) {
            self.completed.push_back(previous);
            while self.completed.len() > self.max_events {
                self.completed.pop_front();
            }
        }
    }

    pub fn current(&self) -> Option<&TraceEvent> {
        self.current.as_ref()
    }

    pub fn completed(&self) -> impl DoubleEndedIterator<Item = &TraceEvent> + ExactSizeIterator {
        self.completed.iter()
    }

    /// Retained events, oldest first, the current one last.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.completed
            .iter()
            .chain(self.current.as_ref())
            .cloned()
            .collect()
    }

    /// Timestamp of the first event ever pushed, for relative times.
    pub fn base_timestamp(&self) -> Option<f64> {
        self.base_timestamp
    }

    /// Events pushed since creation, evicted ones included.
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn current_agent(&self) -> Option<&str> {
        self.accumulator.current_agent()
    }

    pub fn agents(&self) -> Vec<AgentInfo> {
        self.accumulator.agents()
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.accumulator.models()
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.accumulator.tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::parse_line;

    fn tool_start(ts: u32, name: &str) -> TraceEvent {
        parse_line(&format!(
            r#"{{"type":"tool.start","run_id":"r","timestamp":{ts},"tool_name":"{name}","agent_name":"a"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_push_promotes_current() {
        let mut feed = LiveFeed::new(10);
        assert!(feed.current().is_none());

        feed.push(tool_start(1, "one"));
        assert_eq!(feed.current().and_then(TraceEvent::tool_name), Some("one"));
        assert_eq!(feed.completed().len(), 0);

        feed.push(tool_start(2, "two"));
        assert_eq!(feed.current().and_then(TraceEvent::tool_name), Some("two"));
        assert_eq!(feed.completed().len(), 1);
        assert_eq!(feed.base_timestamp(), Some(1.0));
    }

    #[test]
    fn test_history_is_bounded_but_tables_are_not() {
        let mut feed = LiveFeed::new(2);
        for ts in 0..5 {
            feed.push(tool_start(ts, "t"));
        }
        assert_eq!(feed.completed().len(), 2);
        assert_eq!(feed.events().len(), 3);
        assert_eq!(feed.events()[0].timestamp, 2.0);
        assert_eq!(feed.seen(), 5);
        assert_eq!(feed.tools()[0].call_count, 5);
        assert_eq!(feed.agents()[0].event_count, 5);
        assert_eq!(feed.base_timestamp(), Some(0.0));
    }
}
