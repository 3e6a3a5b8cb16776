use std::io::BufRead;
use std::path::Path;

use serde_json::Value;
use tokio::io::AsyncBufReadExt;

use crate::analysis::{aggregate_summary, TraceSummary};
use crate::error::Result;

use super::event::TraceEvent;

/// Events read from a saved trace plus the number of lines that were dropped.
#[derive(Debug, Clone)]
pub struct ParsedTrace {
    pub events: Vec<TraceEvent>,
    pub summary: TraceSummary,
    /// Non-blank, non-comment lines that did not yield an event.
    pub errors: usize,
}

/// Lines that are skipped without counting as a parse failure.
pub(crate) fn is_ignorable(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parse one raw JSONL line. Blank lines, `#` comments, bad JSON and
/// events that fail validation all yield `None`.
pub fn parse_line(line: &str) -> Option<TraceEvent> {
    let trimmed = line.trim();
    if is_ignorable(trimmed) {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    TraceEvent::from_value(&value)
}

/// Parse a JSON-RPC 2.0 notification whose `params` is an event.
pub fn parse_json_rpc(line: &str) -> Option<TraceEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let envelope = value.as_object()?;
    if envelope.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return None;
    }
    TraceEvent::from_value(envelope.get("params")?)
}

/// Live wire format: JSON-RPC framing first, bare event second.
pub fn parse_live_line(line: &str) -> Option<TraceEvent> {
    parse_json_rpc(line).or_else(|| parse_line(line))
}

/// Accumulates parsed lines for the file readers below.
#[derive(Default)]
struct LineCollector {
    events: Vec<TraceEvent>,
    errors: usize,
}

impl LineCollector {
    fn push(&mut self, line: &str) {
        match parse_line(line) {
            Some(event) => self.events.push(event),
            None if !is_ignorable(line.trim()) => self.errors += 1,
            None => {}
        }
    }

    fn finish(self) -> ParsedTrace {
        if self.errors > 0 {
            tracing::warn!(skipped = self.errors, "trace lines could not be parsed");
        }
        let summary = aggregate_summary(&self.events);
        ParsedTrace {
            events: self.events,
            summary,
            errors: self.errors,
        }
    }
}

/// Stream a trace file line by line. Only I/O failures are errors; bad
/// content is counted in [`ParsedTrace::errors`].
pub async fn parse_trace_file(path: &Path) -> Result<ParsedTrace> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = tokio::io::BufReader::new(file).lines();
    let mut collector = LineCollector::default();

    while let Some(line) = lines.next_line().await? {
        collector.push(&line);
    }

    tracing::debug!(
        path = %path.display(),
        events = collector.events.len(),
        "parsed trace file"
    );
    Ok(collector.finish())
}

/// Blocking counterpart of [`parse_trace_file`] for any buffered reader.
pub fn parse_trace_reader<R: BufRead>(reader: R) -> Result<ParsedTrace> {
    let mut collector = LineCollector::default();
    for line in reader.lines() {
        collector.push(&line?);
    }
    Ok(collector.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::EventKind;

    #[test]
    fn test_parse_line_skips_blank_and_comments() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   \t").is_none());
        assert!(parse_line("# written by sdk 0.4").is_none());
        assert!(parse_line("not json").is_none());
        assert!(parse_line("{\"type\":").is_none());
    }

    #[test]
    fn test_parse_line_trims_whitespace() {
        let event =
            parse_line("  {\"type\":\"run.end\",\"run_id\":\"r1\",\"timestamp\":5}\r\n").unwrap();
        assert_eq!(event.kind(), EventKind::RunEnd);
        assert_eq!(event.timestamp, 5.0);
    }

    #[test]
    fn test_parse_json_rpc_envelope() {
        let line = r#"{"jsonrpc":"2.0","method":"trace.event","params":{"type":"tool.start","run_id":"r1","timestamp":1.25,"tool_name":"search"}}"#;
        let event = parse_json_rpc(line).unwrap();
        assert_eq!(event.tool_name(), Some("search"));
    }

    #[test]
    fn test_parse_json_rpc_rejects_bad_envelopes() {
        let bare = r#"{"type":"tool.start","run_id":"r1","timestamp":1}"#;
        assert!(parse_json_rpc(bare).is_none());
        let wrong_version = r#"{"jsonrpc":"1.0","params":{"type":"tool.start","run_id":"r1","timestamp":1}}"#;
        assert!(parse_json_rpc(wrong_version).is_none());
        let bad_params = r#"{"jsonrpc":"2.0","params":{"type":"nope","run_id":"r1","timestamp":1}}"#;
        assert!(parse_json_rpc(bad_params).is_none());
        assert!(parse_json_rpc(r#"{"jsonrpc":"2.0"}"#).is_none());
    }

    #[test]
    fn test_live_line_accepts_both_framings() {
        let bare = r#"{"type":"run.start","run_id":"r1","timestamp":1}"#;
        let wrapped = format!(r#"{{"jsonrpc":"2.0","method":"event","params":{bare}}}"#);
        assert_eq!(parse_live_line(bare), parse_live_line(&wrapped));
        assert!(parse_live_line(bare).is_some());
    }

    #[test]
    fn test_reader_counts_failures_but_not_comments() {
        let input = "\
# header comment
{\"type\":\"run.start\",\"run_id\":\"r1\",\"timestamp\":1,\"agent_name\":\"bot\"}

garbage
{\"type\":\"mystery\",\"run_id\":\"r1\",\"timestamp\":2}
{\"type\":\"run.end\",\"run_id\":\"r1\",\"timestamp\":3}
";
        let parsed = parse_trace_reader(input.as_bytes()).unwrap();
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.errors, 2);
        assert_eq!(parsed.summary.agent_name, "bot");
        assert_eq!(parsed.summary.duration, 2000.0);
    }
}
