//! Search-box query language.
//!
//! Tokens are whitespace separated and ANDed:
//! - `type:llm`, `type:tool.end`, … match event kinds (substring or alias)
//! - `agent:name`, `tool:name`, `model:name` match those fields
//! - `error` / `errors` keep failures only
//! - anything else is a case-insensitive text search

use std::collections::{BTreeSet, HashSet};

use crate::trace::{EventKind, TraceEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFilter {
    Type(String),
    Agent(String),
    Tool(String),
    Model(String),
    Error,
    Text(String),
}

/// Subsequence of events that passed every filter.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub events: Vec<TraceEvent>,
    /// Positions of the kept events in the input slice.
    pub matched_indices: BTreeSet<usize>,
}

pub fn parse_filter(query: &str) -> Vec<ParsedFilter> {
    query.split_whitespace().map(parse_token).collect()
}

fn parse_token(token: &str) -> ParsedFilter {
    if let Some((prefix, value)) = token.split_once(':') {
        if !prefix.is_empty() {
            let value = value.to_lowercase();
            if !value.is_empty() {
                match prefix.to_lowercase().as_str() {
                    "type" => return ParsedFilter::Type(value),
                    "agent" => return ParsedFilter::Agent(value),
                    "tool" => return ParsedFilter::Tool(value),
                    "model" => return ParsedFilter::Model(value),
                    _ => {}
                }
            }
            return ParsedFilter::Text(token.to_lowercase());
        }
    }

    let lowered = token.to_lowercase();
    if lowered == "error" || lowered == "errors" {
        ParsedFilter::Error
    } else {
        ParsedFilter::Text(lowered)
    }
}

/// Kinds a `type:` shorthand stands for.
fn type_alias(value: &str) -> &'static [EventKind] {
    use EventKind::*;
    match value {
        "llm" => &[LlmRequest, LlmResponse],
        "tool" => &[ToolStart, ToolEnd, ToolError],
        "run" => &[RunStart, RunEnd],
        "state" => &[StateChange],
        "transfer" => &[AgentTransfer],
        "request" => &[LlmRequest],
        "response" => &[LlmResponse],
        "start" => &[RunStart, ToolStart],
        "end" => &[RunEnd, ToolEnd],
        _ => &[],
    }
}

fn contains_ci(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|f| f.to_lowercase().contains(needle))
}

pub fn matches_filter(event: &TraceEvent, filter: &ParsedFilter) -> bool {
    match filter {
        ParsedFilter::Type(value) => {
            let kind = event.kind();
            kind.as_str().contains(value.as_str()) || type_alias(value).contains(&kind)
        }
        ParsedFilter::Agent(value) => [
            event.agent_name(),
            event.from_agent(),
            event.to_agent(),
            event.author(),
        ]
        .into_iter()
        .any(|field| contains_ci(field, value)),
        ParsedFilter::Tool(value) => contains_ci(event.tool_name(), value),
        ParsedFilter::Model(value) => contains_ci(event.model(), value),
        ParsedFilter::Error => {
            event.is_error() || event.success() == Some(false) || event.error_type().is_some()
        }
        ParsedFilter::Text(value) => event
            .text_fields()
            .join(" ")
            .to_lowercase()
            .contains(value.as_str()),
    }
}

pub fn filter_events(events: &[TraceEvent], query: &str) -> FilterResult {
    let filters = parse_filter(query);
    let mut result = FilterResult::default();

    for (index, event) in events.iter().enumerate() {
        if filters.iter().all(|f| matches_filter(event, f)) {
            result.events.push(event.clone());
            result.matched_indices.insert(index);
        }
    }
    result
}

/// Up to five completions for a partially typed query.
pub fn filter_suggestions(query: &str, events: &[TraceEvent]) -> Vec<String> {
    let q = query.to_lowercase();
    let mut suggestions = Vec::new();

    if q.starts_with("type:") || q == "t" || q == "ty" {
        suggestions.extend(
            ["type:llm", "type:tool", "type:run", "type:error"]
                .into_iter()
                .map(str::to_string),
        );
    }

    if q.starts_with("agent:") || q == "a" || q == "ag" {
        let mut seen = HashSet::new();
        for name in events.iter().filter_map(TraceEvent::agent_name) {
            if seen.insert(name) {
                suggestions.push(format!("agent:{name}"));
            }
        }
    }

    if q.starts_with("tool:") || q == "to" {
        let mut seen = HashSet::new();
        for name in events.iter().filter_map(TraceEvent::tool_name) {
            if seen.insert(name) {
                suggestions.push(format!("tool:{name}"));
            }
        }
    }

    suggestions.truncate(5);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::parse_line;

    fn fixture() -> Vec<TraceEvent> {
        [
            r#"{"type":"run.start","run_id":"r","timestamp":1,"agent_name":"foo"}"#,
            r#"{"type":"tool.start","run_id":"r","timestamp":2,"tool_name":"search","agent_name":"foo"}"#,
            r#"{"type":"tool.start","run_id":"r","timestamp":3,"tool_name":"search","agent_name":"bar"}"#,
            r#"{"type":"llm.request","run_id":"r","timestamp":4,"model":"gpt-4o-mini"}"#,
            r#"{"type":"tool.end","run_id":"r","timestamp":5,"tool_name":"search","success":false}"#,
        ]
        .iter()
        .map(|l| parse_line(l).unwrap())
        .collect()
    }

    #[test]
    fn test_parse_filter_classification() {
        assert_eq!(
            parse_filter("Type:LLM agent:Foo   error weird:thing  Hello"),
            vec![
                ParsedFilter::Type("llm".to_string()),
                ParsedFilter::Agent("foo".to_string()),
                ParsedFilter::Error,
                ParsedFilter::Text("weird:thing".to_string()),
                ParsedFilter::Text("hello".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_filter_empty_value_and_leading_colon() {
        assert_eq!(parse_filter("tool:"), vec![ParsedFilter::Text("tool:".to_string())]);
        assert_eq!(parse_filter(":x"), vec![ParsedFilter::Text(":x".to_string())]);
        assert_eq!(parse_filter("ERRORS"), vec![ParsedFilter::Error]);
        assert!(parse_filter("   ").is_empty());
    }

    #[test]
    fn test_and_semantics() {
        let result = filter_events(&fixture(), "type:tool agent:foo");
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.matched_indices.iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_blank_query_keeps_everything() {
        let events = fixture();
        let result = filter_events(&events, "  ");
        assert_eq!(result.events, events);
        assert_eq!(result.matched_indices.len(), events.len());
    }

    #[test]
    fn test_type_alias_and_substring() {
        let events = fixture();
        assert_eq!(filter_events(&events, "type:start").events.len(), 3);
        assert_eq!(filter_events(&events, "type:request").events.len(), 1);
        assert_eq!(filter_events(&events, "type:.end").events.len(), 1);
    }

    #[test]
    fn test_error_filter_catches_failed_tool_end() {
        let result = filter_events(&fixture(), "errors");
        assert_eq!(result.matched_indices.iter().copied().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_text_and_model_filters() {
        let events = fixture();
        assert_eq!(filter_events(&events, "model:4O-MINI").events.len(), 1);
        assert_eq!(filter_events(&events, "SEARCH").events.len(), 3);
        assert_eq!(filter_events(&events, "nothing-here").events.len(), 0);
    }

    #[test]
    fn test_suggestions() {
        let events = fixture();
        assert_eq!(filter_suggestions("ty", &events).len(), 4);
        assert_eq!(
            filter_suggestions("agent:", &events),
            vec!["agent:foo".to_string(), "agent:bar".to_string()]
        );
        assert_eq!(filter_suggestions("to", &events), vec!["tool:search".to_string()]);
        assert!(filter_suggestions("zzz", &events).is_empty());
    }
}
