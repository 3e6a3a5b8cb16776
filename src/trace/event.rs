//! Trace event model.
//!
//! Emitters evolve independently of the viewer, so only `type`, `run_id` and
//! `timestamp` are enforced. Every type-specific field is optional and a field
//! with an unexpected JSON type is read as absent.

use serde::Serialize;
use serde_json::{Map, Value};

/// The nine event kinds an agent emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    RunStart,
    RunEnd,
    LlmRequest,
    LlmResponse,
    ToolStart,
    ToolEnd,
    ToolError,
    StateChange,
    AgentTransfer,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::RunStart,
        EventKind::RunEnd,
        EventKind::LlmRequest,
        EventKind::LlmResponse,
        EventKind::ToolStart,
        EventKind::ToolEnd,
        EventKind::ToolError,
        EventKind::StateChange,
        EventKind::AgentTransfer,
    ];

    /// Wire name, e.g. `"tool.start"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStart => "run.start",
            EventKind::RunEnd => "run.end",
            EventKind::LlmRequest => "llm.request",
            EventKind::LlmResponse => "llm.response",
            EventKind::ToolStart => "tool.start",
            EventKind::ToolEnd => "tool.end",
            EventKind::ToolError => "tool.error",
            EventKind::StateChange => "state.change",
            EventKind::AgentTransfer => "agent.transfer",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished tool call as reported by `tool.end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Succeeded,
    Failed,
    /// The emitter did not send a `success` field.
    Unknown,
}

impl ToolOutcome {
    /// Older emitters omit `success`; those calls are counted as successful.
    pub fn counts_as_success(&self) -> bool {
        !matches!(self, ToolOutcome::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

/// Totals the emitter embeds in `run.end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummaryData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_calls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunEnd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummaryData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_available: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolEnd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl ToolEnd {
    pub fn outcome(&self) -> ToolOutcome {
        match self.success {
            Some(true) => ToolOutcome::Succeeded,
            Some(false) => ToolOutcome::Failed,
            None => ToolOutcome::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_delta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentTransfer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Kind-specific part of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "run.start")]
    RunStart(RunStart),
    #[serde(rename = "run.end")]
    RunEnd(RunEnd),
    #[serde(rename = "llm.request")]
    LlmRequest(LlmRequest),
    #[serde(rename = "llm.response")]
    LlmResponse(LlmResponse),
    #[serde(rename = "tool.start")]
    ToolStart(ToolStart),
    #[serde(rename = "tool.end")]
    ToolEnd(ToolEnd),
    #[serde(rename = "tool.error")]
    ToolError(ToolError),
    #[serde(rename = "state.change")]
    StateChange(StateChange),
    #[serde(rename = "agent.transfer")]
    AgentTransfer(AgentTransfer),
}

/// One line of a trace. Serializes back to the wire shape it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub run_id: String,
    /// Seconds since the epoch.
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Minimum-shape check: known `type`, string `run_id`, numeric (or numeric
/// string) `timestamp`.
pub fn is_valid_event(raw: &Value) -> bool {
    let Some(obj) = raw.as_object() else {
        return false;
    };
    let known_kind = obj
        .get("type")
        .and_then(Value::as_str)
        .and_then(EventKind::from_wire)
        .is_some();
    known_kind
        && obj.get("run_id").is_some_and(Value::is_string)
        && obj.get("timestamp").and_then(normalize_timestamp).is_some()
}

/// Accepts a finite JSON number or a string holding one.
fn normalize_timestamp(v: &Value) -> Option<f64> {
    let ts = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    ts.is_finite().then_some(ts)
}

/// Lenient field reader over a JSON object.
struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn string(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn float(&self, key: &str) -> Option<f64> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    fn count(&self, key: &str) -> Option<u64> {
        let v = self.0.get(key)?;
        v.as_u64().or_else(|| {
            v.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        })
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    fn strings(&self, key: &str) -> Option<Vec<String>> {
        let arr = self.0.get(key)?.as_array()?;
        Some(
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    fn object(&self, key: &str) -> Option<Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object).cloned()
    }

    fn nested(&self, key: &str) -> Option<Fields<'a>> {
        self.0.get(key).and_then(Value::as_object).map(Fields)
    }
}

impl TraceEvent {
    /// Build an event from an already-decoded JSON value. Returns `None` when
    /// the value fails [`is_valid_event`].
    pub fn from_value(raw: &Value) -> Option<Self> {
        if !is_valid_event(raw) {
            return None;
        }
        let obj = raw.as_object()?;
        let f = Fields(obj);
        let kind = EventKind::from_wire(obj.get("type")?.as_str()?)?;
        let payload = match kind {
            EventKind::RunStart => EventPayload::RunStart(RunStart {
                invocation_id: f.string("invocation_id"),
                agent_name: f.string("agent_name"),
            }),
            EventKind::RunEnd => EventPayload::RunEnd(RunEnd {
                duration_ms: f.float("duration_ms"),
                summary: f.nested("summary").map(|s| RunSummaryData {
                    llm_calls: s.count("llm_calls"),
                    tool_calls: s.count("tool_calls"),
                    total_tokens: s.count("total_tokens"),
                    errors: s.count("errors"),
                    tools_used: s.strings("tools_used"),
                }),
            }),
            EventKind::LlmRequest => EventPayload::LlmRequest(LlmRequest {
                request_id: f.string("request_id"),
                model: f.string("model"),
                message_count: f.count("message_count"),
                tools_available: f.strings("tools_available"),
            }),
            EventKind::LlmResponse => EventPayload::LlmResponse(LlmResponse {
                request_id: f.string("request_id"),
                model: f.string("model"),
                duration_ms: f.float("duration_ms"),
                input_tokens: f.count("input_tokens"),
                output_tokens: f.count("output_tokens"),
                total_tokens: f.count("total_tokens"),
                has_tool_calls: f.flag("has_tool_calls"),
                finish_reason: f.string("finish_reason"),
            }),
            EventKind::ToolStart => EventPayload::ToolStart(ToolStart {
                tool_call_id: f.string("tool_call_id"),
                tool_name: f.string("tool_name"),
                tool_args: f.object("tool_args"),
                agent_name: f.string("agent_name"),
            }),
            EventKind::ToolEnd => EventPayload::ToolEnd(ToolEnd {
                tool_call_id: f.string("tool_call_id"),
                tool_name: f.string("tool_name"),
                duration_ms: f.float("duration_ms"),
                response_preview: f.string("response_preview"),
                success: f.flag("success"),
            }),
            EventKind::ToolError => EventPayload::ToolError(ToolError {
                tool_call_id: f.string("tool_call_id"),
                tool_name: f.string("tool_name"),
                error_type: f.string("error_type"),
                error_message: f.string("error_message"),
            }),
            EventKind::StateChange => EventPayload::StateChange(StateChange {
                author: f.string("author"),
                state_delta: f.object("state_delta"),
            }),
            EventKind::AgentTransfer => EventPayload::AgentTransfer(AgentTransfer {
                from_agent: f.string("from_agent"),
                to_agent: f.string("to_agent"),
                reason: f.string("reason"),
            }),
        };

        Some(TraceEvent {
            run_id: f.string("run_id")?,
            timestamp: normalize_timestamp(obj.get("timestamp")?)?,
            schema_version: f.string("schema_version"),
            payload,
        })
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::RunStart(_) => EventKind::RunStart,
            EventPayload::RunEnd(_) => EventKind::RunEnd,
            EventPayload::LlmRequest(_) => EventKind::LlmRequest,
            EventPayload::LlmResponse(_) => EventKind::LlmResponse,
            EventPayload::ToolStart(_) => EventKind::ToolStart,
            EventPayload::ToolEnd(_) => EventKind::ToolEnd,
            EventPayload::ToolError(_) => EventKind::ToolError,
            EventPayload::StateChange(_) => EventKind::StateChange,
            EventPayload::AgentTransfer(_) => EventKind::AgentTransfer,
        }
    }

    /// The event's own `agent_name` field.
    pub fn agent_name(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::RunStart(e) => e.agent_name.as_deref(),
            EventPayload::ToolStart(e) => e.agent_name.as_deref(),
            _ => None,
        }
    }

    pub fn author(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::StateChange(e) => e.author.as_deref(),
            _ => None,
        }
    }

    pub fn from_agent(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::AgentTransfer(e) => e.from_agent.as_deref(),
            _ => None,
        }
    }

    pub fn to_agent(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::AgentTransfer(e) => e.to_agent.as_deref(),
            _ => None,
        }
    }

    /// Agent the event names itself: `agent_name`, else `author`, else
    /// `from_agent`.
    pub fn own_agent(&self) -> Option<&str> {
        self.agent_name()
            .or_else(|| self.author())
            .or_else(|| self.from_agent())
    }

    pub fn tool_name(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ToolStart(e) => e.tool_name.as_deref(),
            EventPayload::ToolEnd(e) => e.tool_name.as_deref(),
            EventPayload::ToolError(e) => e.tool_name.as_deref(),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::LlmRequest(e) => e.model.as_deref(),
            EventPayload::LlmResponse(e) => e.model.as_deref(),
            _ => None,
        }
    }

    /// Explicit `success` flag, only ever carried by `tool.end`.
    pub fn success(&self) -> Option<bool> {
        match &self.payload {
            EventPayload::ToolEnd(e) => e.success,
            _ => None,
        }
    }

    pub fn error_type(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ToolError(e) => e.error_type.as_deref(),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ToolError(e) => e.error_message.as_deref(),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::AgentTransfer(e) => e.reason.as_deref(),
            _ => None,
        }
    }

    pub fn response_preview(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ToolEnd(e) => e.response_preview.as_deref(),
            _ => None,
        }
    }

    pub fn finish_reason(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::LlmResponse(e) => e.finish_reason.as_deref(),
            _ => None,
        }
    }

    /// `total_tokens` of an `llm.response`.
    pub fn total_tokens(&self) -> Option<u64> {
        match &self.payload {
            EventPayload::LlmResponse(e) => e.total_tokens,
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> Option<f64> {
        match &self.payload {
            EventPayload::RunEnd(e) => e.duration_ms,
            EventPayload::LlmResponse(e) => e.duration_ms,
            EventPayload::ToolEnd(e) => e.duration_ms,
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind() == EventKind::ToolError
    }

    /// Free-text fields searched by plain-text filters, in a fixed order.
    pub fn text_fields(&self) -> Vec<&str> {
        [
            Some(self.kind().as_str()),
            self.tool_name(),
            self.agent_name(),
            self.model(),
            self.error_message(),
            self.reason(),
            self.response_preview(),
            self.finish_reason(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect()
    }

    /// Short one-line description for list views.
    pub fn detail(&self) -> String {
        match &self.payload {
            EventPayload::RunStart(e) => e.agent_name.clone().unwrap_or_default(),
            EventPayload::RunEnd(e) => match e.duration_ms {
                Some(ms) if ms > 0.0 => format!("{:.2}s", ms / 1000.0),
                _ => String::new(),
            },
            EventPayload::LlmRequest(e) => e.model.clone().unwrap_or_default(),
            EventPayload::LlmResponse(e) => {
                let mut parts = Vec::new();
                if let Some(tokens) = e.total_tokens.filter(|t| *t > 0) {
                    parts.push(format!("{} tokens", crate::format::format_tokens(tokens)));
                }
                if let Some(ms) = e.duration_ms.filter(|d| *d > 0.0) {
                    parts.push(format!("{}ms", ms.round()));
                }
                parts.join("  ")
            }
            EventPayload::ToolStart(e) => e.tool_name.clone().unwrap_or_default(),
            EventPayload::ToolEnd(e) => {
                let mut parts = Vec::new();
                if let Some(name) = &e.tool_name {
                    parts.push(name.clone());
                }
                if let Some(ms) = e.duration_ms.filter(|d| *d > 0.0) {
                    parts.push(format!("{}ms", ms.round()));
                }
                parts.join("  ")
            }
            EventPayload::ToolError(e) => {
                let tool = e.tool_name.clone().unwrap_or_default();
                match &e.error_type {
                    Some(err) => format!("{tool}: {err}"),
                    None => tool,
                }
            }
            EventPayload::StateChange(e) => e.author.clone().unwrap_or_default(),
            EventPayload::AgentTransfer(e) => match (&e.from_agent, &e.to_agent) {
                (Some(from), Some(to)) => format!("{from} → {to}"),
                _ => String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_event_requires_known_type() {
        assert!(is_valid_event(&json!({"type":"run.start","run_id":"r","timestamp":1.0})));
        assert!(!is_valid_event(&json!({"type":"run.pause","run_id":"r","timestamp":1.0})));
        assert!(!is_valid_event(&json!({"run_id":"r","timestamp":1.0})));
    }

    #[test]
    fn test_valid_event_requires_string_run_id() {
        assert!(!is_valid_event(&json!({"type":"run.start","run_id":7,"timestamp":1.0})));
        assert!(!is_valid_event(&json!({"type":"run.start","timestamp":1.0})));
    }

    #[test]
    fn test_timestamp_accepts_numeric_string() {
        let raw = json!({"type":"run.end","run_id":"r","timestamp":"1712.250"});
        assert!(is_valid_event(&raw));
        let event = TraceEvent::from_value(&raw).unwrap();
        assert_eq!(event.timestamp, 1712.25);
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(!is_valid_event(&json!({"type":"run.end","run_id":"r","timestamp":"soon"})));
        assert!(!is_valid_event(&json!({"type":"run.end","run_id":"r","timestamp":"inf"})));
        assert!(!is_valid_event(&json!({"type":"run.end","run_id":"r","timestamp":null})));
        assert!(!is_valid_event(&json!(["run.end"])));
    }

    #[test]
    fn test_wrong_typed_field_reads_as_absent() {
        let raw = json!({
            "type":"tool.end","run_id":"r","timestamp":2,
            "tool_name": 42, "success": "yes", "duration_ms": 12.5
        });
        let event = TraceEvent::from_value(&raw).unwrap();
        assert_eq!(event.tool_name(), None);
        assert_eq!(event.success(), None);
        assert_eq!(event.duration_ms(), Some(12.5));
    }

    #[test]
    fn test_tool_outcome_tristate() {
        let end = |success| ToolEnd { success, ..Default::default() };
        assert_eq!(end(Some(true)).outcome(), ToolOutcome::Succeeded);
        assert_eq!(end(Some(false)).outcome(), ToolOutcome::Failed);
        assert_eq!(end(None).outcome(), ToolOutcome::Unknown);
        assert!(ToolOutcome::Unknown.counts_as_success());
        assert!(!ToolOutcome::Failed.counts_as_success());
    }

    #[test]
    fn test_own_agent_resolution_order() {
        let state = TraceEvent::from_value(
            &json!({"type":"state.change","run_id":"r","timestamp":1,"author":"planner"}),
        )
        .unwrap();
        assert_eq!(state.own_agent(), Some("planner"));

        let transfer = TraceEvent::from_value(&json!({
            "type":"agent.transfer","run_id":"r","timestamp":1,
            "from_agent":"a","to_agent":"b"
        }))
        .unwrap();
        assert_eq!(transfer.own_agent(), Some("a"));
        assert_eq!(transfer.detail(), "a → b");
    }

    #[test]
    fn test_serializes_back_to_wire_shape() {
        let raw = json!({
            "type":"llm.response","run_id":"r1","timestamp":3.5,
            "model":"gpt-4o","total_tokens":120,"has_tool_calls":true
        });
        let event = TraceEvent::from_value(&raw).unwrap();
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn test_serialized_line_parses_to_same_event() {
        let line = r#"{"type":"tool.end","run_id":"r1","timestamp":"1712.250","tool_name":"search","success":false,"duration_ms":80}"#;
        let event = crate::trace::parse_line(line).unwrap();
        assert_eq!(event.timestamp, 1712.25);

        let written = serde_json::to_string(&event).unwrap();
        assert_eq!(crate::trace::parse_line(&written), Some(event));
    }

    #[test]
    fn test_detail_for_tool_error() {
        let event = TraceEvent::from_value(&json!({
            "type":"tool.error","run_id":"r","timestamp":1,
            "tool_name":"search","error_type":"Timeout"
        }))
        .unwrap();
        assert_eq!(event.detail(), "search: Timeout");
        assert!(event.is_error());
    }
}
