//! Batch analysis of a complete trace.
//!
//! Everything here is a pure function of the event slice; results are rebuilt
//! from scratch on every call.

pub mod groups;

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::trace::{EventPayload, TraceEvent};

pub use groups::{group_events_by_agent, AgentEventGroup};

/// Name used when an event cannot be attributed.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub run_id: String,
    pub agent_name: String,
    /// Seconds since the epoch, 0 when the trace has no `run.start`.
    pub start_time: f64,
    /// Seconds since the epoch, 0 when the trace has no `run.end`.
    pub end_time: f64,
    /// Milliseconds.
    pub duration: f64,
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub total_tokens: u64,
    pub errors: u64,
    pub tools_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub name: String,
    pub event_count: usize,
    pub tool_calls: u64,
    pub llm_calls: u64,
    pub tokens: u64,
    pub is_active: bool,
    pub first_event_index: usize,
    pub last_event_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub request_count: u64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub call_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub avg_duration_ms: f64,
    pub total_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceAnalysis {
    pub summary: TraceSummary,
    pub agents: Vec<AgentInfo>,
    pub models: Vec<ModelInfo>,
    pub tools: Vec<ToolInfo>,
    pub event_groups: Vec<AgentEventGroup>,
    pub active_agent_name: String,
    pub has_multiple_agents: bool,
}

/// Single pass summary. `run_id`, `agent_name`, `start_time` and `end_time`
/// are first-wins.
pub fn aggregate_summary(events: &[TraceEvent]) -> TraceSummary {
    let mut summary = TraceSummary::default();
    let mut start: Option<f64> = None;
    let mut end: Option<f64> = None;
    let mut seen_tools = HashSet::new();

    for event in events {
        if summary.run_id.is_empty() && !event.run_id.is_empty() {
            summary.run_id = event.run_id.clone();
        }

        match &event.payload {
            EventPayload::RunStart(e) => {
                if start.is_none() {
                    start = Some(event.timestamp);
                    summary.agent_name = e.agent_name.clone().unwrap_or_default();
                }
            }
            EventPayload::RunEnd(_) => {
                end.get_or_insert(event.timestamp);
            }
            EventPayload::LlmResponse(e) => {
                summary.llm_calls += 1;
                summary.total_tokens += e.total_tokens.unwrap_or(0);
            }
            EventPayload::ToolStart(e) => {
                summary.tool_calls += 1;
                if let Some(name) = e.tool_name.as_deref().filter(|n| !n.is_empty()) {
                    if seen_tools.insert(name.to_string()) {
                        summary.tools_used.push(name.to_string());
                    }
                }
            }
            EventPayload::ToolError(_) => summary.errors += 1,
            _ => {}
        }
    }

    summary.start_time = start.unwrap_or(0.0);
    summary.end_time = end.unwrap_or(0.0);
    summary.duration = match (start, end) {
        (Some(s), Some(e)) if e > s => (e - s) * 1000.0,
        _ => 0.0,
    };
    summary
}

/// Division that yields 0 instead of NaN/inf for an empty divisor.
fn average(total: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[derive(Debug, Clone)]
struct ModelAcc {
    info: ModelInfo,
    total_latency_ms: f64,
}

#[derive(Debug, Clone)]
struct ToolAcc {
    info: ToolInfo,
    completed: u64,
}

/// Insertion-ordered table keyed by name.
#[derive(Debug, Clone)]
struct Table<T> {
    index: HashMap<String, usize>,
    rows: Vec<T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            rows: Vec::new(),
        }
    }
}

impl<T> Table<T> {
    fn entry(&mut self, name: &str, make: impl FnOnce() -> T) -> &mut T {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.rows.push(make());
                self.index.insert(name.to_string(), self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        &mut self.rows[idx]
    }
}

/// Running per-agent/model/tool accumulators. Fed one event at a time by both
/// [`analyze_trace`] and the live feed so the two apply identical rules.
#[derive(Debug, Clone, Default)]
pub struct TraceAccumulator {
    current_agent: Option<String>,
    pending_model: Option<String>,
    agents: Table<AgentInfo>,
    models: Table<ModelAcc>,
    tools: Table<ToolAcc>,
}

impl TraceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent that control currently sits with, if any has been announced.
    pub fn current_agent(&self) -> Option<&str> {
        self.current_agent.as_deref()
    }

    /// Fold `event`, located at `index` in the full event sequence.
    pub fn observe(&mut self, index: usize, event: &TraceEvent) {
        let agent_name = event
            .own_agent()
            .or(self.current_agent.as_deref())
            .unwrap_or(UNKNOWN)
            .to_string();

        let agent = self.agents.entry(&agent_name, || AgentInfo {
            name: agent_name.clone(),
            event_count: 0,
            tool_calls: 0,
            llm_calls: 0,
            tokens: 0,
            is_active: false,
            first_event_index: index,
            last_event_index: index,
        });
        agent.event_count += 1;
        agent.last_event_index = index;

        match &event.payload {
            EventPayload::RunStart(e) => {
                if let Some(name) = &e.agent_name {
                    self.current_agent = Some(name.clone());
                }
            }
            EventPayload::AgentTransfer(e) => {
                if let Some(to) = &e.to_agent {
                    self.current_agent = Some(to.clone());
                }
            }
            EventPayload::LlmRequest(e) => {
                let name = e.model.as_deref().unwrap_or(UNKNOWN);
                self.model_entry(name).info.request_count += 1;
                self.pending_model = Some(name.to_string());
            }
            EventPayload::LlmResponse(e) => {
                agent.llm_calls += 1;
                agent.tokens += e.total_tokens.unwrap_or(0);

                let name = e
                    .model
                    .clone()
                    .or_else(|| self.pending_model.clone())
                    .unwrap_or_else(|| UNKNOWN.to_string());
                let model = self.model_entry(&name);
                model.info.total_tokens += e.total_tokens.unwrap_or(0);
                model.info.input_tokens += e.input_tokens.unwrap_or(0);
                model.info.output_tokens += e.output_tokens.unwrap_or(0);
                model.total_latency_ms += e.duration_ms.unwrap_or(0.0);
            }
            EventPayload::ToolStart(e) => {
                agent.tool_calls += 1;
                self.tool_entry(e.tool_name.as_deref()).info.call_count += 1;
            }
            EventPayload::ToolEnd(e) => {
                let tool = self.tool_entry(e.tool_name.as_deref());
                if e.outcome().counts_as_success() {
                    tool.info.success_count += 1;
                }
                tool.completed += 1;
                tool.info.total_duration_ms += e.duration_ms.unwrap_or(0.0);
            }
            EventPayload::ToolError(e) => {
                self.tool_entry(e.tool_name.as_deref()).info.error_count += 1;
            }
            EventPayload::RunEnd(_) | EventPayload::StateChange(_) => {}
        }
    }

    fn model_entry(&mut self, name: &str) -> &mut ModelAcc {
        self.models.entry(name, || ModelAcc {
            info: ModelInfo {
                name: name.to_string(),
                request_count: 0,
                total_tokens: 0,
                input_tokens: 0,
                output_tokens: 0,
                avg_latency_ms: 0.0,
            },
            total_latency_ms: 0.0,
        })
    }

    fn tool_entry(&mut self, name: Option<&str>) -> &mut ToolAcc {
        let name = name.unwrap_or(UNKNOWN);
        self.tools.entry(name, || ToolAcc {
            info: ToolInfo {
                name: name.to_string(),
                call_count: 0,
                success_count: 0,
                error_count: 0,
                avg_duration_ms: 0.0,
                total_duration_ms: 0.0,
            },
            completed: 0,
        })
    }

    /// Agents in first-appearance order, `is_active` set from the current
    /// agent pointer.
    pub fn agents(&self) -> Vec<AgentInfo> {
        self.agents
            .rows
            .iter()
            .map(|a| AgentInfo {
                is_active: self.current_agent.as_deref() == Some(a.name.as_str()),
                ..a.clone()
            })
            .collect()
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.models
            .rows
            .iter()
            .map(|m| ModelInfo {
                avg_latency_ms: average(m.total_latency_ms, m.info.request_count),
                ..m.info.clone()
            })
            .collect()
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.tools
            .rows
            .iter()
            .map(|t| ToolInfo {
                avg_duration_ms: average(t.info.total_duration_ms, t.completed),
                ..t.info.clone()
            })
            .collect()
    }
}

/// Full analysis: summary, per-agent/model/tool tables and timeline groups.
pub fn analyze_trace(events: &[TraceEvent]) -> TraceAnalysis {
    let mut acc = TraceAccumulator::new();
    for (index, event) in events.iter().enumerate() {
        acc.observe(index, event);
    }

    let agents = acc.agents();
    let event_groups = group_events_by_agent(events, &agents);

    TraceAnalysis {
        summary: aggregate_summary(events),
        has_multiple_agents: agents.len() > 1,
        active_agent_name: acc.current_agent().unwrap_or_default().to_string(),
        models: acc.models(),
        tools: acc.tools(),
        agents,
        event_groups,
    }
}
