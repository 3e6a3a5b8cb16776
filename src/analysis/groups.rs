use serde::Serialize;

use crate::trace::{EventPayload, TraceEvent};

use super::{AgentInfo, UNKNOWN};

/// A contiguous slice of the timeline. Indices are inclusive and refer to the
/// full event sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AgentEventGroup {
    #[serde(rename_all = "camelCase")]
    Section {
        agent_name: String,
        start_index: usize,
        end_index: usize,
    },
    /// An `agent.transfer` event, rendered on its own between sections.
    #[serde(rename_all = "camelCase")]
    Transfer {
        from_agent: String,
        to_agent: String,
        index: usize,
    },
}

impl AgentEventGroup {
    pub fn start_index(&self) -> usize {
        match self {
            AgentEventGroup::Section { start_index, .. } => *start_index,
            AgentEventGroup::Transfer { index, .. } => *index,
        }
    }

    pub fn end_index(&self) -> usize {
        match self {
            AgentEventGroup::Section { end_index, .. } => *end_index,
            AgentEventGroup::Transfer { index, .. } => *index,
        }
    }

    /// Number of events covered; never zero.
    pub fn len(&self) -> usize {
        self.end_index() - self.start_index() + 1
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, AgentEventGroup::Transfer { .. })
    }

    /// Owning agent of a section; `None` for transfers.
    pub fn agent_name(&self) -> Option<&str> {
        match self {
            AgentEventGroup::Section { agent_name, .. } => Some(agent_name),
            AgentEventGroup::Transfer { .. } => None,
        }
    }
}

/// Split the timeline at every `agent.transfer`. With at most one agent the
/// whole trace is a single section.
pub fn group_events_by_agent(events: &[TraceEvent], agents: &[AgentInfo]) -> Vec<AgentEventGroup> {
    if events.is_empty() {
        return Vec::new();
    }

    let mut current = agents
        .first()
        .map(|a| a.name.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    if agents.len() <= 1 {
        return vec![AgentEventGroup::Section {
            agent_name: current,
            start_index: 0,
            end_index: events.len() - 1,
        }];
    }

    let mut groups = Vec::new();
    let mut group_start = 0;

    for (i, event) in events.iter().enumerate() {
        match &event.payload {
            EventPayload::RunStart(e) => {
                if let Some(name) = &e.agent_name {
                    current = name.clone();
                }
            }
            EventPayload::AgentTransfer(e) => {
                if i > group_start {
                    groups.push(AgentEventGroup::Section {
                        agent_name: current.clone(),
                        start_index: group_start,
                        end_index: i - 1,
                    });
                }
                let to_agent = e.to_agent.clone().unwrap_or_else(|| UNKNOWN.to_string());
                groups.push(AgentEventGroup::Transfer {
                    from_agent: e.from_agent.clone().unwrap_or_else(|| UNKNOWN.to_string()),
                    to_agent: to_agent.clone(),
                    index: i,
                });
                current = to_agent;
                group_start = i + 1;
            }
            _ => {}
        }
    }

    if group_start < events.len() {
        groups.push(AgentEventGroup::Section {
            agent_name: current,
            start_index: group_start,
            end_index: events.len() - 1,
        });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_trace;
    use crate::trace::parse_line;
    use pretty_assertions::assert_eq;

    fn events(lines: &[&str]) -> Vec<TraceEvent> {
        lines.iter().map(|l| parse_line(l).unwrap()).collect()
    }

    #[test]
    fn test_transfer_splits_into_three_groups() {
        let evs = events(&[
            r#"{"type":"run.start","run_id":"r","timestamp":1,"agent_name":"A"}"#,
            r#"{"type":"tool.start","run_id":"r","timestamp":2,"tool_name":"t1"}"#,
            r#"{"type":"agent.transfer","run_id":"r","timestamp":3,"from_agent":"A","to_agent":"B"}"#,
            r#"{"type":"tool.start","run_id":"r","timestamp":4,"tool_name":"t2"}"#,
            r#"{"type":"run.end","run_id":"r","timestamp":5}"#,
        ]);
        let groups = analyze_trace(&evs).event_groups;
        assert_eq!(
            groups,
            vec![
                AgentEventGroup::Section {
                    agent_name: "A".to_string(),
                    start_index: 0,
                    end_index: 1,
                },
                AgentEventGroup::Transfer {
                    from_agent: "A".to_string(),
                    to_agent: "B".to_string(),
                    index: 2,
                },
                AgentEventGroup::Section {
                    agent_name: "B".to_string(),
                    start_index: 3,
                    end_index: 4,
                },
            ]
        );

        let mut next = 0;
        for g in &groups {
            assert_eq!(g.start_index(), next);
            next = g.end_index() + 1;
        }
        assert_eq!(next, evs.len());
    }

    #[test]
    fn test_single_agent_is_one_group() {
        let evs = events(&[
            r#"{"type":"run.start","run_id":"r","timestamp":1,"agent_name":"solo"}"#,
            r#"{"type":"tool.start","run_id":"r","timestamp":2,"tool_name":"t"}"#,
        ]);
        let groups = analyze_trace(&evs).event_groups;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].agent_name(), Some("solo"));
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_leading_and_trailing_transfers() {
        let evs = events(&[
            r#"{"type":"agent.transfer","run_id":"r","timestamp":1,"from_agent":"A","to_agent":"B"}"#,
            r#"{"type":"tool.start","run_id":"r","timestamp":2,"tool_name":"t"}"#,
            r#"{"type":"agent.transfer","run_id":"r","timestamp":3,"from_agent":"B","to_agent":"C"}"#,
        ]);
        let groups = analyze_trace(&evs).event_groups;
        assert_eq!(groups.len(), 3);
        assert!(groups[0].is_transfer());
        assert_eq!(groups[1].agent_name(), Some("B"));
        assert!(groups[2].is_transfer());
    }

    #[test]
    fn test_agent_named_like_a_marker_is_still_a_section() {
        let evs = events(&[
            r#"{"type":"run.start","run_id":"r","timestamp":1,"agent_name":"__transfer__"}"#,
            r#"{"type":"agent.transfer","run_id":"r","timestamp":2,"from_agent":"__transfer__","to_agent":"B"}"#,
            r#"{"type":"run.end","run_id":"r","timestamp":3}"#,
        ]);
        let groups = analyze_trace(&evs).event_groups;
        assert_eq!(groups[0].agent_name(), Some("__transfer__"));
        assert!(!groups[0].is_transfer());
    }
}
