pub mod event;
pub mod parser;

pub use event::{
    is_valid_event, AgentTransfer, EventKind, EventPayload, LlmRequest, LlmResponse, RunEnd,
    RunStart, RunSummaryData, StateChange, ToolEnd, ToolError, ToolOutcome, ToolStart, TraceEvent,
};
pub use parser::{
    parse_json_rpc, parse_line, parse_live_line, parse_trace_file, parse_trace_reader,
    ParsedTrace,
};
