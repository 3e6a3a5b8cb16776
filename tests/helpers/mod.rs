#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

/// A bare event line with `run_id` "run-1".
pub fn event(kind: &str, timestamp: f64, extra: &str) -> String {
    let extra = if extra.is_empty() {
        String::new()
    } else {
        format!(",{extra}")
    };
    format!(r#"{{"type":"{kind}","run_id":"run-1","timestamp":{timestamp}{extra}}}"#)
}

pub fn run_start(timestamp: f64, agent: &str) -> String {
    event("run.start", timestamp, &format!(r#""agent_name":"{agent}""#))
}

pub fn run_end(timestamp: f64) -> String {
    event("run.end", timestamp, "")
}

pub fn llm_request(timestamp: f64, model: &str) -> String {
    event("llm.request", timestamp, &format!(r#""model":"{model}""#))
}

pub fn llm_response(timestamp: f64, model: &str, tokens: u64, duration_ms: f64) -> String {
    event(
        "llm.response",
        timestamp,
        &format!(r#""model":"{model}","total_tokens":{tokens},"duration_ms":{duration_ms}"#),
    )
}

pub fn tool_start(timestamp: f64, tool: &str) -> String {
    event("tool.start", timestamp, &format!(r#""tool_name":"{tool}""#))
}

pub fn tool_end(timestamp: f64, tool: &str, duration_ms: f64, success: bool) -> String {
    event(
        "tool.end",
        timestamp,
        &format!(r#""tool_name":"{tool}","duration_ms":{duration_ms},"success":{success}"#),
    )
}

pub fn tool_error(timestamp: f64, tool: &str, message: &str) -> String {
    event(
        "tool.error",
        timestamp,
        &format!(r#""tool_name":"{tool}","error_type":"ToolError","error_message":"{message}""#),
    )
}

pub fn transfer(timestamp: f64, from: &str, to: &str) -> String {
    event(
        "agent.transfer",
        timestamp,
        &format!(r#""from_agent":"{from}","to_agent":"{to}""#),
    )
}

/// Wrap a bare event line in a JSON-RPC notification.
pub fn rpc(line: &str) -> String {
    format!(r#"{{"jsonrpc":"2.0","method":"event","params":{line}}}"#)
}

/// A realistic two-agent trace with one failing tool.
pub fn sample_trace() -> Vec<String> {
    vec![
        "# watchtower trace v1".to_string(),
        run_start(100.0, "planner"),
        llm_request(100.1, "gpt-4o"),
        llm_response(100.9, "gpt-4o", 1200, 800.0),
        tool_start(101.0, "search"),
        tool_end(101.4, "search", 400.0, true),
        transfer(101.5, "planner", "coder"),
        llm_request(101.6, "claude-sonnet"),
        llm_response(102.6, "claude-sonnet", 800, 1000.0),
        tool_start(102.7, "write_file"),
        tool_error(102.9, "write_file", "permission denied"),
        "this line is not json".to_string(),
        String::new(),
        run_end(103.0),
    ]
}

pub fn write_jsonl(lines: &[String]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    f.flush().unwrap();
    f
}
