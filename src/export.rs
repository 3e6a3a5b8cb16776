//! Writing an analyzed trace out as JSON, CSV or a Markdown report.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::analysis::TraceAnalysis;
use crate::error::{Result, WatchtowerError};
use crate::format::{format_duration, format_tokens, iso_timestamp};
use crate::trace::TraceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Defaults to `watchtower-<run_id>-<millis>.<ext>` in the working
    /// directory.
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub path: PathBuf,
    pub size: u64,
}

/// Render without touching the filesystem.
pub fn export_content(
    format: ExportFormat,
    events: &[TraceEvent],
    analysis: &TraceAnalysis,
    exported_at: DateTime<Utc>,
) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(events, analysis, exported_at),
        ExportFormat::Csv => to_csv(events, analysis),
        ExportFormat::Markdown => Ok(to_markdown(events, analysis, exported_at)),
    }
}

pub fn export_trace(
    events: &[TraceEvent],
    analysis: &TraceAnalysis,
    options: &ExportOptions,
) -> Result<ExportResult> {
    let now = Utc::now();
    let content = export_content(options.format, events, analysis, now)?;

    let path = match &options.output_path {
        Some(path) => path.clone(),
        None => default_file_name(&analysis.summary.run_id, options.format, now),
    };
    std::fs::write(&path, content)
        .map_err(|e| WatchtowerError::Export(format!("{}: {e}", path.display())))?;
    let size = std::fs::metadata(&path)?.len();

    tracing::info!(path = %path.display(), size, "exported trace");
    Ok(ExportResult { path, size })
}

fn default_file_name(run_id: &str, format: ExportFormat, now: DateTime<Utc>) -> PathBuf {
    let run_id = if run_id.is_empty() { "trace" } else { run_id };
    Path::new(".").join(format!(
        "watchtower-{run_id}-{}.{}",
        now.timestamp_millis(),
        format.extension()
    ))
}

fn to_json(
    events: &[TraceEvent],
    analysis: &TraceAnalysis,
    exported_at: DateTime<Utc>,
) -> Result<String> {
    let summary = &analysis.summary;
    let events: Vec<Value> = events
        .iter()
        .map(|event| {
            let mut value = serde_json::to_value(event)?;
            if let Value::Object(map) = &mut value {
                map.insert(
                    "timestampFormatted".to_string(),
                    Value::String(iso_timestamp(event.timestamp)),
                );
            }
            Ok(value)
        })
        .collect::<serde_json::Result<_>>()
        .map_err(|e| WatchtowerError::Export(e.to_string()))?;

    let doc = json!({
        "version": "1.0",
        "exportedAt": exported_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "summary": {
            "runId": summary.run_id,
            "agentName": summary.agent_name,
            "startTime": iso_timestamp(summary.start_time),
            "endTime": iso_timestamp(summary.end_time),
            "duration": summary.duration,
            "durationFormatted": format_duration(summary.duration),
            "llmCalls": summary.llm_calls,
            "toolCalls": summary.tool_calls,
            "totalTokens": summary.total_tokens,
            "errors": summary.errors,
            "toolsUsed": summary.tools_used,
        },
        "analysis": {
            "agents": analysis.agents,
            "models": analysis.models,
            "tools": analysis.tools,
        },
        "events": events,
    });
    serde_json::to_string_pretty(&doc).map_err(|e| WatchtowerError::Export(e.to_string()))
}

fn csv_error(e: impl std::fmt::Display) -> WatchtowerError {
    WatchtowerError::Export(format!("csv: {e}"))
}

fn to_csv(events: &[TraceEvent], analysis: &TraceAnalysis) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record([
            "timestamp",
            "type",
            "agent_name",
            "tool_name",
            "model",
            "duration_ms",
            "tokens",
            "error",
        ])
        .map_err(csv_error)?;
    for event in events {
        writer
            .write_record([
                iso_timestamp(event.timestamp),
                event.kind().to_string(),
                event.agent_name().or(event.author()).unwrap_or_default().to_string(),
                event.tool_name().unwrap_or_default().to_string(),
                event.model().unwrap_or_default().to_string(),
                event.duration_ms().map(|d| d.to_string()).unwrap_or_default(),
                event.total_tokens().map(|t| t.to_string()).unwrap_or_default(),
                event.error_message().unwrap_or_default().to_string(),
            ])
            .map_err(csv_error)?;
    }

    writer.write_record(["# Summary"]).map_err(csv_error)?;
    let summary = &analysis.summary;
    for (label, value) in [
        ("Run ID", summary.run_id.clone()),
        ("Agent", summary.agent_name.clone()),
        ("Duration", format_duration(summary.duration)),
        ("LLM Calls", summary.llm_calls.to_string()),
        ("Tool Calls", summary.tool_calls.to_string()),
        ("Total Tokens", summary.total_tokens.to_string()),
        ("Errors", summary.errors.to_string()),
    ] {
        writer.write_record([label, value.as_str()]).map_err(csv_error)?;
    }

    let bytes = writer.into_inner().map_err(csv_error)?;
    String::from_utf8(bytes).map_err(csv_error)
}

fn millis_or_dash(ms: f64) -> String {
    if ms > 0.0 {
        format!("{ms:.0}ms")
    } else {
        "-".to_string()
    }
}

fn to_markdown(events: &[TraceEvent], analysis: &TraceAnalysis, exported_at: DateTime<Utc>) -> String {
    let summary = &analysis.summary;
    let mut out = vec![
        format!("# Trace Report: {}", summary.run_id),
        String::new(),
        format!("*Exported at {}*", exported_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        "| Metric | Value |".to_string(),
        "|--------|-------|".to_string(),
        format!("| Run ID | `{}` |", summary.run_id),
        format!("| Agent | {} |", summary.agent_name),
        format!("| Start Time | {} |", iso_timestamp(summary.start_time)),
        format!("| Duration | {} |", format_duration(summary.duration)),
        format!("| LLM Calls | {} |", summary.llm_calls),
        format!("| Tool Calls | {} |", summary.tool_calls),
        format!("| Total Tokens | {} |", format_tokens(summary.total_tokens)),
        format!("| Errors | {} |", summary.errors),
        String::new(),
    ];

    if !analysis.models.is_empty() {
        out.push("## Models Used".to_string());
        out.push(String::new());
        out.push("| Model | Requests | Tokens | Avg Latency |".to_string());
        out.push("|-------|----------|--------|-------------|".to_string());
        for m in &analysis.models {
            out.push(format!(
                "| {} | {} | {} | {} |",
                m.name,
                m.request_count,
                format_tokens(m.total_tokens),
                millis_or_dash(m.avg_latency_ms)
            ));
        }
        out.push(String::new());
    }

    if !analysis.tools.is_empty() {
        out.push("## Tools Used".to_string());
        out.push(String::new());
        out.push("| Tool | Calls | Success | Errors | Avg Duration |".to_string());
        out.push("|------|-------|---------|--------|--------------|".to_string());
        for t in &analysis.tools {
            out.push(format!(
                "| {} | {} | {} | {} | {} |",
                t.name,
                t.call_count,
                t.success_count,
                t.error_count,
                millis_or_dash(t.avg_duration_ms)
            ));
        }
        out.push(String::new());
    }

    if analysis.has_multiple_agents {
        out.push("## Agents".to_string());
        out.push(String::new());
        out.push("| Agent | Events | LLM Calls | Tool Calls | Tokens |".to_string());
        out.push("|-------|--------|-----------|------------|--------|".to_string());
        for a in &analysis.agents {
            out.push(format!(
                "| {} | {} | {} | {} | {} |",
                a.name,
                a.event_count,
                a.llm_calls,
                a.tool_calls,
                format_tokens(a.tokens)
            ));
        }
        out.push(String::new());
    }

    out.push("## Event Timeline".to_string());
    out.push(String::new());
    out.push("```".to_string());
    let base = events.first().map(|e| e.timestamp).unwrap_or(0.0);
    for event in events {
        let line = format!(
            "[{:.2}s] {:<15} {}",
            event.timestamp - base,
            event.kind().as_str(),
            event.detail()
        );
        out.push(line.trim_end().to_string());
    }
    out.push("```".to_string());
    out.push(String::new());
    out.push("---".to_string());
    out.push("*Generated by Watchtower*".to_string());
    out.join("\n")
}
