//! Live tail of a running agent process.
//!
//! A [`LiveSession`] owns one child process and a reader task. Every stdout
//! line is parsed, folded into [`LiveStats`] and forwarded as a
//! [`LiveMessage`] on the session's channel, in the order it was written.

pub mod feed;

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::WatchtowerError;
use crate::trace::parser::is_ignorable;
use crate::trace::{parse_live_line, EventPayload, TraceEvent};

pub use feed::LiveFeed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Stopped | ProcessStatus::Error)
    }

    fn can_become(&self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Starting, Running) | (Running, Stopped) | (Starting, Error) | (Running, Error)
        )
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Starting => write!(f, "starting"),
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Stopped => write!(f, "stopped"),
            ProcessStatus::Error => write!(f, "error"),
        }
    }
}

/// Counters kept while tailing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveStats {
    /// Seconds since the epoch when the session started.
    pub start_time: f64,
    /// Milliseconds from session start to the most recent event.
    pub duration_ms: f64,
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub tokens: u64,
    pub errors: u64,
    /// Non-blank lines that were neither JSON-RPC nor a bare event.
    pub parse_errors: u64,
}

impl LiveStats {
    /// Same counting rules as the batch summary.
    pub fn record(&mut self, event: &TraceEvent) {
        match &event.payload {
            EventPayload::LlmResponse(e) => {
                self.llm_calls += 1;
                self.tokens += e.total_tokens.unwrap_or(0);
            }
            EventPayload::ToolStart(_) => self.tool_calls += 1,
            EventPayload::ToolError(_) => self.errors += 1,
            _ => {}
        }
    }
}

/// What the reader task tells its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    Status {
        status: ProcessStatus,
        error: Option<String>,
    },
    Stats(LiveStats),
    Event(TraceEvent),
}

/// How the child went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// The exit followed our own stop request.
    pub stop_requested: bool,
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
            stop_requested: false,
        }
    }
}

#[cfg(unix)]
fn is_sigterm(signal: i32) -> bool {
    signal == nix::sys::signal::Signal::SIGTERM as i32
}

#[cfg(not(unix))]
fn is_sigterm(_signal: i32) -> bool {
    false
}

/// Lifecycle state machine plus running stats, independent of any process.
#[derive(Debug)]
pub struct Reconciler {
    status: ProcessStatus,
    error: Option<String>,
    stats: LiveStats,
    started: Instant,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            status: ProcessStatus::Starting,
            error: None,
            stats: LiveStats {
                start_time,
                ..LiveStats::default()
            },
            started: Instant::now(),
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn stats(&self) -> &LiveStats {
        &self.stats
    }

    pub fn status_message(&self) -> LiveMessage {
        LiveMessage::Status {
            status: self.status,
            error: self.error.clone(),
        }
    }

    /// Apply a transition if the state machine allows it. Returns whether the
    /// status changed.
    fn transition(&mut self, next: ProcessStatus, error: Option<String>) -> bool {
        if !self.status.can_become(next) {
            return false;
        }
        tracing::info!(from = %self.status, to = %next, "live session status");
        self.status = next;
        self.error = error;
        true
    }

    pub fn on_spawned(&mut self) -> bool {
        self.started = Instant::now();
        self.transition(ProcessStatus::Running, None)
    }

    pub fn on_spawn_failed(&mut self, message: impl Into<String>) -> bool {
        self.transition(ProcessStatus::Error, Some(message.into()))
    }

    pub fn on_exit(&mut self, outcome: ExitOutcome) -> bool {
        let clean = outcome.stop_requested
            || outcome.code == Some(0)
            || outcome.signal.is_some_and(is_sigterm);
        if clean {
            return self.transition(ProcessStatus::Stopped, None);
        }
        let message = match (outcome.code, outcome.signal) {
            (Some(code), _) => format!("Process exited with code {code}"),
            (None, Some(signal)) => format!("Process terminated by signal {signal}"),
            (None, None) => "Process exited with code unknown".to_string(),
        };
        self.transition(ProcessStatus::Error, Some(message))
    }

    /// Parse one stdout line and fold it into the stats.
    pub fn handle_line(&mut self, line: &str) -> Option<TraceEvent> {
        let Some(event) = parse_live_line(line) else {
            if !is_ignorable(line.trim()) {
                self.stats.parse_errors += 1;
            }
            return None;
        };
        self.stats.record(&event);
        self.stats.duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        Some(event)
    }
}

/// Short id handed to the child as `WATCHTOWER_RUN_ID`.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[derive(Debug, Default)]
struct Control {
    paused: AtomicBool,
    stop_requested: AtomicBool,
    stop_signal: Notify,
}

/// Handle to one tailed process. Dropping it kills the child.
#[derive(Debug)]
pub struct LiveSession {
    run_id: String,
    control: Arc<Control>,
    task: JoinHandle<()>,
}

impl LiveSession {
    /// Spawn `command` and start streaming its stdout into `tx`. Must be
    /// called from within a tokio runtime. Spawn failures arrive on `tx` as an
    /// `Error` status rather than as a return value.
    pub fn spawn(command: Vec<String>, tx: mpsc::UnboundedSender<LiveMessage>) -> Self {
        let run_id = new_run_id();
        let control = Arc::new(Control::default());
        let task = tokio::spawn(drive(command, run_id.clone(), Arc::clone(&control), tx));
        Self {
            run_id,
            control,
            task,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::SeqCst)
    }

    /// While paused, incoming lines are discarded, not queued.
    pub fn set_paused(&self, paused: bool) {
        self.control.paused.store(paused, Ordering::SeqCst);
    }

    pub fn toggle_pause(&self) -> bool {
        !self.control.paused.fetch_xor(true, Ordering::SeqCst)
    }

    /// Ask the child to terminate. The resulting exit is reported as
    /// `Stopped`, and no further events are emitted.
    pub fn stop(&self) {
        if !self.control.stop_requested.swap(true, Ordering::SeqCst) {
            self.control.stop_signal.notify_one();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        // The child is spawned with kill_on_drop, so aborting the task reaps it.
        self.task.abort();
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::warn!(pid, error = %e, "failed to send SIGTERM");
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "failed to kill child process");
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(target: "watchtower::child", "{line}");
    }
}

async fn drive(
    command: Vec<String>,
    run_id: String,
    control: Arc<Control>,
    tx: mpsc::UnboundedSender<LiveMessage>,
) {
    let mut reconciler = Reconciler::new();
    let _ = tx.send(reconciler.status_message());

    let Some((program, args)) = command.split_first() else {
        reconciler.on_spawn_failed(WatchtowerError::EmptyCommand.to_string());
        let _ = tx.send(reconciler.status_message());
        return;
    };

    let mut child = match Command::new(program)
        .args(args)
        .env("PYTHONUNBUFFERED", "1")
        .env("WATCHTOWER_LIVE", "1")
        .env("WATCHTOWER_RUN_ID", &run_id)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(program = %program, error = %e, "failed to spawn traced process");
            let err = WatchtowerError::Spawn {
                command: program.clone(),
                message: e.to_string(),
            };
            reconciler.on_spawn_failed(err.to_string());
            let _ = tx.send(reconciler.status_message());
            return;
        }
    };

    reconciler.on_spawned();
    let _ = tx.send(reconciler.status_message());
    tracing::info!(run_id = %run_id, pid = ?child.id(), "tailing process");

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(log_stderr(stderr));
    }

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        let mut signalled = false;
        loop {
            tokio::select! {
                _ = control.stop_signal.notified(), if !signalled => {
                    signalled = true;
                    terminate(&mut child);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if control.stop_requested.load(Ordering::SeqCst)
                            || control.paused.load(Ordering::SeqCst)
                        {
                            continue;
                        }
                        let skipped = reconciler.stats().parse_errors;
                        match reconciler.handle_line(&line) {
                            Some(event) => {
                                let _ = tx.send(LiveMessage::Stats(reconciler.stats().clone()));
                                let _ = tx.send(LiveMessage::Event(event));
                            }
                            None if reconciler.stats().parse_errors != skipped => {
                                let _ = tx.send(LiveMessage::Stats(reconciler.stats().clone()));
                            }
                            None => {}
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdout read failed");
                        break;
                    }
                }
            }
        }
    }

    match child.wait().await {
        Ok(status) => {
            let mut outcome = ExitOutcome::from(status);
            outcome.stop_requested = control.stop_requested.load(Ordering::SeqCst);
            reconciler.on_exit(outcome);
        }
        Err(e) => {
            reconciler.on_spawn_failed(format!("failed to wait for process: {e}"));
        }
    }
    if reconciler.stats().parse_errors > 0 {
        tracing::warn!(skipped = reconciler.stats().parse_errors, "live lines could not be parsed");
    }
    let _ = tx.send(reconciler.status_message());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(code: Option<i32>, signal: Option<i32>) -> ExitOutcome {
        ExitOutcome {
            code,
            signal,
            stop_requested: false,
        }
    }

    #[test]
    fn test_clean_lifecycle() {
        let mut r = Reconciler::new();
        assert_eq!(r.status(), ProcessStatus::Starting);
        assert!(r.on_spawned());
        assert_eq!(r.status(), ProcessStatus::Running);
        assert!(r.on_exit(exit(Some(0), None)));
        assert_eq!(r.status(), ProcessStatus::Stopped);
        assert!(r.error().is_none());
    }

    #[test]
    fn test_spawn_failure_skips_running() {
        let mut r = Reconciler::new();
        assert!(r.on_spawn_failed("No such file or directory"));
        assert_eq!(r.status(), ProcessStatus::Error);
        assert!(!r.on_spawned());
        assert_eq!(r.status(), ProcessStatus::Error);
        assert_eq!(r.error(), Some("No such file or directory"));
    }

    #[test]
    fn test_nonzero_exit_is_error() {
        let mut r = Reconciler::new();
        r.on_spawned();
        r.on_exit(exit(Some(2), None));
        assert_eq!(r.status(), ProcessStatus::Error);
        assert_eq!(r.error(), Some("Process exited with code 2"));
    }

    #[test]
    fn test_requested_stop_is_not_an_error() {
        let mut r = Reconciler::new();
        r.on_spawned();
        r.on_exit(ExitOutcome {
            code: Some(1),
            signal: None,
            stop_requested: true,
        });
        assert_eq!(r.status(), ProcessStatus::Stopped);
    }

    #[cfg(unix)]
    #[test]
    fn test_sigterm_exit_is_stopped() {
        let mut r = Reconciler::new();
        r.on_spawned();
        r.on_exit(exit(None, Some(15)));
        assert_eq!(r.status(), ProcessStatus::Stopped);
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut r = Reconciler::new();
        r.on_spawned();
        r.on_exit(exit(Some(0), None));
        assert!(!r.on_spawn_failed("late"));
        assert!(!r.on_exit(exit(Some(9), None)));
        assert_eq!(r.status(), ProcessStatus::Stopped);
    }

    #[test]
    fn test_handle_line_updates_stats() {
        let mut r = Reconciler::new();
        r.on_spawned();
        let lines = [
            r#"{"jsonrpc":"2.0","method":"event","params":{"type":"llm.response","run_id":"r","timestamp":1,"total_tokens":12}}"#,
            r#"{"type":"tool.start","run_id":"r","timestamp":2,"tool_name":"x"}"#,
            r#"{"type":"tool.error","run_id":"r","timestamp":3,"tool_name":"x"}"#,
            "Loading model weights...",
            "",
        ];
        let parsed: Vec<_> = lines.iter().filter_map(|l| r.handle_line(l)).collect();
        assert_eq!(parsed.len(), 3);
        let stats = r.stats();
        assert_eq!(stats.llm_calls, 1);
        assert_eq!(stats.tokens, 12);
        assert_eq!(stats.tool_calls, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.parse_errors, 1);
        assert!(stats.duration_ms >= 0.0);
    }

    #[test]
    fn test_run_id_is_short() {
        let id = new_run_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
