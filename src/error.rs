use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchtowerError>;

/// Errors surfaced to the user. Malformed trace lines are never errors; they
/// are counted and skipped by the parser.
#[derive(Debug, Error)]
pub enum WatchtowerError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace file not found: {}", .0.display())]
    TraceNotFound(PathBuf),

    #[error("invalid config file {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("no command specified")]
    EmptyCommand,

    #[error("failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("export failed: {0}")]
    Export(String),
}

impl WatchtowerError {
    /// Stable code shown next to the message. WT1xx trace files, WT3xx
    /// configuration, WT4xx processes, WT5xx export.
    pub fn code(&self) -> &'static str {
        match self {
            WatchtowerError::TraceNotFound(_) => "WT102",
            WatchtowerError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => "WT106",
            WatchtowerError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                "WT107"
            }
            WatchtowerError::Io(_) => "WT100",
            WatchtowerError::Config { .. } => "WT301",
            WatchtowerError::EmptyCommand => "WT400",
            WatchtowerError::Spawn { .. } => "WT401",
            WatchtowerError::Export(_) => "WT501",
        }
    }

    pub fn hints(&self) -> Vec<String> {
        match self {
            WatchtowerError::TraceNotFound(_) => vec![
                "Check the path to the .jsonl trace file".to_string(),
                "The trace may have been removed by retention cleanup".to_string(),
            ],
            WatchtowerError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => vec![
                "Check file permissions on the trace directory".to_string(),
            ],
            WatchtowerError::Io(_) => vec!["The file may have been moved or deleted".to_string()],
            WatchtowerError::Config { path, .. } => vec![
                format!("Fix or delete {}", path.display()),
                "Run `watchtower config --init` to write defaults".to_string(),
            ],
            WatchtowerError::EmptyCommand => {
                vec!["Usage: watchtower tail -- python agent.py".to_string()]
            }
            WatchtowerError::Spawn { command, .. } => vec![
                format!("Ensure '{command}' is installed and in your PATH"),
                "Try using the full path to the executable".to_string(),
            ],
            WatchtowerError::Export(_) => {
                vec!["Check that the output directory exists and is writable".to_string()]
            }
        }
    }

    /// Multi-line rendering used by the CLI before exiting.
    pub fn render(&self) -> String {
        let mut out = format!("Error [{}]: {}", self.code(), self);
        let hints = self.hints();
        if !hints.is_empty() {
            out.push_str("\n\nPossible solutions:");
            for hint in hints {
                out.push_str("\n  - ");
                out.push_str(&hint);
            }
        }
        out
    }
}
