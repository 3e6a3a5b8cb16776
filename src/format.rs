//! Display formatting shared by the TUI and exporters.

use serde::{Deserialize, Serialize};

/// How event timestamps are rendered in lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampFormat {
    /// `+1250ms` from the first event.
    #[default]
    Relative,
    /// Wall clock `HH:MM:SS.mmm` (UTC).
    Absolute,
    /// Raw seconds with millisecond precision.
    Unix,
}

/// Rounds to whole milliseconds before splitting into units, so a carry
/// never produces `60s` or `1000ms`.
pub fn format_duration(ms: f64) -> String {
    let ms = ms.max(0.0).round() as u64;
    if ms < 1000 {
        return format!("{ms}ms");
    }
    let tenths = (ms + 50) / 100;
    if tenths < 600 {
        return format!("{}.{}s", tenths / 10, tenths % 10);
    }
    let seconds = (ms + 500) / 1000;
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Thousands-separated token count, e.g. `12,345`.
pub fn format_tokens(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `timestamp` and `reference` are seconds since the epoch.
pub fn format_timestamp(timestamp: f64, format: TimestampFormat, reference: f64) -> String {
    match format {
        TimestampFormat::Unix => format!("{timestamp:.3}"),
        TimestampFormat::Absolute => {
            let millis = (timestamp * 1000.0).round() as i64;
            match chrono::DateTime::from_timestamp_millis(millis) {
                Some(dt) => dt.format("%H:%M:%S%.3f").to_string(),
                None => format!("{timestamp:.3}"),
            }
        }
        TimestampFormat::Relative => {
            let delta_ms = ((timestamp - reference) * 1000.0).round();
            if delta_ms < 0.0 {
                format!("-{}ms", delta_ms.abs())
            } else {
                format!("+{delta_ms}ms")
            }
        }
    }
}

/// RFC 3339 rendering of an epoch-seconds timestamp.
pub fn iso_timestamp(timestamp: f64) -> String {
    let millis = (timestamp * 1000.0).round() as i64;
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_default()
}
