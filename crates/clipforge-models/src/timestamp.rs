//! Timestamp parsing and formatting.
//!
//! The selection model returns `HH:MM:SS`-style strings; everything
//! downstream works in seconds. Supports `HH:MM:SS[.mmm]`, `MM:SS[.mmm]`,
//! and bare `SS[.mmm]`.

use thiserror::Error;

/// Upper bound on accepted timestamps (24 hours).
pub const MAX_SOURCE_DURATION_SECS: f64 = 86_400.0;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,

    #[error("invalid timestamp component '{0}'")]
    InvalidComponent(String),

    #[error("invalid timestamp format '{0}'")]
    InvalidFormat(String),

    #[error("timestamp {0:.1}s exceeds the maximum supported duration")]
    TooLarge(f64),
}

/// Parse a timestamp string into seconds.
///
/// ```
/// use clipforge_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90.5").unwrap(), 90.5);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    let mut total = 0.0f64;
    for part in &parts {
        let value: f64 = part
            .parse()
            .map_err(|_| TimestampError::InvalidComponent(part.to_string()))?;
        if value < 0.0 {
            return Err(TimestampError::InvalidComponent(part.to_string()));
        }
        total = total * 60.0 + value;
    }

    if total > MAX_SOURCE_DURATION_SECS {
        return Err(TimestampError::TooLarge(total));
    }

    Ok(total)
}

/// Format seconds as `HH:MM:SS` (or `HH:MM:SS.mmm` when fractional).
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0005 {
        format!("{hours:02}:{mins:02}:{secs:06.3}")
    } else {
        format!("{hours:02}:{mins:02}:{:02}", secs.floor() as u32)
    }
}
