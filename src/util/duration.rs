//! Duration parser for CLI arguments.
//!
//! Supports:
//! - Plain seconds: `10`
//! - Suffixed: `500ms`, `30s`, `5m`, `1h`, `2d`, `1w`

use std::time::Duration;

/// Error type for duration parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to parse duration '{}': {}",
            self.input, self.message
        )
    }
}

impl std::error::Error for DurationParseError {}

/// Parse a duration string.
///
/// # Examples
///
/// ```
/// use perfcollector::util::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();
    let err = |message: &str| DurationParseError {
        input: input.to_string(),
        message: message.to_string(),
    };

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number_str, unit) = input.split_at(split);
    if number_str.is_empty() {
        return Err(err("expected a number, e.g. 10s, 500ms, 5m"));
    }
    let number: u64 = number_str.parse().map_err(|_| err("number out of range"))?;

    let multiplier_ms: u64 = match unit {
        "ms" => 1,
        "" | "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(err("unknown unit (use ms, s, m, h, d or w)")),
    };

    number
        .checked_mul(multiplier_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| err("duration out of range"))
}
