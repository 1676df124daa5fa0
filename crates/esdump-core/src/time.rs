//! Durations in the store's time-unit grammar (`500ms`, `30s`, `10m`, `1h`, `1d`).

use std::time::Duration;

use crate::{Error, Result};

const UNITS: &[(&str, u64)] = &[
    ("d", 86_400_000),
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

/// Parses a duration such as `10m` or `500ms`.
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    let invalid = || {
        Error::configuration_invalid().with_message(format!(
            "invalid duration '{input}', expected e.g. 500ms, 30s, 10m, 1h or 1d"
        ))
    };

    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        let seconds: u64 = input.parse().map_err(|_| invalid())?;
        return Ok(Duration::from_secs(seconds));
    }

    humantime::parse_duration(input).map_err(|err| invalid().with_source(err))
}

/// Formats a duration using the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis() as u64;
    if millis == 0 {
        return "0ms".to_owned();
    }

    UNITS
        .iter()
        .find(|(_, unit)| millis % unit == 0)
        .map(|(name, unit)| format!("{}{}", millis / unit, name))
        .unwrap_or_else(|| format!("{millis}ms"))
}
