//! Human-readable durations (`90s`, `5m`, `1h30m`, `250ms`)

use std::time::Duration;

use crate::error::{Result, config};

/// Parses a sequence of `<number><unit>` pairs; a bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(config::invalid("empty duration"));
    }
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid(input));
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid(input))?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            _ => return Err(invalid(input)),
        };
        total += unit;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

/// [`parse_duration`] shaped for clap's `value_parser`.
pub fn parse_duration_arg(input: &str) -> std::result::Result<Duration, String> {
    parse_duration(input).map_err(|e| e.to_string())
}

fn invalid(input: &str) -> crate::error::GroundworkError {
    config::invalid(format!(
        "invalid duration '{input}', expected e.g. 30s, 5m or 1h30m"
    ))
}
