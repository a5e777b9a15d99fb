//! Go-style duration strings ("30m", "1h30m", "1.5s", "250ms")

use std::time::Duration;

use crate::Error;

fn unit_nanos(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1.0),
        "us" | "µs" => Some(1e3),
        "ms" => Some(1e6),
        "s" => Some(1e9),
        "m" => Some(60.0 * 1e9),
        "h" => Some(3600.0 * 1e9),
        _ => None,
    }
}

/// Parse a Go-style duration string.
///
/// A duration is a sequence of decimal numbers, each with a unit suffix
/// (`ns`, `us`, `ms`, `s`, `m`, `h`). Negative durations are rejected.
pub fn parse_duration(s: &str) -> Result<Duration, Error> {
    let input = s.trim();
    if input.is_empty() {
        return Err(Error::validation("duration cannot be empty"));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut remaining = input;
    let mut nanos = 0f64;
    while !remaining.is_empty() {
        let num_end = remaining
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(remaining.len());
        if num_end == 0 {
            return Err(Error::validation(format!(
                "invalid duration '{input}': expected a number"
            )));
        }
        let value: f64 = remaining[..num_end]
            .parse()
            .map_err(|_| Error::validation(format!("invalid duration '{input}'")))?;
        remaining = &remaining[num_end..];

        let unit_end = remaining
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(remaining.len());
        let unit = &remaining[..unit_end];
        let scale = unit_nanos(unit).ok_or_else(|| {
            Error::validation(format!("invalid duration '{input}': unknown unit '{unit}'"))
        })?;
        remaining = &remaining[unit_end..];

        nanos += value * scale;
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}
