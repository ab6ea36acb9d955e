use std::time::Duration;

use crate::error::{HeraldError, Result};

/// Parse a duration string such as `"500ms"`, `"1.5s"` or `"1h30m"`.
///
/// Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.
/// A bare `"0"` is accepted; any other number needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(HeraldError::Config("empty duration".to_string()));
    }
    if s.starts_with('-') {
        return Err(HeraldError::Config(format!("negative duration {:?}", input)));
    }

    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || HeraldError::Config(format!("invalid duration {:?}", input));

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => {
                return Err(HeraldError::Config(format!(
                    "missing unit in duration {:?}",
                    input
                )))
            }
            unit => {
                return Err(HeraldError::Config(format!(
                    "unknown unit {:?} in duration {:?}",
                    unit, input
                )))
            }
        };
        nanos += value * scale;
        rest = &rest[unit_end..];
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(invalid());
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}
