//! Human-friendly durations: `"500ms"`, `"10s"`, `"5m"`, `"7d"`, `"1h30m"`.
//!
//! Used for every duration in the config file and for the `ttl` field of
//! create requests.  A leading `-` is accepted by [`parse_signed`] only.

use std::time::Duration;

use crate::errors::{EmberdropError, Result};

/// Parse a non-negative duration string.
pub fn parse(input: &str) -> Result<Duration> {
    let signed = parse_signed(input)?;
    signed
        .to_std()
        .map_err(|_| invalid(input, "duration cannot be negative"))
}

/// Parse a duration string that may start with `-`.
pub fn parse_signed(input: &str) -> Result<chrono::Duration> {
    let trimmed = input.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    if body.is_empty() {
        return Err(invalid(input, "empty duration"));
    }
    if body == "0" {
        return Ok(chrono::Duration::zero());
    }

    let mut total_ms: i64 = 0;
    let mut rest = body;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(invalid(input, "expected a number"));
        }
        let (num_str, tail) = rest.split_at(digits);
        let unit_len = tail.bytes().take_while(u8::is_ascii_alphabetic).count();
        if unit_len == 0 {
            return Err(invalid(input, "missing unit (ms, s, m, h, d)"));
        }
        let (unit, tail) = tail.split_at(unit_len);

        let num: i64 = num_str
            .parse()
            .map_err(|_| invalid(input, "number part is not valid"))?;
        let unit_ms: i64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(invalid(input, "unknown unit, use ms, s, m, h, or d")),
        };

        total_ms = num
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| invalid(input, "duration is too large"))?;
        rest = tail;
    }

    let duration = chrono::Duration::milliseconds(total_ms);
    Ok(if negative { -duration } else { duration })
}

/// Format a duration back into the compact form accepted by [`parse`].
pub fn format(duration: Duration) -> String {
    let mut ms = duration.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in [("d", 86_400_000u128), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)] {
        if ms >= size {
            out.push_str(&format!("{}{unit}", ms / size));
            ms %= size;
        }
    }
    if ms > 0 {
        out.push_str(&format!("{ms}ms"));
    }
    out
}

fn invalid(input: &str, reason: &str) -> EmberdropError {
    EmberdropError::InvalidRequest(format!("invalid duration '{input}': {reason}"))
}

/// Serde helpers so config structs can hold `std::time::Duration` fields
/// written as strings in TOML.
pub mod serde_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}
