//! Go-style duration strings (`"600s"`, `"10m"`, `"1h30m"`, `"1.5s"`).
//!
//! Cluster API resources carry timeouts in the format produced by Go's
//! `time.Duration`. These helpers plug into serde with
//! `#[serde(with = "crate::duration")]` or, for optional fields,
//! `#[serde(with = "crate::duration::option")]`.

use serde::{de, Deserialize, Deserializer, Serializer};
use std::time::Duration;

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3600 * 1_000_000_000),
];

/// Parse a Go-style duration string.
///
/// A bare `"0"` is accepted; every other value needs a unit on each
/// component. Negative durations are rejected.
pub fn parse(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(format!("negative duration '{input}'"));
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);

    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{input}'"))?;
        if number_len == 0 {
            return Err(format!("expected number in duration '{input}'"));
        }
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| format!("unknown unit '{unit}' in duration '{input}'"))?;

        let component = scaled(number, scale)
            .ok_or_else(|| format!("invalid number '{number}' in duration '{input}'"))?;
        total_nanos = total_nanos
            .checked_add(component)
            .ok_or_else(|| format!("duration '{input}' overflows"))?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| format!("duration '{input}' overflows"))?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let nanos = whole.checked_mul(scale)?;

    let mut divisor: u128 = 1;
    let mut fraction_value: u128 = 0;
    for digit in fraction.chars().take(18) {
        fraction_value = fraction_value * 10 + u128::from(digit.to_digit(10)?);
        divisor *= 10;
    }
    nanos.checked_add(fraction_value * scale / divisor)
}

/// Format a duration the way Go prints `time.Duration` for whole units,
/// e.g. `"10m0s"`, `"1h30m0s"`, `"1.5s"`, `"250ms"`.
pub fn format(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    let total = duration.as_secs();
    let nanos = duration.subsec_nanos();
    if total == 0 {
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}µs", nanos / 1_000)
        } else {
            format!("{nanos}ns")
        };
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if nanos == 0 {
        out.push_str(&format!("{seconds}s"));
    } else {
        let fraction = format!("{nanos:09}");
        out.push_str(&format!("{seconds}.{}s", fraction.trim_end_matches('0')));
    }
    out
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(*duration))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(de::Error::custom)
}

/// Serde helpers for `Option<Duration>` fields.
pub mod option {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&super::format(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse(&raw).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_go_durations() {
        assert_eq!(parse("600s").unwrap(), Duration::from_secs(600));
        assert_eq!(parse("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse("10m0s").unwrap(), Duration::from_secs(600));
        assert_eq!(parse("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse("3us").unwrap(), Duration::from_micros(3));
        assert_eq!(parse("0").unwrap(), Duration::ZERO);
        assert_eq!(parse("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("10").is_err());
        assert!(parse("-5s").is_err());
        assert!(parse("5 parsecs").is_err());
        assert!(parse("s").is_err());
        assert!(parse("1x").is_err());
    }

    #[test]
    fn test_parse_rejects_overflow() {
        let err = parse("340282366920938463463374607431768211455ns1ns").unwrap_err();
        assert!(err.contains("overflows"), "{err}");
        assert!(parse("99999999999999999999999999999999999999999h").is_err());
        assert!(parse("18446744073709551616s").is_err());
    }

    #[test]
    fn test_format_matches_go() {
        assert_eq!(format(Duration::ZERO), "0s");
        assert_eq!(format(Duration::from_secs(600)), "10m0s");
        assert_eq!(format(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(format(Duration::from_secs(42)), "42s");
        assert_eq!(format(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn test_formatted_value_parses_back() {
        for secs in [1, 59, 61, 3600, 3661, 86_400] {
            let d = Duration::from_secs(secs);
            assert_eq!(parse(&format(d)).unwrap(), d);
        }
    }
}
