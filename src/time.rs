//! Time string grammar for CLI flags: `<number>[unit]`, unit in `{s,m,h,d}`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("invalid time format: '{0}'. Use format like '5s', '2.5m', '1h', '0.5d'")]
    BadFormat(String),
    #[error("time value must be non-negative: '{0}'")]
    Negative(String),
    #[error("invalid time unit: '{0}'. Use 's', 'm', 'h', or 'd'")]
    BadUnit(String),
}

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?\d+\.?\d*)\s*([a-zA-Z]?)$").expect("valid time regex"));

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "s" => Some(1.0),
        "m" => Some(60.0),
        "h" => Some(3600.0),
        "d" => Some(86400.0),
        _ => None,
    }
}

/// Parses a time string to seconds. `default_unit` is used when the string carries no unit.
pub fn parse_time_seconds(value: &str, default_unit: &str) -> Result<f64, TimeParseError> {
    let value = value.trim();

    let caps = TIME_RE
        .captures(value)
        .ok_or_else(|| TimeParseError::BadFormat(value.to_string()))?;

    let number: f64 = caps[1]
        .parse()
        .map_err(|_| TimeParseError::BadFormat(value.to_string()))?;

    if number < 0.0 {
        return Err(TimeParseError::Negative(value.to_string()));
    }

    let unit = if caps[2].is_empty() {
        default_unit.to_ascii_lowercase()
    } else {
        caps[2].to_ascii_lowercase()
    };

    let factor = unit_seconds(&unit).ok_or_else(|| TimeParseError::BadUnit(unit.clone()))?;

    Ok(number * factor)
}

/// Convenience wrapper returning a `Duration`, truncating sub-millisecond precision.
pub fn parse_time(value: &str, default_unit: &str) -> Result<Duration, TimeParseError> {
    let seconds = parse_time_seconds(value, default_unit)?;
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_seconds() {
        assert_eq!(parse_time_seconds("5s", "s").unwrap(), 5.0);
    }

    #[test]
    fn fractional_minutes() {
        assert_eq!(parse_time_seconds("2.5m", "s").unwrap(), 150.0);
    }

    #[test]
    fn default_unit_used_when_absent() {
        assert_eq!(parse_time_seconds("0", "s").unwrap(), 0.0);
    }

    #[test]
    fn negative_is_error() {
        assert!(matches!(
            parse_time_seconds("-5s", "s"),
            Err(TimeParseError::Negative(_))
        ));
    }

    #[test]
    fn unknown_unit_is_error() {
        assert!(matches!(
            parse_time_seconds("5x", "s"),
            Err(TimeParseError::BadUnit(_))
        ));
    }

    #[test]
    fn garbage_is_error() {
        assert!(matches!(
            parse_time_seconds("abc", "s"),
            Err(TimeParseError::BadFormat(_))
        ));
    }

    #[test]
    fn default_unit_minutes() {
        assert_eq!(parse_time_seconds("2", "m").unwrap(), 120.0);
    }
}
