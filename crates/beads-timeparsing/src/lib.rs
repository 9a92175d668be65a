//! Parses the time expressions accepted by CLI flags that take a future
//! point in time: either a relative duration (`3d`, `2w`, `6h`) measured
//! from now, or an absolute date/timestamp (`2025-06-01`, full RFC3339).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeParseError {
    #[error("empty time expression")]
    Empty,
    #[error("unrecognized time expression '{0}': expected a relative duration (e.g. '3d', '2w') or an absolute date/timestamp")]
    Unrecognized(String),
    #[error("duration amount in '{0}' must be a positive integer")]
    InvalidAmount(String),
}

/// Parses `expr` relative to `now`, so callers can get deterministic results
/// in tests instead of depending on the wall clock.
pub fn parse_relative_to(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeParseError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(TimeParseError::Empty);
    }

    if let Some(duration) = parse_duration(expr)? {
        return Ok(now + duration);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(expr) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        return Ok(date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc());
    }

    Err(TimeParseError::Unrecognized(expr.to_string()))
}

/// Convenience wrapper anchored at the real current time.
pub fn parse_relative(expr: &str) -> Result<DateTime<Utc>, TimeParseError> {
    parse_relative_to(expr, Utc::now())
}

/// Recognizes a trailing single-letter unit (`m`inute, `h`our, `d`ay,
/// `w`eek) preceded by a positive integer. Returns `Ok(None)` when `expr`
/// doesn't look like a duration at all, so callers can fall through to
/// absolute-date parsing instead of treating it as an error.
fn parse_duration(expr: &str) -> Result<Option<Duration>, TimeParseError> {
    let Some(unit) = expr.chars().last() else {
        return Ok(None);
    };
    if !matches!(unit, 'm' | 'h' | 'd' | 'w') {
        return Ok(None);
    }
    let amount_str = &expr[..expr.len() - unit.len_utf8()];
    if amount_str.is_empty() || !amount_str.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }
    let amount: i64 = amount_str
        .parse()
        .map_err(|_| TimeParseError::InvalidAmount(expr.to_string()))?;
    if amount <= 0 {
        return Err(TimeParseError::InvalidAmount(expr.to_string()));
    }

    Ok(Some(match unit {
        'm' => Duration::minutes(amount),
        'h' => Duration::hours(amount),
        'd' => Duration::days(amount),
        'w' => Duration::weeks(amount),
        _ => unreachable!(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn relative_days_adds_to_anchor() {
        let result = parse_relative_to("3d", anchor()).unwrap();
        assert_eq!(result, anchor() + Duration::days(3));
    }

    #[test]
    fn relative_weeks_and_hours_parse() {
        assert_eq!(
            parse_relative_to("2w", anchor()).unwrap(),
            anchor() + Duration::weeks(2)
        );
        assert_eq!(
            parse_relative_to("6h", anchor()).unwrap(),
            anchor() + Duration::hours(6)
        );
    }

    #[test]
    fn absolute_date_ignores_anchor() {
        let result = parse_relative_to("2025-12-25", anchor()).unwrap();
        assert_eq!(result.date_naive(), NaiveDate::from_ymd_opt(2025, 12, 25).unwrap());
    }

    #[test]
    fn zero_or_negative_amount_is_an_error() {
        assert!(parse_relative_to("0d", anchor()).is_err());
    }

    #[test]
    fn unrecognized_expression_is_an_error() {
        assert!(parse_relative_to("soonish", anchor()).is_err());
    }

    #[test]
    fn empty_expression_is_an_error() {
        assert!(matches!(parse_relative_to("", anchor()), Err(TimeParseError::Empty)));
    }
}
