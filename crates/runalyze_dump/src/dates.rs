//! Parsing of the `--until` / `--since` arguments into a validated [`DateWindow`].

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use runalyze_client::utils::monday_on_or_after;

use crate::error::{DumpError, DumpResult};
use crate::types::DateWindow;

static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)([ywdm])$").expect("relative duration pattern is valid"));
static YEAR_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("year-month pattern is valid"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})$").expect("year pattern is valid"));

pub const DEFAULT_SINCE: &str = "4w";

const INVALID_DATE: &str = "invalid date format. Use YYYY-MM-DD, YYYY-MM, or YYYY";

/// Parse `YYYY-MM-DD`, `YYYY-MM` (last day of month) or `YYYY` (31 December).
pub fn parse_calendar_date(raw: &str) -> DumpResult<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Some(caps) = YEAR_MONTH_RE.captures(raw) {
        let year: i32 = caps[1].parse().map_err(|_| DumpError::validation(INVALID_DATE))?;
        let month: u32 = caps[2].parse().map_err(|_| DumpError::validation(INVALID_DATE))?;
        return last_day_of_month(year, month).ok_or_else(|| DumpError::validation(INVALID_DATE));
    }
    if let Some(caps) = YEAR_RE.captures(raw) {
        let year: i32 = caps[1].parse().map_err(|_| DumpError::validation(INVALID_DATE))?;
        return NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| DumpError::validation(INVALID_DATE));
    }
    Err(DumpError::validation(INVALID_DATE))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next.pred_opt()
}

/// Parse a calendar date and move it to the Monday on or after it.
pub fn parse_until(raw: &str) -> DumpResult<NaiveDate> {
    parse_calendar_date(raw).map(monday_on_or_after)
}

/// Parse `<n>[ywdm]` with y=365, w=7, d=1 and m=30 days. Combinations are rejected.
pub fn parse_relative(raw: &str) -> Option<Duration> {
    let caps = RELATIVE_RE.captures(raw.trim())?;
    let value: i64 = caps[1].parse().ok()?;
    let days_per_unit = match &caps[2] {
        "y" => 365,
        "w" => 7,
        "d" => 1,
        "m" => 30,
        _ => return None,
    };
    value.checked_mul(days_per_unit).and_then(Duration::try_days)
}

/// `since` is either a relative duration counted back from `until`, or a date.
pub fn parse_since(raw: &str, until: NaiveDate) -> DumpResult<NaiveDate> {
    if let Some(duration) = parse_relative(raw) {
        return until
            .checked_sub_signed(duration)
            .ok_or_else(|| DumpError::validation(format!("duration {raw} is out of range")));
    }
    parse_until(raw)
}

/// Resolve the raw arguments against `today` and check the ordering.
pub fn resolve_window(
    until: Option<&str>,
    since: Option<&str>,
    today: NaiveDate,
) -> DumpResult<DateWindow> {
    let until = match until.filter(|s| !s.trim().is_empty()) {
        Some(raw) => parse_until(raw).map_err(|e| prefixed("until", e))?,
        None => monday_on_or_after(today),
    };
    let since_raw = since.filter(|s| !s.trim().is_empty()).unwrap_or(DEFAULT_SINCE);
    let since = parse_since(since_raw, until).map_err(|e| prefixed("since", e))?;

    if since >= until {
        return Err(DumpError::validation(format!(
            "--since date ({}) must be before --until date ({})",
            since.format("%Y-%m-%d"),
            until.format("%Y-%m-%d")
        )));
    }
    Ok(DateWindow { since, until })
}

fn prefixed(which: &str, err: DumpError) -> DumpError {
    match err {
        DumpError::Validation(msg) => {
            DumpError::Validation(format!("failed to parse {which} date: {msg}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn until_moves_to_next_monday() {
        assert_eq!(parse_until("2024-01-02").unwrap(), date("2024-01-08"));
        assert_eq!(parse_until("2024-01-01").unwrap(), date("2024-01-01"));
    }

    #[test]
    fn month_and_year_forms_use_last_day() {
        // 2024-02-29 is a Thursday
        assert_eq!(parse_calendar_date("2024-02").unwrap(), date("2024-02-29"));
        assert_eq!(parse_until("2024-02").unwrap(), date("2024-03-04"));
        assert_eq!(parse_calendar_date("2023-12").unwrap(), date("2023-12-31"));
        assert_eq!(parse_calendar_date("2024").unwrap(), date("2024-12-31"));
    }

    #[test]
    fn garbage_dates_are_rejected() {
        assert!(parse_calendar_date("yesterday").is_err());
        assert!(parse_calendar_date("2024-13").is_err());
        assert!(parse_calendar_date("24").is_err());
    }

    #[test]
    fn relative_durations() {
        assert_eq!(parse_relative("4w"), Some(Duration::days(28)));
        assert_eq!(parse_relative("1y"), Some(Duration::days(365)));
        assert_eq!(parse_relative("6m"), Some(Duration::days(180)));
        assert_eq!(parse_relative("30d"), Some(Duration::days(30)));
        assert_eq!(parse_relative("1y2w"), None);
        assert_eq!(parse_relative("w"), None);
    }

    #[test]
    fn since_relative_counts_back_from_until() {
        let until = date("2024-06-03");
        assert_eq!(parse_since("2w", until).unwrap(), date("2024-05-20"));
        assert_eq!(parse_since("2024-05-01", until).unwrap(), date("2024-05-06"));
    }

    #[test]
    fn defaults_are_next_monday_and_four_weeks() {
        // Wednesday
        let window = resolve_window(None, None, date("2024-05-29")).unwrap();
        assert_eq!(window.until, date("2024-06-03"));
        assert_eq!(window.since, date("2024-05-06"));
    }

    #[test]
    fn since_must_precede_until() {
        let err = resolve_window(Some("2024-01-01"), Some("2024-01-01"), date("2024-05-29"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: --since date (2024-01-01) must be before --until date (2024-01-01)"
        );
        assert!(resolve_window(Some("2024-01-01"), Some("2024-03"), date("2024-05-29")).is_err());
    }

    #[test]
    fn parse_failures_name_the_argument() {
        let err = resolve_window(Some("soon"), None, date("2024-05-29")).unwrap_err();
        assert!(err.to_string().contains("failed to parse until date"));
        let err = resolve_window(None, Some("later"), date("2024-05-29")).unwrap_err();
        assert!(err.to_string().contains("failed to parse since date"));
    }
}
