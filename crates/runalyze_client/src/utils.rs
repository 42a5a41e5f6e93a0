//! Date/week arithmetic and small scraping helpers shared by the client.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

static CSRF_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="_csrf_token" value="([^"]+)""#).expect("csrf token pattern is valid")
});

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename="([^"]+)""#).expect("filename pattern is valid")
});

static PASSWORD_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(_password=)[^&]*").expect("password pattern is valid"));

const SECONDS_PER_DAY: i64 = 86_400;

/// Epoch seconds for the data-browser window starting at `week_start`.
///
/// The window opens at 00:00:00 UTC on `week_start` and closes at 23:59:59 UTC
/// on the Sunday that ends the same week.
pub fn week_bounds(week_start: NaiveDate) -> (i64, i64) {
    let start = week_start.and_time(NaiveTime::MIN).and_utc().timestamp();
    let sunday = week_end(week_start);
    let end = sunday.and_time(NaiveTime::MIN).and_utc().timestamp() + SECONDS_PER_DAY - 1;
    (start, end)
}

/// Sunday closing the Monday–Sunday week that contains `date`.
pub fn week_end(date: NaiveDate) -> NaiveDate {
    let to_sunday = 6 - i64::from(date.weekday().num_days_from_monday());
    date + Duration::days(to_sunday)
}

/// Monday on or after `date`; a Monday maps to itself.
pub fn monday_on_or_after(date: NaiveDate) -> NaiveDate {
    let from_monday = i64::from(date.weekday().num_days_from_monday());
    if from_monday == 0 {
        date
    } else {
        date + Duration::days(7 - from_monday)
    }
}

pub fn extract_csrf_token(html: &str) -> Option<String> {
    CSRF_TOKEN_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    FILENAME_RE
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Mask the password in a form-encoded body before it reaches the logs.
pub fn redact_form_body(body: &str) -> String {
    PASSWORD_FIELD_RE.replace_all(body, "${1}***").into_owned()
}
