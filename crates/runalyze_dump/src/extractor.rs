//! Turns one data-browser week page into [`ActivityRecord`]s.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::activity_types::{Category, Classifier};
use crate::error::{DumpError, DumpResult};
use crate::types::{ActivityRecord, UNKNOWN_KIND, is_activity_id, week_end_of};

const ROW_ID_PREFIX: &str = "training_";
const SNIPPET_CHARS: usize = 200;

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr[id^='training_']").expect("row selector is valid"));
static NOTE_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href*='/health/note/']").expect("note link selector is valid")
});
static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("cell selector is valid"));
static ICON_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("i[class]").expect("icon selector is valid"));
static ANY_ICON_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("i[class*='icon']").expect("icon class selector is valid"));

// anchored at the end so "18,7 km/h" is not read as a distance
static DISTANCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)[,.](\d+)\s*km$").expect("distance pattern is valid"));
static TRAINING_ID_RE: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(r#"id="training_(\d+)""#).expect("training id pattern is valid")
});

#[derive(Clone, Debug, Default)]
pub struct ActivityExtractor {
    classifier: Classifier,
}

impl ActivityExtractor {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    /// Parse a week page. Rows come back in document order.
    ///
    /// Only an undecodable body fails the call; every per-row heuristic falls
    /// back to "unknown" instead.
    pub fn extract(&self, html: &[u8], week_start: NaiveDate) -> DumpResult<Vec<ActivityRecord>> {
        let text = std::str::from_utf8(html)
            .map_err(|e| DumpError::Parse(format!("week page is not valid UTF-8: {e}")))?;
        let document = Html::parse_document(text);
        let week_end = week_end_of(week_start);

        let mut current_date: Option<NaiveDate> = None;
        let mut records = Vec::new();
        for row in document.select(&ROW_SELECTOR) {
            let Some(id) = row
                .value()
                .attr("id")
                .and_then(|id| id.strip_prefix(ROW_ID_PREFIX))
            else {
                continue;
            };
            if !is_activity_id(id) {
                tracing::debug!(row_id = id, "skipping row with non-numeric activity id");
                continue;
            }

            if let Some(date) = row_date(row) {
                current_date = Some(date);
            }
            let icon = row_icon(row);
            let row_html = row.inner_html();
            let category = self.classifier.classify(icon.unwrap_or_default(), &row_html);
            if category == Category::Unknown {
                tracing::debug!(
                    activity_id = id,
                    icon = icon.unwrap_or_default(),
                    row_html_snippet = %truncate(&row_html, SNIPPET_CHARS),
                    "unknown activity type found"
                );
            }

            records.push(ActivityRecord {
                id: id.to_string(),
                kind: icon.unwrap_or(UNKNOWN_KIND).to_string(),
                category,
                week_start,
                week_end,
                date: current_date,
                distance_km: row_distance(row),
            });
        }
        tracing::debug!(week_start = %week_start, count = records.len(), "extracted activities");
        Ok(records)
    }
}

/// Date from the row's health-note link, e.g. `.../health/note/2024-05-27`.
fn row_date(row: ElementRef<'_>) -> Option<NaiveDate> {
    let mut found = None;
    for link in row.select(&NOTE_LINK_SELECTOR) {
        let Some(segment) = link
            .value()
            .attr("href")
            .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
        else {
            continue;
        };
        match NaiveDate::parse_from_str(segment, "%Y-%m-%d") {
            Ok(date) => found = Some(date),
            Err(_) => tracing::debug!(segment, "ignoring malformed health note date"),
        }
    }
    found
}

/// Last cell whose text ends in a kilometre value.
fn row_distance(row: ElementRef<'_>) -> Option<f64> {
    let mut distance = None;
    for cell in row.select(&CELL_SELECTOR) {
        let text = cell.text().collect::<String>().replace('\u{a0}', " ");
        if let Some(caps) = DISTANCE_RE.captures(text.trim()) {
            if let Ok(km) = format!("{}.{}", &caps[1], &caps[2]).parse::<f64>() {
                distance = Some(km);
            }
        }
    }
    distance
}

/// Icon class of the first cell, falling back to any `icon*` element in the row.
fn row_icon<'a>(row: ElementRef<'a>) -> Option<&'a str> {
    let from_first_cell = row
        .select(&CELL_SELECTOR)
        .next()
        .and_then(|cell| cell.select(&ICON_SELECTOR).next())
        .and_then(|i| i.value().attr("class"));
    from_first_cell
        .or_else(|| {
            row.select(&ANY_ICON_SELECTOR)
                .next()
                .and_then(|i| i.value().attr("class"))
        })
        .filter(|class| !class.trim().is_empty())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Identifier-only scan used when a page cannot be parsed as HTML.
pub fn find_activity_ids(html: &[u8]) -> Vec<String> {
    TRAINING_ID_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .collect()
}
