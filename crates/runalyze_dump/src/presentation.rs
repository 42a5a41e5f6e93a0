//! User-facing output. The pipeline reports through [`Presenter`] and never
//! formats terminal text itself.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{ActivityRecord, DateWindow, DownloadResult, DownloadSummary, ResolvedFormat};

pub const EXISTING_SESSION_MSG: &str = "Using existing Runalyze session";
pub const LOGGED_IN_MSG: &str = "Successfully logged in to Runalyze";

pub trait Presenter: Send + Sync {
    fn progress(&self, msg: &str);
    fn status(&self, msg: &str);
    fn error(&self, err: &dyn std::error::Error, msg: &str);
    fn week_header(&self, week_start: NaiveDate, week_end: NaiveDate);
    fn activity_result(&self, activity: &ActivityRecord, result: &DownloadResult);
    fn final_results(&self, summary: &DownloadSummary);
}

/// State shown for one activity line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    Exists,
    Downloaded,
    NotAvailable,
    Error,
}

impl LineState {
    pub fn of(result: &DownloadResult) -> Self {
        if result.existed {
            LineState::Exists
        } else if result.success {
            LineState::Downloaded
        } else if result.format == ResolvedFormat::None {
            LineState::NotAvailable
        } else {
            LineState::Error
        }
    }
}

/// Human-readable line for one activity, e.g. `🏃 123 FIT ✅ Downloaded`.
pub fn activity_line(activity: &ActivityRecord, result: &DownloadResult) -> String {
    let emoji = activity.category.emoji();
    let id = &activity.id;
    match LineState::of(result) {
        LineState::Exists => format!("{emoji} {id} {} ✅ Already downloaded", result.format),
        LineState::Downloaded => format!("{emoji} {id} {} ✅ Downloaded", result.format),
        LineState::NotAvailable => format!("{emoji} {id} FIT/TCX (not available) ❌ Not available"),
        LineState::Error => format!("{emoji} {id} {} ❌ Error", result.format),
    }
}

#[derive(Debug, Serialize)]
struct Counts {
    processed: usize,
    errors: usize,
}

/// End-of-run document printed in JSON mode.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    summary: Counts,
    date_range: &'a DateWindow,
    results: &'a [DownloadResult],
    #[serde(skip_serializing_if = "Option::is_none")]
    scan_error: Option<&'a str>,
}

impl<'a> JsonReport<'a> {
    pub fn new(summary: &'a DownloadSummary) -> Self {
        Self {
            summary: Counts {
                processed: summary.processed,
                errors: summary.errors,
            },
            date_range: &summary.window,
            results: &summary.results,
            scan_error: summary.scan_error.as_deref(),
        }
    }
}

/// Writes plain lines for humans, or structured events plus a final JSON
/// document when `json_mode` is set.
pub struct ConsolePresenter {
    json_mode: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsolePresenter {
    pub fn stdout(json_mode: bool) -> Self {
        Self::with_writer(json_mode, Box::new(std::io::stdout()))
    }

    pub fn with_writer(json_mode: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            json_mode,
            out: Mutex::new(out),
        }
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // a closed stdout must not abort the run
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }
}

impl Presenter for ConsolePresenter {
    fn progress(&self, msg: &str) {
        if self.json_mode {
            tracing::info!(msg, "progress");
        } else {
            self.line(msg);
        }
    }

    fn status(&self, msg: &str) {
        if self.json_mode {
            tracing::info!(msg, "status");
        } else {
            self.line(&format!("✅ {msg}"));
        }
    }

    fn error(&self, err: &dyn std::error::Error, msg: &str) {
        tracing::error!(error = %err, user_message = msg, "operation failed");
        if !self.json_mode {
            self.line(&format!("❌ {msg}: {err}"));
        }
    }

    fn week_header(&self, week_start: NaiveDate, week_end: NaiveDate) {
        if self.json_mode {
            tracing::info!(start_date = %week_start, end_date = %week_end, "week_start");
        } else {
            self.line("");
            self.line(&format!("📅 Week from {week_start} to {week_end}"));
        }
    }

    fn activity_result(&self, activity: &ActivityRecord, result: &DownloadResult) {
        if self.json_mode {
            tracing::info!(
                activity_id = %activity.id,
                file_type = %result.format,
                state = ?LineState::of(result),
                "activity_status"
            );
        } else {
            self.line(&activity_line(activity, result));
        }
    }

    fn final_results(&self, summary: &DownloadSummary) {
        if self.json_mode {
            match serde_json::to_string_pretty(&JsonReport::new(summary)) {
                Ok(doc) => self.line(&doc),
                Err(e) => tracing::error!(error = %e, "failed to encode summary"),
            }
        } else {
            self.line(&format!(
                "🎯 Download complete: {} processed, {} errors",
                summary.processed, summary.errors
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SharedBuffer, date};
    use crate::types::DownloadError;
    use runalyze_client::ExportFormat;

    fn record(id: &str) -> ActivityRecord {
        ActivityRecord::id_only(id, date("2024-05-27"))
    }

    #[test]
    fn activity_lines_per_state() {
        let rec = record("1");
        let existed = DownloadResult::existing("1", ExportFormat::Tcx, "/a/1.tcx".into());
        assert_eq!(activity_line(&rec, &existed), "❓ 1 TCX ✅ Already downloaded");

        let saved = DownloadResult::saved("1", ExportFormat::Fit, "/a/1.fit".into());
        assert_eq!(activity_line(&rec, &saved), "❓ 1 FIT ✅ Downloaded");

        let none = DownloadResult::failed(
            "1",
            ResolvedFormat::None,
            DownloadError::NeitherAvailable {
                activity_id: "1".into(),
            },
        );
        assert_eq!(
            activity_line(&rec, &none),
            "❓ 1 FIT/TCX (not available) ❌ Not available"
        );
    }

    #[test]
    fn plain_mode_prints_summary_line() {
        let buf = SharedBuffer::default();
        let presenter = ConsolePresenter::with_writer(false, Box::new(buf.clone()));
        let mut summary = DownloadSummary::new(DateWindow {
            since: date("2024-05-06"),
            until: date("2024-06-03"),
        });
        summary.record(DownloadResult::saved("1", ExportFormat::Fit, "/a/1.fit".into()));
        presenter.week_header(date("2024-05-27"), date("2024-06-02"));
        presenter.final_results(&summary);
        let out = buf.contents();
        assert!(out.contains("📅 Week from 2024-05-27 to 2024-06-02"));
        assert!(out.contains("🎯 Download complete: 1 processed, 0 errors"));
    }

    #[test]
    fn json_mode_emits_report_document() {
        let buf = SharedBuffer::default();
        let presenter = ConsolePresenter::with_writer(true, Box::new(buf.clone()));
        let mut summary = DownloadSummary::new(DateWindow {
            since: date("2024-05-06"),
            until: date("2024-06-03"),
        });
        summary.record(DownloadResult::saved("1", ExportFormat::Fit, "/a/1.fit".into()));
        presenter.status(LOGGED_IN_MSG);
        presenter.final_results(&summary);

        let doc: serde_json::Value = serde_json::from_str(&buf.contents()).unwrap();
        assert_eq!(doc["summary"]["processed"], 1);
        assert_eq!(doc["summary"]["errors"], 0);
        assert_eq!(doc["date_range"]["since"], "2024-05-06");
        assert_eq!(doc["date_range"]["until"], "2024-06-03");
        assert_eq!(doc["results"][0]["format"], "FIT");
        assert!(doc.get("scan_error").is_none());
    }
}
