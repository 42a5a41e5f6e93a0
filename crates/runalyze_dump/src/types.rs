//! Records that flow through the pipeline.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use runalyze_client::{ExportFormat, RunalyzeError};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::activity_types::Category;

/// One activity row scraped from a week page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub id: String,
    /// Raw icon class, or `"unknown"` when the row had none.
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Category,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub date: Option<NaiveDate>,
    pub distance_km: Option<f64>,
}

pub const UNKNOWN_KIND: &str = "unknown";

/// Activity identifiers are non-empty runs of ASCII digits.
pub fn is_activity_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

impl ActivityRecord {
    /// Record carrying nothing but an identifier, used when the page could not be parsed.
    pub fn id_only(id: impl Into<String>, week_start: NaiveDate) -> Self {
        Self {
            id: id.into(),
            kind: UNKNOWN_KIND.to_string(),
            category: Category::Unknown,
            week_start,
            week_end: week_end_of(week_start),
            date: None,
            distance_km: None,
        }
    }
}

pub fn week_end_of(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

/// Format that ended up on disk, or `None` when neither export existed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolvedFormat {
    Fit,
    Tcx,
    None,
}

impl ResolvedFormat {
    pub fn label(self) -> &'static str {
        match self {
            ResolvedFormat::Fit => "FIT",
            ResolvedFormat::Tcx => "TCX",
            ResolvedFormat::None => "NONE",
        }
    }
}

impl From<ExportFormat> for ResolvedFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Fit => ResolvedFormat::Fit,
            ExportFormat::Tcx => ResolvedFormat::Tcx,
        }
    }
}

impl std::fmt::Display for ResolvedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a single activity could not be saved. Never aborts the run.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid activity id {activity_id:?}")]
    InvalidId { activity_id: String },

    #[error("neither FIT nor TCX available for activity {activity_id}")]
    NeitherAvailable { activity_id: String },

    #[error("failed to download {format} file for activity {activity_id}: {source}")]
    Fetch {
        activity_id: String,
        format: ExportFormat,
        #[source]
        source: RunalyzeError,
    },

    #[error("failed to save {format} file for activity {activity_id}: {source}")]
    Save {
        activity_id: String,
        format: ExportFormat,
        #[source]
        source: std::io::Error,
    },
}

fn error_as_string<S: Serializer>(
    error: &Option<DownloadError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadResult {
    pub activity_id: String,
    pub success: bool,
    pub format: ResolvedFormat,
    pub file_path: Option<PathBuf>,
    #[serde(serialize_with = "error_as_string")]
    pub error: Option<DownloadError>,
    pub existed: bool,
}

impl DownloadResult {
    pub fn existing(activity_id: &str, format: ExportFormat, path: PathBuf) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            success: true,
            format: format.into(),
            file_path: Some(path),
            error: None,
            existed: true,
        }
    }

    pub fn saved(activity_id: &str, format: ExportFormat, path: PathBuf) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            success: true,
            format: format.into(),
            file_path: Some(path),
            error: None,
            existed: false,
        }
    }

    pub fn failed(activity_id: &str, format: ResolvedFormat, error: DownloadError) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            success: false,
            format,
            file_path: None,
            error: Some(error),
            existed: false,
        }
    }
}

/// Date range of a run. Windows built by
/// [`resolve_window`](crate::dates::resolve_window) have `since` strictly
/// before `until`; the pipeline itself accepts any pair, including one week.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct DownloadSummary {
    pub processed: usize,
    pub errors: usize,
    pub window: DateWindow,
    pub results: Vec<DownloadResult>,
    /// Why week pagination stopped early, if it did.
    pub scan_error: Option<String>,
}

impl DownloadSummary {
    pub fn new(window: DateWindow) -> Self {
        Self {
            processed: 0,
            errors: 0,
            window,
            results: Vec::new(),
            scan_error: None,
        }
    }

    pub fn record(&mut self, result: DownloadResult) {
        self.processed += 1;
        if !result.success {
            self.errors += 1;
        }
        self.results.push(result);
    }
}
