//! Minimal `RunalyzeClient` trait and the reqwest-based client that scrapes runalyze.com.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

pub mod config;
pub mod cookie_jar;
pub mod http_client;
pub mod observability;
pub mod utils;

#[derive(Debug, Error)]
pub enum RunalyzeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("csrf token not found in login page")]
    TokenNotFound,
    #[error("login failed: unexpected status code {0}")]
    LoginFailed(u16),
    #[error("redirected to login page")]
    RedirectedToLogin,
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),
    #[error("export not available")]
    NotFound,
    #[error("filename not found in content-disposition header")]
    FilenameMissing,
    #[error("session store error: {0}")]
    Session(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl RunalyzeError {
    /// True when the remote answered 404 for an export, i.e. the format does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RunalyzeError::NotFound)
    }

    /// True when the session expired and the site bounced us to `/login`.
    pub fn is_login_redirect(&self) -> bool {
        matches!(self, RunalyzeError::RedirectedToLogin)
    }
}

/// Binary export formats offered by the activity page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Fit,
    Tcx,
}

impl ExportFormat {
    /// Path segment used by `/activity/{id}/export/file/{segment}`.
    pub fn path_segment(self) -> &'static str {
        match self {
            ExportFormat::Fit => "fit",
            ExportFormat::Tcx => "tcx",
        }
    }

    /// File extension used for saved activities.
    pub fn extension(self) -> &'static str {
        self.path_segment()
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Fit => "FIT",
            ExportFormat::Tcx => "TCX",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Payload of a successful export request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportFile {
    pub bytes: Vec<u8>,
    /// Filename suggested by the `content-disposition` header.
    pub filename: String,
}

#[async_trait]
pub trait RunalyzeClient: Send + Sync + 'static {
    /// Scrape the CSRF token from the login page and post credentials.
    async fn login(&self) -> Result<(), RunalyzeError>;

    /// Fetch the data-browser HTML for the week starting at `week_start`.
    async fn fetch_week(&self, week_start: NaiveDate) -> Result<Vec<u8>, RunalyzeError>;

    /// Download one activity in the requested format.
    ///
    /// A missing export surfaces as [`RunalyzeError::NotFound`] so callers can
    /// fall back to another format without inspecting status codes.
    async fn fetch_export(
        &self,
        activity_id: &str,
        format: ExportFormat,
    ) -> Result<ExportFile, RunalyzeError>;

    /// Write the current session cookies to durable storage.
    async fn persist_session(&self) -> Result<(), RunalyzeError>;
}
