//! End-to-end download run: authenticate, walk the weeks, save every activity.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use runalyze_client::RunalyzeClient;

use crate::auth::{AuthOutcome, Authenticator};
use crate::download::{DEFAULT_PACING, Downloader};
use crate::error::DumpResult;
use crate::extractor::ActivityExtractor;
use crate::filesystem::{DIR_MODE, FileSystem};
use crate::iterator::WeekIterator;
use crate::presentation::{EXISTING_SESSION_MSG, LOGGED_IN_MSG, Presenter};
use crate::types::{DateWindow, DownloadSummary};

pub struct Pipeline {
    client: Arc<dyn RunalyzeClient>,
    fs: Arc<dyn FileSystem>,
    presenter: Arc<dyn Presenter>,
    extractor: ActivityExtractor,
    pacing: Duration,
    probe_date: NaiveDate,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn RunalyzeClient>,
        fs: Arc<dyn FileSystem>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            client,
            fs,
            presenter,
            extractor: ActivityExtractor::default(),
            pacing: DEFAULT_PACING,
            probe_date: Local::now().date_naive(),
        }
    }

    pub fn with_extractor(mut self, extractor: ActivityExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_probe_date(mut self, probe_date: NaiveDate) -> Self {
        self.probe_date = probe_date;
        self
    }

    /// Download every activity in `window` into `save_dir`.
    ///
    /// Authentication and directory creation failures abort the run.
    /// Per-activity failures are tallied in the summary instead.
    pub async fn run(&self, window: DateWindow, save_dir: &Path) -> DumpResult<DownloadSummary> {
        let mut auth = Authenticator::with_probe_date(self.client.clone(), self.probe_date);
        match auth.ensure_authenticated().await {
            Ok(AuthOutcome::ExistingSession) => self.presenter.status(EXISTING_SESSION_MSG),
            Ok(AuthOutcome::LoggedIn) => self.presenter.status(LOGGED_IN_MSG),
            Err(e) => {
                self.presenter.error(&e, "Authentication failed");
                return Err(e.into());
            }
        }

        if let Err(e) = self.fs.mkdir_all(save_dir, DIR_MODE).await {
            self.presenter.error(&e, "Failed to create save directory");
            return Err(e.into());
        }

        self.presenter.progress(&format!(
            "Downloading activities from {} to {} into {}",
            window.since,
            window.until,
            save_dir.display()
        ));

        let mut weeks = WeekIterator::new(
            self.client.clone(),
            self.extractor.clone(),
            window.until,
            Some(window.since),
        );
        let downloader =
            Downloader::new(self.client.clone(), self.fs.clone()).with_pacing(self.pacing);

        let mut summary = DownloadSummary::new(window);
        let mut current_week: Option<NaiveDate> = None;
        while let Some(activity) = weeks.next_activity().await {
            if current_week != Some(activity.week_start) {
                current_week = Some(activity.week_start);
                self.presenter
                    .week_header(activity.week_start, activity.week_end);
            }
            tracing::debug!(activity_id = %activity.id, kind = %activity.kind, "processing activity");
            let result = downloader.download(&activity, save_dir).await;
            self.presenter.activity_result(&activity, &result);
            summary.record(result);
        }

        if let Some(e) = weeks.failure() {
            tracing::warn!(error = %e, "week scan stopped before reaching the since date");
            summary.scan_error = Some(e.to_string());
        }
        tracing::info!(
            processed = summary.processed,
            errors = summary.errors,
            "download complete"
        );
        self.presenter.final_results(&summary);
        Ok(summary)
    }
}
