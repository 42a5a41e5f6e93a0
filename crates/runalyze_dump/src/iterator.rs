//! Backward, week-by-week pagination over the data browser.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use runalyze_client::{RunalyzeClient, RunalyzeError};

use crate::extractor::{ActivityExtractor, find_activity_ids};
use crate::types::ActivityRecord;

/// Pull-style iterator yielding activities newest week first.
///
/// A failed week fetch ends the iteration instead of surfacing an error from
/// [`next_activity`](Self::next_activity); the cause stays available through
/// [`failure`](Self::failure).
pub struct WeekIterator {
    client: Arc<dyn RunalyzeClient>,
    extractor: ActivityExtractor,
    current_until: NaiveDate,
    since: Option<NaiveDate>,
    buffer: VecDeque<ActivityRecord>,
    done: bool,
    failure: Option<RunalyzeError>,
}

impl WeekIterator {
    pub fn new(
        client: Arc<dyn RunalyzeClient>,
        extractor: ActivityExtractor,
        until: NaiveDate,
        since: Option<NaiveDate>,
    ) -> Self {
        Self {
            client,
            extractor,
            current_until: until,
            since,
            buffer: VecDeque::new(),
            done: false,
            failure: None,
        }
    }

    /// Next activity, fetching older weeks as needed. Empty weeks are skipped.
    pub async fn next_activity(&mut self) -> Option<ActivityRecord> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(record);
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_next_week().await {
                tracing::warn!(error = %e, week_start = %self.current_until, "stopping week scan");
                self.failure = Some(e);
                self.done = true;
            }
        }
    }

    /// Why the scan stopped early, if a week fetch failed.
    pub fn failure(&self) -> Option<&RunalyzeError> {
        self.failure.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.done && self.buffer.is_empty()
    }

    async fn fetch_next_week(&mut self) -> Result<(), RunalyzeError> {
        if self.since.is_some_and(|since| self.current_until < since) {
            tracing::debug!(until = %self.current_until, "reached since bound");
            self.done = true;
            return Ok(());
        }

        let week_start = self.current_until;
        tracing::debug!(week_start = %week_start, "fetching week");
        let body = self.client.fetch_week(week_start).await?;
        let records = match self.extractor.extract(&body, week_start) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, week_start = %week_start, "falling back to id scan");
                find_activity_ids(&body)
                    .into_iter()
                    .map(|id| ActivityRecord::id_only(id, week_start))
                    .collect()
            }
        };
        self.buffer = records.into();
        self.current_until = week_start - Duration::days(7);
        Ok(())
    }
}
