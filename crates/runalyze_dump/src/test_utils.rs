//! Shared test doubles: a scripted `RunalyzeClient`, an in-memory file system
//! and a presenter that records what it was asked to show.
#![cfg(test)]

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use runalyze_client::{ExportFile, ExportFormat, RunalyzeClient, RunalyzeError};

use crate::filesystem::FileSystem;
use crate::presentation::Presenter;
use crate::types::{ActivityRecord, DownloadResult, DownloadSummary};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Login,
    Week(NaiveDate),
    Export(String, ExportFormat),
    PersistSession,
}

/// Client answering from per-week and per-export scripts.
///
/// Week replies queue up per date: earlier entries are consumed, the last one
/// repeats (errors are consumed too). Unscripted weeks are empty pages and
/// unscripted exports are `NotFound`.
#[derive(Default)]
pub struct MockClient {
    weeks: Mutex<HashMap<NaiveDate, VecDeque<Result<Vec<u8>, RunalyzeError>>>>,
    exports: Mutex<HashMap<(String, ExportFormat), Result<Vec<u8>, RunalyzeError>>>,
    login_error: Mutex<Option<RunalyzeError>>,
    persist_error: bool,
    calls: Mutex<Vec<Call>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_week(self, week: NaiveDate, html: &str) -> Self {
        self.with_week_bytes(week, html.as_bytes().to_vec())
    }

    pub fn with_week_bytes(self, week: NaiveDate, body: Vec<u8>) -> Self {
        self.push_week(week, Ok(body))
    }

    pub fn with_week_error(self, week: NaiveDate, err: RunalyzeError) -> Self {
        self.push_week(week, Err(err))
    }

    fn push_week(self, week: NaiveDate, reply: Result<Vec<u8>, RunalyzeError>) -> Self {
        self.weeks
            .lock()
            .unwrap()
            .entry(week)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn with_export(self, id: &str, format: ExportFormat, bytes: &[u8]) -> Self {
        self.exports
            .lock()
            .unwrap()
            .insert((id.to_string(), format), Ok(bytes.to_vec()));
        self
    }

    pub fn with_export_error(self, id: &str, format: ExportFormat, err: RunalyzeError) -> Self {
        self.exports
            .lock()
            .unwrap()
            .insert((id.to_string(), format), Err(err));
        self
    }

    pub fn with_login_error(self, err: RunalyzeError) -> Self {
        *self.login_error.lock().unwrap() = Some(err);
        self
    }

    pub fn with_persist_error(mut self) -> Self {
        self.persist_error = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn week_requests(&self) -> Vec<NaiveDate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Week(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RunalyzeClient for MockClient {
    async fn login(&self) -> Result<(), RunalyzeError> {
        self.record(Call::Login);
        match self.login_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch_week(&self, week_start: NaiveDate) -> Result<Vec<u8>, RunalyzeError> {
        self.record(Call::Week(week_start));
        let mut weeks = self.weeks.lock().unwrap();
        let Some(queue) = weeks.get_mut(&week_start) else {
            return Ok(b"<table></table>".to_vec());
        };
        if queue.len() > 1 {
            return queue.pop_front().unwrap();
        }
        match queue.front() {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(_)) => queue.pop_front().unwrap(),
            None => Ok(b"<table></table>".to_vec()),
        }
    }

    async fn fetch_export(
        &self,
        activity_id: &str,
        format: ExportFormat,
    ) -> Result<ExportFile, RunalyzeError> {
        self.record(Call::Export(activity_id.to_string(), format));
        let key = (activity_id.to_string(), format);
        let mut exports = self.exports.lock().unwrap();
        match exports.get(&key) {
            Some(Ok(bytes)) => Ok(ExportFile {
                bytes: bytes.clone(),
                filename: format!("{activity_id}.{}", format.extension()),
            }),
            Some(Err(_)) => Err(exports.remove(&key).unwrap().unwrap_err()),
            None => Err(RunalyzeError::NotFound),
        }
    }

    async fn persist_session(&self) -> Result<(), RunalyzeError> {
        self.record(Call::PersistSession);
        if self.persist_error {
            Err(RunalyzeError::Session("disk full".into()))
        } else {
            Ok(())
        }
    }
}

/// File system held in memory, recording modes and write order.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, (Vec<u8>, u32)>>,
    dirs: Mutex<HashMap<PathBuf, u32>>,
    writes: Mutex<Vec<PathBuf>>,
    fail_writes: bool,
    fail_mkdir: bool,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: PathBuf, data: &[u8]) -> Self {
        self.files.lock().unwrap().insert(path, (data.to_vec(), 0o644));
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn failing_mkdir(mut self) -> Self {
        self.fail_mkdir = true;
        self
    }

    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).map(|(d, _)| d.clone())
    }

    pub fn mode_of(&self, path: &Path) -> Option<u32> {
        self.files.lock().unwrap().get(path).map(|(_, m)| *m)
    }

    pub fn dir_mode(&self, path: &Path) -> Option<u32> {
        self.dirs.lock().unwrap().get(path).copied()
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    async fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> std::io::Result<()> {
        self.writes.lock().unwrap().push(path.to_path_buf());
        if self.fail_writes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), (data.to_vec(), mode));
        Ok(())
    }

    async fn mkdir_all(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        if self.fail_mkdir {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ));
        }
        self.dirs.lock().unwrap().insert(path.to_path_buf(), mode);
        Ok(())
    }
}

/// Presenter that keeps a compact log of every call.
#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<String>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Presenter for RecordingPresenter {
    fn progress(&self, msg: &str) {
        self.push(format!("progress:{msg}"));
    }

    fn status(&self, msg: &str) {
        self.push(format!("status:{msg}"));
    }

    fn error(&self, _err: &dyn std::error::Error, msg: &str) {
        self.push(format!("error:{msg}"));
    }

    fn week_header(&self, week_start: NaiveDate, _week_end: NaiveDate) {
        self.push(format!("week:{week_start}"));
    }

    fn activity_result(&self, activity: &ActivityRecord, result: &DownloadResult) {
        self.push(format!("activity:{}:{}", activity.id, result.format));
    }

    fn final_results(&self, summary: &DownloadSummary) {
        self.push(format!("final:{}/{}", summary.processed, summary.errors));
    }
}

/// Cloneable in-memory writer for presenter output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
