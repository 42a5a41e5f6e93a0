//! Per-activity download with FIT to TCX fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use runalyze_client::{ExportFormat, RunalyzeClient, RunalyzeError};

use crate::filesystem::{FILE_MODE, FileSystem};
use crate::types::{ActivityRecord, DownloadError, DownloadResult, ResolvedFormat, is_activity_id};

/// Delay after every activity that touched the network.
pub const DEFAULT_PACING: Duration = Duration::from_millis(300);

pub struct Downloader {
    client: Arc<dyn RunalyzeClient>,
    fs: Arc<dyn FileSystem>,
    pacing: Duration,
}

impl Downloader {
    pub fn new(client: Arc<dyn RunalyzeClient>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            client,
            fs,
            pacing: DEFAULT_PACING,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Download one activity into `save_dir`, then pause unless the file was
    /// already present.
    pub async fn download(&self, activity: &ActivityRecord, save_dir: &Path) -> DownloadResult {
        let result = self.resolve(&activity.id, save_dir).await;
        if !result.existed && !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        result
    }

    async fn resolve(&self, id: &str, save_dir: &Path) -> DownloadResult {
        let (Some(fit_path), Some(tcx_path)) = (
            target_path(save_dir, id, ExportFormat::Fit),
            target_path(save_dir, id, ExportFormat::Tcx),
        ) else {
            tracing::warn!(activity_id = id, "refusing to download activity with invalid id");
            return DownloadResult::failed(
                id,
                ResolvedFormat::None,
                DownloadError::InvalidId {
                    activity_id: id.to_string(),
                },
            );
        };

        if self.fs.exists(&fit_path).await {
            tracing::debug!(activity_id = id, "FIT file already present");
            return DownloadResult::existing(id, ExportFormat::Fit, fit_path);
        }
        if self.fs.exists(&tcx_path).await {
            tracing::debug!(activity_id = id, "TCX file already present");
            return DownloadResult::existing(id, ExportFormat::Tcx, tcx_path);
        }

        match self.client.fetch_export(id, ExportFormat::Fit).await {
            Ok(file) => self.save(id, ExportFormat::Fit, &file.bytes, fit_path).await,
            Err(RunalyzeError::NotFound) => {
                tracing::debug!(activity_id = id, "no FIT export, trying TCX");
                match self.client.fetch_export(id, ExportFormat::Tcx).await {
                    Ok(file) => self.save(id, ExportFormat::Tcx, &file.bytes, tcx_path).await,
                    Err(RunalyzeError::NotFound) => DownloadResult::failed(
                        id,
                        ResolvedFormat::None,
                        DownloadError::NeitherAvailable {
                            activity_id: id.to_string(),
                        },
                    ),
                    Err(source) => fetch_failed(id, ExportFormat::Tcx, source),
                }
            }
            Err(source) => fetch_failed(id, ExportFormat::Fit, source),
        }
    }

    async fn save(
        &self,
        id: &str,
        format: ExportFormat,
        bytes: &[u8],
        path: PathBuf,
    ) -> DownloadResult {
        match self.fs.write_file(&path, bytes, FILE_MODE).await {
            Ok(()) => {
                tracing::debug!(activity_id = id, %format, path = %path.display(), bytes = bytes.len(), "saved activity");
                DownloadResult::saved(id, format, path)
            }
            Err(source) => {
                tracing::warn!(activity_id = id, %format, error = %source, "failed to save activity");
                DownloadResult::failed(
                    id,
                    format.into(),
                    DownloadError::Save {
                        activity_id: id.to_string(),
                        format,
                        source,
                    },
                )
            }
        }
    }
}

fn fetch_failed(id: &str, format: ExportFormat, source: RunalyzeError) -> DownloadResult {
    tracing::warn!(activity_id = id, %format, error = %source, "failed to download activity");
    DownloadResult::failed(
        id,
        format.into(),
        DownloadError::Fetch {
            activity_id: id.to_string(),
            format,
            source,
        },
    )
}

/// `<save_dir>/<id>.<ext>`, or `None` when `id` is not a numeric activity id.
pub fn target_path(save_dir: &Path, id: &str, format: ExportFormat) -> Option<PathBuf> {
    is_activity_id(id).then(|| save_dir.join(format!("{id}.{}", format.extension())))
}
