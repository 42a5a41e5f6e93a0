use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Mode for saved activity files.
pub const FILE_MODE: u32 = 0o644;
/// Mode for the save directory.
pub const DIR_MODE: u32 = 0o755;

/// File operations needed by the download engine.
#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    async fn exists(&self, path: &Path) -> bool;

    async fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> std::io::Result<()>;

    /// Create `path` and any missing parents.
    async fn mkdir_all(&self, path: &Path, mode: u32) -> std::io::Result<()>;
}

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Writes `<name>.part` next to `path` and renames it into place, so a
    /// failed write never leaves a file that later counts as downloaded.
    async fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> std::io::Result<()> {
        let partial = partial_path(path);
        let result = write_then_rename(&partial, path, data, mode).await;
        if result.is_err() {
            match tokio::fs::remove_file(&partial).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %partial.display(), error = %e, "failed to remove partial file");
                }
                _ => {}
            }
        }
        result
    }

    async fn mkdir_all(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).await
    }
}

async fn write_then_rename(
    partial: &Path,
    path: &Path,
    data: &[u8],
    mode: u32,
) -> std::io::Result<()> {
    tokio::fs::write(partial, data).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(partial, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    tokio::fs::rename(partial, path).await
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn os_filesystem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = OsFileSystem;
        let nested = dir.path().join("a/b");
        fs.mkdir_all(&nested, DIR_MODE).await.unwrap();
        let file = nested.join("1.fit");
        assert!(!fs.exists(&file).await);
        fs.write_file(&file, b"fit", FILE_MODE).await.unwrap();
        assert!(fs.exists(&file).await);
        assert_eq!(std::fs::read(&file).unwrap(), b"fit");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, FILE_MODE);
        }
    }

    #[tokio::test]
    async fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let res = OsFileSystem
            .write_file(&dir.path().join("missing/1.fit"), b"x", FILE_MODE)
            .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn successful_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("5.tcx");
        OsFileSystem.write_file(&file, b"tcx", FILE_MODE).await.unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"tcx");
        assert!(!dir.path().join("5.tcx.part").exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory in the way makes the final rename fail
        let target = dir.path().join("9.fit");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let res = OsFileSystem.write_file(&target, b"fit", FILE_MODE).await;
        assert!(res.is_err());
        assert!(target.is_dir());
        assert!(!dir.path().join("9.fit.part").exists());
        assert!(!OsFileSystem.exists(&dir.path().join("9.fit.part")).await);
    }
}
