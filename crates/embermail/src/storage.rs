//! [`Storage`] on the local filesystem.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use embermail_core::{Error, OpenMode, Result, Storage, StorageKind};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

#[derive(Debug)]
struct OpenFile {
    path: String,
    file: File,
}

/// Engine paths resolved under a root directory with `tokio::fs`.
///
/// `/mail/12/report.pdf` lands at `<root>/mail/12/report.pdf`; paths that
/// climb out of the root are refused.
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    kind: StorageKind,
    long_names: bool,
    open: Option<OpenFile>,
}

impl FsStorage {
    /// Storage rooted at `root`, reported as flash with long filenames.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!(root = %root.display(), "filesystem storage");
        Self {
            root,
            kind: StorageKind::Flash,
            long_names: true,
            open: None,
        }
    }

    /// Sets the reported medium.
    #[must_use]
    pub const fn with_kind(mut self, kind: StorageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reports a filesystem limited to 8.3 names.
    #[must_use]
    pub const fn short_filenames(mut self) -> Self {
        self.long_names = false;
        self
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an engine path onto the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches(['/', '\\']));
        let mut full = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => full.push(part),
                Component::CurDir => {}
                _ => return Err(Error::Storage(format!("{path}: path leaves storage root"))),
            }
        }
        Ok(full)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::StorageNotReady)
        }
    }

    fn open_file(&mut self) -> Result<&mut OpenFile> {
        self.open
            .as_mut()
            .ok_or_else(|| Error::Storage("no file open".into()))
    }
}

fn storage_error(path: &str, e: &std::io::Error) -> Error {
    Error::Storage(format!("{path}: {e}"))
}

#[async_trait]
impl Storage for FsStorage {
    fn kind(&self) -> StorageKind {
        self.kind
    }

    fn is_ready(&self) -> bool {
        self.kind != StorageKind::None && self.root.is_dir()
    }

    fn supports_long_filenames(&self) -> bool {
        self.long_names
    }

    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<()> {
        self.ensure_ready()?;
        self.close().await?;
        let full = self.resolve(path)?;
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };
        let file = options
            .open(&full)
            .await
            .map_err(|e| storage_error(path, &e))?;
        debug!(path, ?mode, "opened");
        self.open = Some(OpenFile {
            path: path.to_string(),
            file,
        });
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let open = self.open_file()?;
        open.file
            .write_all(data)
            .await
            .map_err(|e| storage_error(&open.path, &e))
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let open = self.open_file()?;
        open.file
            .read(buf)
            .await
            .map_err(|e| storage_error(&open.path, &e))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut open) = self.open.take() {
            open.file
                .flush()
                .await
                .map_err(|e| storage_error(&open.path, &e))?;
        }
        Ok(())
    }

    async fn exists(&mut self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => fs::try_exists(full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn remove(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        let full = self.resolve(path)?;
        fs::remove_file(&full)
            .await
            .map_err(|e| storage_error(path, &e))
    }

    async fn create_dir_all(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        let full = self.resolve(path)?;
        fs::create_dir_all(&full)
            .await
            .map_err(|e| storage_error(path, &e))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use embermail_core::{read_file, write_file};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path());
        assert!(storage.is_ready());

        storage.create_dir_all("/mail/7").await.unwrap();
        storage.open("/mail/7/body.txt", OpenMode::Write).await.unwrap();
        storage.write(b"hello ").await.unwrap();
        storage.close().await.unwrap();
        storage.open("/mail/7/body.txt", OpenMode::Append).await.unwrap();
        storage.write(b"world").await.unwrap();
        storage.close().await.unwrap();

        assert!(dir.path().join("mail/7/body.txt").is_file());
        assert_eq!(
            read_file(&mut storage, "/mail/7/body.txt").await.unwrap(),
            b"hello world"
        );
        assert!(storage.exists("/mail/7").await);

        storage.remove("/mail/7/body.txt").await.unwrap();
        assert!(!storage.exists("/mail/7/body.txt").await);
    }

    #[tokio::test]
    async fn test_write_truncates() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path());
        write_file(&mut storage, "a.bin", &[1u8; 100]).await.unwrap();
        write_file(&mut storage, "a.bin", &[2u8; 10]).await.unwrap();
        assert_eq!(read_file(&mut storage, "a.bin").await.unwrap(), vec![2u8; 10]);
    }

    #[tokio::test]
    async fn test_refuses_escape() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path());
        let err = storage
            .open("/mail/../../etc/passwd", OpenMode::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(!storage.exists("../outside").await);
    }

    #[tokio::test]
    async fn test_missing_root_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path().join("unmounted"));
        assert!(!storage.is_ready());
        let err = storage.open("x", OpenMode::Write).await.unwrap_err();
        assert!(matches!(err, Error::StorageNotReady));

        let none = FsStorage::new(dir.path()).with_kind(StorageKind::None);
        assert!(!none.is_ready());
    }

    #[tokio::test]
    async fn test_reported_capabilities() {
        let dir = TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path())
            .with_kind(StorageKind::Sd)
            .short_filenames();
        assert_eq!(storage.kind(), StorageKind::Sd);
        assert!(!storage.supports_long_filenames());
        assert_eq!(storage.root(), dir.path());
    }

    #[tokio::test]
    async fn test_read_without_open() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsStorage::new(dir.path());
        let mut buf = [0u8; 4];
        assert!(storage.read(&mut buf).await.is_err());
        assert!(storage.open("missing", OpenMode::Read).await.is_err());
    }
}
