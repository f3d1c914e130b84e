//! File storage collaborator.
//!
//! Attachments, decoded bodies and saved headers go through [`Storage`],
//! one open file at a time. [`MemoryStorage`] keeps everything in a map and
//! is what the engine tests use.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

/// Backing medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// No storage; anything that would be saved is dropped.
    #[default]
    None,
    /// Internal flash.
    Flash,
    /// Removable SD card.
    Sd,
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the start.
    Read,
    /// Truncate or create.
    Write,
    /// Append or create.
    Append,
}

/// A filesystem the engines can save into and stream from.
///
/// Only one file is open at a time; `write`/`read` act on it.
#[async_trait]
pub trait Storage: Send {
    /// Backing medium.
    fn kind(&self) -> StorageKind;

    /// Returns true once the medium is mounted.
    fn is_ready(&self) -> bool;

    /// Returns false on filesystems limited to short (8.3) names.
    fn supports_long_filenames(&self) -> bool {
        true
    }

    /// Free space in bytes, if known.
    fn free_space(&self) -> Option<u64> {
        None
    }

    /// Opens `path`, closing any file already open.
    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<()>;

    /// Appends to the open file.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Reads from the open file; 0 means end of file.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Closes the open file.
    async fn close(&mut self) -> Result<()>;

    /// Returns true if `path` exists.
    async fn exists(&mut self, path: &str) -> bool;

    /// Deletes `path`.
    async fn remove(&mut self, path: &str) -> Result<()>;

    /// Creates `path` and any missing parents.
    async fn create_dir_all(&mut self, path: &str) -> Result<()>;
}

/// Reads the whole of `path`.
///
/// # Errors
///
/// Returns the storage error from open or read.
pub async fn read_file(storage: &mut dyn Storage, path: &str) -> Result<Vec<u8>> {
    storage.open(path, OpenMode::Read).await?;
    let mut out = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        match storage.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) => {
                if let Err(close) = storage.close().await {
                    debug!(path, error = %close, "close after failed read also failed");
                }
                return Err(e);
            }
        }
    }
    storage.close().await?;
    Ok(out)
}

/// Replaces `path` with `data`.
///
/// # Errors
///
/// Returns the storage error from open, write or close.
pub async fn write_file(storage: &mut dyn Storage, path: &str, data: &[u8]) -> Result<()> {
    storage.open(path, OpenMode::Write).await?;
    let written = storage.write(data).await;
    storage.close().await?;
    written
}

#[derive(Debug)]
struct OpenFile {
    path: String,
    mode: OpenMode,
    position: usize,
}

/// In-memory [`Storage`].
#[derive(Debug)]
pub struct MemoryStorage {
    kind: StorageKind,
    ready: bool,
    long_names: bool,
    capacity: Option<usize>,
    files: HashMap<String, Vec<u8>>,
    dirs: Vec<String>,
    open: Option<OpenFile>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// An empty, mounted flash store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: StorageKind::Flash,
            ready: true,
            long_names: true,
            capacity: None,
            files: HashMap::new(),
            dirs: Vec::new(),
            open: None,
        }
    }

    /// Sets the reported medium.
    #[must_use]
    pub const fn with_kind(mut self, kind: StorageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reports short-filename-only support.
    #[must_use]
    pub const fn short_filenames(mut self) -> Self {
        self.long_names = false;
        self
    }

    /// Caps the total size of all files; writes past it fail as on a full
    /// medium.
    #[must_use]
    pub const fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }

    /// Mounts or unmounts the store.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Adds a file.
    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }

    /// Contents of `path`.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// All stored paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Directories created so far.
    #[must_use]
    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready && self.kind != StorageKind::None {
            Ok(())
        } else {
            Err(Error::StorageNotReady)
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn kind(&self) -> StorageKind {
        self.kind
    }

    fn is_ready(&self) -> bool {
        self.ready && self.kind != StorageKind::None
    }

    fn supports_long_filenames(&self) -> bool {
        self.long_names
    }

    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<()> {
        self.ensure_ready()?;
        match mode {
            OpenMode::Read if !self.files.contains_key(path) => {
                return Err(Error::Storage(format!("{path}: not found")));
            }
            OpenMode::Read => {}
            OpenMode::Write => {
                self.files.insert(path.to_string(), Vec::new());
            }
            OpenMode::Append => {
                self.files.entry(path.to_string()).or_default();
            }
        }
        self.open = Some(OpenFile {
            path: path.to_string(),
            mode,
            position: 0,
        });
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let open = self
            .open
            .as_ref()
            .ok_or_else(|| Error::Storage("no file open".into()))?;
        if open.mode == OpenMode::Read {
            return Err(Error::Storage(format!("{}: opened read-only", open.path)));
        }
        if let Some(capacity) = self.capacity {
            let used: usize = self.files.values().map(Vec::len).sum();
            if used + data.len() > capacity {
                return Err(Error::Storage(format!("{}: no space left", open.path)));
            }
        }
        self.files
            .entry(open.path.clone())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| Error::Storage("no file open".into()))?;
        let data = self.files.get(&open.path).map_or(&[][..], Vec::as_slice);
        let rest = data.get(open.position..).unwrap_or_default();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        open.position += n;
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.open = None;
        Ok(())
    }

    async fn exists(&mut self, path: &str) -> bool {
        self.files.contains_key(path) || self.dirs.iter().any(|d| d == path)
    }

    async fn remove(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::Storage(format!("{path}: not found")))
    }

    async fn create_dir_all(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        if !self.dirs.iter().any(|d| d == path) {
            self.dirs.push(path.to_string());
        }
        Ok(())
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

    #[tokio::test]
    async fn test_write_then_read() {
        let mut storage = MemoryStorage::new();
        storage.open("/mail/1/a.txt", OpenMode::Write).await.unwrap();
        storage.write(b"hello ").await.unwrap();
        storage.write(b"world").await.unwrap();
        storage.close().await.unwrap();

        storage.open("/mail/1/a.txt", OpenMode::Read).await.unwrap();
        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        loop {
            let n = storage.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_append_keeps_content() {
        let mut storage = MemoryStorage::new();
        storage.insert("log", b"a".to_vec());
        storage.open("log", OpenMode::Append).await.unwrap();
        storage.write(b"b").await.unwrap();
        assert_eq!(storage.file("log"), Some(&b"ab"[..]));
    }

    #[tokio::test]
    async fn test_not_ready() {
        let mut storage = MemoryStorage::new();
        storage.set_ready(false);
        assert!(!storage.is_ready());
        let err = storage.open("x", OpenMode::Write).await.unwrap_err();
        assert!(matches!(err, Error::StorageNotReady));

        let mut none = MemoryStorage::new().with_kind(StorageKind::None);
        assert!(none.open("x", OpenMode::Write).await.is_err());
    }

    #[tokio::test]
    async fn test_file_helpers() {
        let mut storage = MemoryStorage::new();
        write_file(&mut storage, "/a/b.txt", &[7u8; 1500]).await.unwrap();
        let back = read_file(&mut storage, "/a/b.txt").await.unwrap();
        assert_eq!(back.len(), 1500);
        assert!(read_file(&mut storage, "/a/missing").await.is_err());
    }

    #[tokio::test]
    async fn test_capacity_limits_writes() {
        let mut storage = MemoryStorage::new().with_capacity(8);
        write_file(&mut storage, "/a", b"12345").await.unwrap();
        let err = write_file(&mut storage, "/b", b"6789").await.unwrap_err();
        assert!(matches!(err, Error::Storage(msg) if msg.contains("no space")));
        assert_eq!(storage.file("/a"), Some(&b"12345"[..]));
    }

    /// Opens fine, then fails every read and the close after it.
    struct FailingReads;

    #[async_trait]
    impl Storage for FailingReads {
        fn kind(&self) -> StorageKind {
            StorageKind::Sd
        }

        fn is_ready(&self) -> bool {
            true
        }

        async fn open(&mut self, _path: &str, _mode: OpenMode) -> Result<()> {
            Ok(())
        }

        async fn write(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Err(Error::Storage("bad sector".into()))
        }

        async fn close(&mut self) -> Result<()> {
            Err(Error::Storage("card removed".into()))
        }

        async fn exists(&mut self, _path: &str) -> bool {
            true
        }

        async fn remove(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn create_dir_all(&mut self, _path: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_read_error_wins_over_close_error() {
        let err = read_file(&mut FailingReads, "/x").await.unwrap_err();
        assert!(matches!(err, Error::Storage(msg) if msg == "bad sector"));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let mut storage = MemoryStorage::new();
        assert!(storage.open("missing", OpenMode::Read).await.is_err());
        assert!(!storage.exists("missing").await);
    }
}
