// src/files.rs
//
// File system collaborators.
//
// The core only ever asks two things of the file system: "does file X
// exist" and "stream the bytes of file X". Both are async traits so the
// request path never blocks the runtime.

use crate::error::{ResizeServerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Answer of a [`FileFinder`] lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileLookup {
    Found,
    Missing,
}

impl FileLookup {
    pub fn is_found(self) -> bool {
        self == FileLookup::Found
    }
}

#[async_trait]
pub trait FileFinder: Send + Sync {
    async fn exists(&self, path: &Path) -> FileLookup;
}

/// An opened file ready to be streamed to the client.
pub struct FileContents {
    pub size: u64,
    pub stream: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for FileContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContents")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<FileContents>;
}

/// `tokio::fs` backed finder and reader.
///
/// When a file under the writable root is missing, its parent directory is
/// created before `Missing` is reported, so the resize tool can write the
/// target without a separate mkdir step.
#[derive(Clone, Debug, Default)]
pub struct FsFileAdapter {
    writable_root: Option<PathBuf>,
}

impl FsFileAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writable_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.writable_root = Some(root.into());
        self
    }

    async fn prepare_parent(&self, path: &Path) {
        let Some(root) = &self.writable_root else {
            return;
        };
        if !path.starts_with(root) {
            return;
        }
        let Some(parent) = path.parent() else {
            return;
        };
        if tokio::fs::metadata(parent).await.is_ok() {
            return;
        }
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!(dir = %parent.display(), error = %err, "failed to create cache directory");
        }
    }
}

#[async_trait]
impl FileFinder for FsFileAdapter {
    async fn exists(&self, path: &Path) -> FileLookup {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => FileLookup::Found,
            _ => {
                self.prepare_parent(path).await;
                FileLookup::Missing
            }
        }
    }
}

#[async_trait]
impl FileReader for FsFileAdapter {
    async fn read(&self, path: &Path) -> Result<FileContents> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ResizeServerError::file_read_failed(path.display().to_string(), e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| ResizeServerError::file_read_failed(path.display().to_string(), e))?
            .len();

        Ok(FileContents {
            size,
            stream: Box::pin(file),
        })
    }
}

/// In-memory file set for tests and embedding.
///
/// `with_*` methods return a modified copy, leaving the original untouched.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFileStore {
    files: HashMap<PathBuf, Arc<Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_contents(path, Vec::new())
    }

    pub fn with_contents(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), Arc::new(contents.into()));
        self
    }

    pub fn without_file(mut self, path: impl AsRef<Path>) -> Self {
        self.files.remove(path.as_ref());
        self
    }
}

#[async_trait]
impl FileFinder for InMemoryFileStore {
    async fn exists(&self, path: &Path) -> FileLookup {
        if self.files.contains_key(path) {
            FileLookup::Found
        } else {
            FileLookup::Missing
        }
    }
}

#[async_trait]
impl FileReader for InMemoryFileStore {
    async fn read(&self, path: &Path) -> Result<FileContents> {
        let data = self.files.get(path).cloned().ok_or_else(|| {
            ResizeServerError::file_read_failed(
                path.display().to_string(),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })?;
        Ok(FileContents {
            size: data.len() as u64,
            stream: Box::pin(Cursor::new(data.as_ref().clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn in_memory_store_finds_added_files() {
        let store = InMemoryFileStore::new()
            .with_file("/images/a.jpg")
            .with_file("/images/b.jpg");

        assert_eq!(store.exists(Path::new("/images/a.jpg")).await, FileLookup::Found);
        assert_eq!(store.exists(Path::new("/images/c.jpg")).await, FileLookup::Missing);

        let without = store.clone().without_file("/images/a.jpg");
        assert_eq!(without.exists(Path::new("/images/a.jpg")).await, FileLookup::Missing);
        assert_eq!(store.exists(Path::new("/images/a.jpg")).await, FileLookup::Found);
    }

    #[tokio::test]
    async fn in_memory_store_reads_contents() {
        let store = InMemoryFileStore::new().with_contents("/a.jpg", b"jpeg".to_vec());
        let mut contents = store.read(Path::new("/a.jpg")).await.unwrap();
        assert_eq!(contents.size, 4);

        let mut buf = Vec::new();
        contents.stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"jpeg");

        assert!(store.read(Path::new("/missing.jpg")).await.is_err());
    }

    #[tokio::test]
    async fn fs_adapter_reports_files_not_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"x").unwrap();

        let adapter = FsFileAdapter::new();
        assert_eq!(adapter.exists(&file).await, FileLookup::Found);
        assert_eq!(adapter.exists(dir.path()).await, FileLookup::Missing);
    }

    #[tokio::test]
    async fn fs_adapter_creates_parent_only_under_writable_root() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let adapter = FsFileAdapter::new().with_writable_root(&cache);

        let target = cache.join("100x100/nested/a.jpg");
        assert_eq!(adapter.exists(&target).await, FileLookup::Missing);
        assert!(cache.join("100x100/nested").is_dir());

        let outside = dir.path().join("source/nested/a.jpg");
        assert_eq!(adapter.exists(&outside).await, FileLookup::Missing);
        assert!(!dir.path().join("source/nested").exists());
    }

    #[tokio::test]
    async fn fs_adapter_reads_size_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"resized").unwrap();

        let mut contents = FsFileAdapter::new().read(&file).await.unwrap();
        assert_eq!(contents.size, 7);
        let mut buf = Vec::new();
        contents.stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"resized");

        let err = FsFileAdapter::new()
            .read(&dir.path().join("nope.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResizeServerError::FileReadFailed { .. }));
    }
}
