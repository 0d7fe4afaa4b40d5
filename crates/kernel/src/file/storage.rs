//! File storage backends.
//!
//! Provides the hierarchical store trait the media field services work
//! against, and a local filesystem implementation.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::StoreError;

/// Snapshot of a file or directory in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStoreEntry {
    /// Full store path, using the store's separator.
    pub path: String,
    /// Last path segment.
    pub name: String,
    /// Path of the containing directory (empty for top-level entries).
    pub directory_path: String,
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub length: u64,
    pub last_modified_utc: DateTime<Utc>,
}

/// Hierarchical file storage backend trait.
///
/// Paths are store-relative strings. Each backend picks its own separator;
/// callers build paths with [`FileStore::combine`] rather than assuming one.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Join path segments using the store's separator.
    fn combine(&self, segments: &[&str]) -> String;

    /// Normalize a path to the store's separator convention.
    fn normalize_path(&self, path: &str) -> String;

    /// Create a directory (and its parents) if absent.
    ///
    /// Returns `true` if anything was created.
    async fn try_create_directory(&self, path: &str) -> Result<bool, StoreError>;

    /// Look up a file or directory, returning `None` when absent.
    async fn get_entry(&self, path: &str) -> Result<Option<FileStoreEntry>, StoreError>;

    /// Move a file. Fails if the source is missing or the destination exists.
    async fn move_file(&self, source: &str, destination: &str) -> Result<(), StoreError>;

    /// Delete a file. Returns `false` if there was nothing to delete.
    async fn try_delete_file(&self, path: &str) -> Result<bool, StoreError>;

    /// Delete a directory and its contents. Returns `false` if absent.
    async fn try_delete_directory(&self, path: &str) -> Result<bool, StoreError>;

    /// Delete a directory only if it is empty.
    ///
    /// Returns `false` if it is absent or still has children.
    async fn try_delete_empty_directory(&self, path: &str) -> Result<bool, StoreError>;

    /// List a directory. A missing directory lists as empty.
    async fn list_directory(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileStoreEntry>, StoreError>;

    /// Write a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;
}

/// Local filesystem storage rooted at a base directory.
pub struct LocalFileStore {
    /// Base path for file storage.
    base_path: PathBuf,
}

impl LocalFileStore {
    /// Separator used for store paths.
    pub const SEPARATOR: char = '/';

    /// Create a new local file store.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Base directory on disk.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Map a store path to a filesystem path.
    ///
    /// Rejects `..` components to prevent directory traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let normalized = self.normalize_path(path);
        let mut resolved = self.base_path.clone();
        for segment in normalized.split(Self::SEPARATOR).filter(|s| !s.is_empty()) {
            match Path::new(segment).components().next() {
                Some(Component::Normal(_)) => resolved.push(segment),
                Some(Component::CurDir) => {}
                _ => {
                    return Err(StoreError::InvalidPath {
                        path: path.to_string(),
                        reason: "directory traversal not allowed",
                    });
                }
            }
        }
        Ok(resolved)
    }

    /// Build an entry snapshot from filesystem metadata.
    fn entry(&self, path: &str, metadata: &std::fs::Metadata) -> Result<FileStoreEntry, StoreError> {
        let path = self.normalize_path(path);
        let (directory_path, name) = match path.rsplit_once(Self::SEPARATOR) {
            Some((dir, name)) => (dir.to_string(), name.to_string()),
            None => (String::new(), path.clone()),
        };
        let modified = metadata
            .modified()
            .map_err(|e| StoreError::io(path.clone(), e))?;

        Ok(FileStoreEntry {
            name,
            directory_path,
            is_directory: metadata.is_dir(),
            length: if metadata.is_dir() { 0 } else { metadata.len() },
            last_modified_utc: DateTime::<Utc>::from(modified),
            path,
        })
    }

    /// List the direct children of a directory.
    async fn read_children(&self, path: &str) -> Result<Vec<FileStoreEntry>, StoreError> {
        let dir = self.resolve(path)?;
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let mut entries = Vec::new();
        while let Some(child) = reader
            .next_entry()
            .await
            .map_err(|e| StoreError::io(path, e))?
        {
            let Some(name) = child.file_name().to_str().map(String::from) else {
                debug!(dir = %path, "skipping entry with non UTF-8 name");
                continue;
            };
            let child_path = self.combine(&[path, &name]);
            let metadata = match child.metadata().await {
                Ok(m) => m,
                // Removed between read_dir and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(child_path, e)),
            };
            entries.push(self.entry(&child_path, &metadata)?);
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    fn combine(&self, segments: &[&str]) -> String {
        let joined = segments
            .iter()
            .map(|s| self.normalize_path(s))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        joined.join("/")
    }

    fn normalize_path(&self, path: &str) -> String {
        path.split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn try_create_directory(&self, path: &str) -> Result<bool, StoreError> {
        let dir = self.resolve(path)?;
        match fs::metadata(&dir).await {
            Ok(m) if m.is_dir() => return Ok(false),
            Ok(_) => {
                return Err(StoreError::AlreadyExists {
                    path: path.to_string(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(path, e)),
        }

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        debug!(path = %path, "directory created");
        Ok(true)
    }

    async fn get_entry(&self, path: &str) -> Result<Option<FileStoreEntry>, StoreError> {
        let resolved = self.resolve(path)?;
        match fs::metadata(&resolved).await {
            Ok(metadata) => Ok(Some(self.entry(path, &metadata)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn move_file(&self, source: &str, destination: &str) -> Result<(), StoreError> {
        let from = self.resolve(source)?;
        let to = self.resolve(destination)?;

        match fs::metadata(&from).await {
            Ok(m) if m.is_file() => {}
            Ok(_) => {
                return Err(StoreError::NotFound {
                    path: source.to_string(),
                });
            }
            Err(e) => return Err(StoreError::io(source, e)),
        }
        if fs::try_exists(&to)
            .await
            .map_err(|e| StoreError::io(destination, e))?
        {
            return Err(StoreError::AlreadyExists {
                path: destination.to_string(),
            });
        }

        fs::rename(&from, &to)
            .await
            .map_err(|e| StoreError::io(destination, e))?;
        debug!(from = %source, to = %destination, "file moved");
        Ok(())
    }

    async fn try_delete_file(&self, path: &str) -> Result<bool, StoreError> {
        let resolved = self.resolve(path)?;
        match fs::remove_file(&resolved).await {
            Ok(()) => {
                debug!(path = %path, "file deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn try_delete_directory(&self, path: &str) -> Result<bool, StoreError> {
        let resolved = self.resolve(path)?;
        if resolved == self.base_path {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "refusing to delete the store root",
            });
        }
        match fs::remove_dir_all(&resolved).await {
            Ok(()) => {
                debug!(path = %path, "directory deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn try_delete_empty_directory(&self, path: &str) -> Result<bool, StoreError> {
        let resolved = self.resolve(path)?;
        if resolved == self.base_path {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "refusing to delete the store root",
            });
        }
        match fs::remove_dir(&resolved).await {
            Ok(()) => {
                debug!(path = %path, "empty directory deleted");
                Ok(true)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::DirectoryNotEmpty
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn list_directory(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileStoreEntry>, StoreError> {
        let mut entries = self.read_children(path).await?;
        if !recursive {
            return Ok(entries);
        }

        let mut pending: Vec<String> = entries
            .iter()
            .filter(|e| e.is_directory)
            .map(|e| e.path.clone())
            .collect();
        while let Some(dir) = pending.pop() {
            let children = self.read_children(&dir).await?;
            pending.extend(
                children
                    .iter()
                    .filter(|e| e.is_directory)
                    .map(|e| e.path.clone()),
            );
            entries.extend(children);
        }

        Ok(entries)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let resolved = self.resolve(path)?;

        // Create parent directories if needed
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(path, e))?;
        }

        let mut file = fs::File::create(&resolved)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.write_all(data)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.flush().await.map_err(|e| StoreError::io(path, e))?;

        debug!(path = %path, size = data.len(), "file written");
        Ok(())
    }
}

impl std::fmt::Debug for LocalFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileStore")
            .field("base_path", &self.base_path)
            .finish()
    }
}
