#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Each [`TestMedia`] wires the real services over a local file store
//! rooted in a fresh scratch directory, with in-memory site settings.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use mediafield_kernel::AppState;
use mediafield_kernel::file::limited_editor::MAX_UPLOAD_SIZE;
use mediafield_kernel::file::{
    ContentItemId, DEFAULT_ROOT_FOLDER, FileStore, FileStoreEntry, LocalFileStore, StoreError,
};
use mediafield_kernel::settings::{MediaSiteSettings, MemorySiteSettings, SiteSettingsStore};
use mediafield_test_utils::TestDir;

/// Services over a scratch directory, removed when dropped.
pub struct TestMedia {
    pub dir: TestDir,
    pub state: AppState,
    pub settings: Arc<MemorySiteSettings>,
}

impl TestMedia {
    pub fn new(name: &str) -> Self {
        let dir = TestDir::new(name);
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(dir.path()));
        let settings = Arc::new(MemorySiteSettings::new());
        let state = AppState::with_backends(
            store,
            settings.clone(),
            DEFAULT_ROOT_FOLDER,
            MAX_UPLOAD_SIZE,
        );
        Self {
            dir,
            state,
            settings,
        }
    }

    pub fn store(&self) -> &dyn FileStore {
        self.state.store().as_ref()
    }

    /// Stage an upload the way the limited editor does.
    pub async fn stage(&self, name: &str, data: &[u8]) -> String {
        self.state
            .limited_editor()
            .stage_upload(name, data)
            .await
            .expect("stage upload")
    }

    /// Write a file directly at a store path.
    pub async fn put(&self, path: &str, data: &[u8]) {
        self.store().write_file(path, data).await.expect("write file");
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.store().get_entry(path).await.expect("stat").is_some()
    }

    pub async fn read(&self, path: &str) -> Vec<u8> {
        let absolute = self.dir.join(path);
        tokio::fs::read(absolute).await.expect("read file")
    }

    pub async fn set_purge_age(&self, minutes: u32) {
        let value = serde_json::json!({ "limitedEditorDeleteTempFilesOlderThan": minutes });
        self.settings
            .set(MediaSiteSettings::KEY, value)
            .await
            .expect("set media settings");
    }

    /// Shard directory path for a content item id.
    pub fn shard_dir(&self, content_item_id: &str) -> String {
        let id: ContentItemId = content_item_id.parse().expect("valid content item id");
        id.shard_dir(self.state.layout(), self.store())
    }
}

/// Local store whose moves fail when the destination name is listed.
pub struct FailingMoveStore {
    inner: LocalFileStore,
    failing_names: Vec<String>,
}

impl FailingMoveStore {
    pub fn new(inner: LocalFileStore, failing_names: &[&str]) -> Self {
        Self {
            inner,
            failing_names: failing_names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl FileStore for FailingMoveStore {
    fn combine(&self, segments: &[&str]) -> String {
        self.inner.combine(segments)
    }

    fn normalize_path(&self, path: &str) -> String {
        self.inner.normalize_path(path)
    }

    async fn try_create_directory(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.try_create_directory(path).await
    }

    async fn get_entry(&self, path: &str) -> Result<Option<FileStoreEntry>, StoreError> {
        self.inner.get_entry(path).await
    }

    async fn move_file(&self, source: &str, destination: &str) -> Result<(), StoreError> {
        let name = destination.rsplit('/').next().unwrap_or(destination);
        if self.failing_names.iter().any(|n| n == name) {
            return Err(StoreError::Io {
                path: destination.to_string(),
                source: std::io::Error::other("injected move failure"),
            });
        }
        self.inner.move_file(source, destination).await
    }

    async fn try_delete_file(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.try_delete_file(path).await
    }

    async fn try_delete_directory(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.try_delete_directory(path).await
    }

    async fn try_delete_empty_directory(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.try_delete_empty_directory(path).await
    }

    async fn list_directory(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileStoreEntry>, StoreError> {
        self.inner.list_directory(path, recursive).await
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.inner.write_file(path, data).await
    }
}
