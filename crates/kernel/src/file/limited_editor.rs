//! File handling for the limited media field editor.
//!
//! The limited editor uploads straight into the temp folder and submits a
//! list of [`FileItem`] descriptors on save. Reconciling that list runs in
//! three ordered phases:
//!
//! 1. **Discard** uploads that were removed before saving (`is_new && is_removed`).
//! 2. **Trash** committed files that were removed (`!is_new && is_removed`).
//! 3. **Commit** kept uploads into the content item's shard folder
//!    (`is_new && !is_removed`), rewriting their paths.
//!
//! Items that are neither new nor removed pass through untouched. Work
//! inside a phase runs concurrently, and every phase is fully drained
//! before the next one starts. Nothing is rolled back on failure.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{FileHandlingError, Phase};
use super::layout::FolderLayout;
use super::naming::UniqueNameResolver;
use super::sharding::ContentItemId;
use super::storage::FileStore;
use crate::permissions::is_descendant_of;

/// Maximum upload size accepted by [`LimitedEditorFileService::stage_upload`] (10 MB).
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// One entry of a submitted media field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub path: String,

    /// Uploaded through the limited editor during this edit.
    #[serde(default)]
    pub is_new: bool,

    /// Marked for removal in the editor.
    #[serde(default)]
    pub is_removed: bool,
}

/// What reconciliation does with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delete the temp upload.
    Discard,
    /// Move the committed file to the trash folder.
    Trash,
    /// Move the upload into the content item folder.
    Commit,
    /// Leave as is.
    Keep,
}

impl FileItem {
    /// An existing path, neither new nor removed.
    pub fn existing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_new: false,
            is_removed: false,
        }
    }

    /// Classify the item by its flags.
    pub fn disposition(&self) -> Disposition {
        match (self.is_new, self.is_removed) {
            (true, true) => Disposition::Discard,
            (false, true) => Disposition::Trash,
            (true, false) => Disposition::Commit,
            (false, false) => Disposition::Keep,
        }
    }
}

/// Paths that remain on the field after a save.
pub fn final_paths(items: &[FileItem]) -> Vec<String> {
    items
        .iter()
        .filter(|item| !item.is_removed)
        .map(|item| item.path.clone())
        .collect()
}

/// Handles temp, trash, and commit moves for the limited editor.
pub struct LimitedEditorFileService {
    store: Arc<dyn FileStore>,
    layout: FolderLayout,
    max_upload_size: usize,
}

impl LimitedEditorFileService {
    /// Create a new limited editor file service.
    pub fn new(store: Arc<dyn FileStore>, layout: FolderLayout) -> Self {
        Self {
            store,
            layout,
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }

    /// Override the upload size limit.
    pub fn with_max_upload_size(mut self, max_upload_size: usize) -> Self {
        self.max_upload_size = max_upload_size;
        self
    }

    /// Folder the editor uploads into.
    pub fn temp_upload_folder(&self) -> &str {
        self.layout.temp()
    }

    /// Folder layout in use.
    pub fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    /// Get the storage backend.
    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Store an upload in the temp folder under a tokenized name.
    ///
    /// Returns the temp path to hand back to the editor.
    pub async fn stage_upload(
        &self,
        filename: &str,
        data: &[u8],
    ) -> Result<String, FileHandlingError> {
        if data.len() > self.max_upload_size {
            return Err(FileHandlingError::invalid_argument(format!(
                "file too large: {} bytes (max {} bytes)",
                data.len(),
                self.max_upload_size
            )));
        }

        let safe_name = sanitize_filename(filename);
        if safe_name.is_empty() {
            return Err(FileHandlingError::invalid_argument("file name is empty"));
        }

        self.layout.ensure_exists(self.store.as_ref()).await?;

        let token = Uuid::new_v4().hyphenated().to_string();
        let path = self
            .store
            .combine(&[self.layout.temp(), &format!("{token}{safe_name}")]);
        self.store.write_file(&path, data).await?;

        debug!(path = %path, size = data.len(), "upload staged");
        Ok(path)
    }

    /// Reconcile a submitted field against storage.
    ///
    /// Committed items get their `path` rewritten in place. Returns the
    /// paths that remain on the field.
    pub async fn handle_files_on_field_update(
        &self,
        items: &mut [FileItem],
        content_item_id: &ContentItemId,
    ) -> Result<Vec<String>, FileHandlingError> {
        self.check_item_locations(items, content_item_id)?;

        self.layout.ensure_exists(self.store.as_ref()).await?;

        let discarded = self.remove_temporary(items).await?;
        let trashed = self.move_deleted_to_trash(items, content_item_id).await?;
        let committed = self.move_used_to_content_item_dir(items, content_item_id).await?;

        info!(
            content_item_id = %content_item_id,
            discarded,
            trashed,
            committed,
            "media field files reconciled"
        );

        Ok(final_paths(items))
    }

    /// New items must point into the temp folder and removed items into this
    /// content item's shard folder; anything else would let a submission
    /// delete or move arbitrary files.
    fn check_item_locations(
        &self,
        items: &[FileItem],
        content_item_id: &ContentItemId,
    ) -> Result<(), FileHandlingError> {
        let store = self.store.as_ref();
        let shard_dir = content_item_id.shard_dir(&self.layout, store);

        for item in items {
            let (parent, what) = match item.disposition() {
                Disposition::Commit | Disposition::Discard => (self.layout.temp(), "new media"),
                Disposition::Trash => (shard_dir.as_str(), "removed media"),
                Disposition::Keep => continue,
            };
            let path = store.normalize_path(&item.path);
            if path == parent || !is_descendant_of(store, &path, parent) {
                return Err(FileHandlingError::invalid_argument(format!(
                    "{what} must be inside '{parent}', got '{}'",
                    item.path
                )));
            }
        }
        Ok(())
    }

    // Uploads discarded before saving are simply deleted.
    async fn remove_temporary(&self, items: &[FileItem]) -> Result<usize, FileHandlingError> {
        let mut tasks: JoinSet<Result<(), FileHandlingError>> = JoinSet::new();
        for item in items
            .iter()
            .filter(|item| item.disposition() == Disposition::Discard)
        {
            let store = Arc::clone(&self.store);
            let path = item.path.clone();
            tasks.spawn(async move {
                store.try_delete_file(&path).await?;
                Ok(())
            });
        }

        let (done, failure) = drain_phase(Phase::Discard, tasks).await;
        match failure {
            Some(err) => Err(err),
            None => Ok(done.len()),
        }
    }

    // Committed files that are removed go to the trash, never deleted.
    async fn move_deleted_to_trash(
        &self,
        items: &[FileItem],
        content_item_id: &ContentItemId,
    ) -> Result<usize, FileHandlingError> {
        let store = self.store.as_ref();
        let mut claimed = HashSet::new();
        let mut moves = Vec::new();

        for item in items
            .iter()
            .filter(|item| item.disposition() == Disposition::Trash)
        {
            let entry = match store.get_entry(&item.path).await? {
                Some(entry) if !entry.is_directory => entry,
                _ => {
                    return Err(FileHandlingError::NotFound {
                        path: item.path.clone(),
                    });
                }
            };

            let wanted = format!("{content_item_id}{}", entry.name);
            let name =
                UniqueNameResolver::next_available(store, &wanted, self.layout.trash(), &claimed)
                    .await?;
            if name != wanted {
                debug!(wanted = %wanted, name = %name, "trash name taken, versioning");
            }
            claimed.insert(name.clone());
            moves.push((entry.path, store.combine(&[self.layout.trash(), &name])));
        }

        let mut tasks: JoinSet<Result<(), FileHandlingError>> = JoinSet::new();
        for (from, to) in moves {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                store.move_file(&from, &to).await?;
                Ok(())
            });
        }

        let (done, failure) = drain_phase(Phase::Trash, tasks).await;
        match failure {
            Some(err) => Err(err),
            None => Ok(done.len()),
        }
    }

    // Kept uploads move to the content item folder under a unique name.
    async fn move_used_to_content_item_dir(
        &self,
        items: &mut [FileItem],
        content_item_id: &ContentItemId,
    ) -> Result<usize, FileHandlingError> {
        let pending: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.disposition() == Disposition::Commit)
            .map(|(index, _)| index)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let store = self.store.as_ref();
        let target_dir = content_item_id.shard_dir(&self.layout, store);
        store.try_create_directory(&target_dir).await?;

        let mut claimed = HashSet::new();
        let mut moves = Vec::with_capacity(pending.len());
        for index in pending {
            let source = &items[index].path;
            let entry = match store.get_entry(source).await? {
                Some(entry) if !entry.is_directory => entry,
                _ => {
                    return Err(FileHandlingError::NotFound {
                        path: source.clone(),
                    });
                }
            };

            let name =
                UniqueNameResolver::resolve(store, &entry.name, &target_dir, &claimed).await?;
            claimed.insert(name.clone());
            moves.push((index, entry.path, store.combine(&[&target_dir, &name])));
        }

        let mut tasks: JoinSet<Result<(usize, String), FileHandlingError>> = JoinSet::new();
        for (index, from, to) in moves {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                store.move_file(&from, &to).await?;
                Ok((index, to))
            });
        }

        let (done, failure) = drain_phase(Phase::Commit, tasks).await;
        let committed = done.len();
        // Paths of files that did move are updated even if a sibling failed.
        for (index, new_path) in done {
            items[index].path = new_path;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(committed),
        }
    }
}

impl std::fmt::Debug for LimitedEditorFileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedEditorFileService")
            .field("layout", &self.layout)
            .field("max_upload_size", &self.max_upload_size)
            .finish()
    }
}

/// Wait for every task of a phase and aggregate failures.
async fn drain_phase<T: 'static>(
    phase: Phase,
    mut tasks: JoinSet<Result<T, FileHandlingError>>,
) -> (Vec<T>, Option<FileHandlingError>) {
    let mut done = Vec::new();
    let mut failures = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(value)) => done.push(value),
            Ok(Err(err)) => {
                warn!(phase = %phase, error = %err, "media field file operation failed");
                failures.push(err);
            }
            Err(join_err) => {
                warn!(phase = %phase, error = %join_err, "media field file task aborted");
                failures.push(FileHandlingError::Unexpected(join_err.to_string()));
            }
        }
    }

    let failure = match failures.len() {
        0 => None,
        1 => failures.pop(),
        _ => Some(FileHandlingError::Phase { phase, failures }),
    };
    (done, failure)
}

/// Sanitize a filename for safe storage.
pub(crate) fn sanitize_filename(filename: &str) -> String {
    // Keep only the last path segment, whichever separator was used
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    name.chars()
        .filter(|c| *c != '\0')
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .take(200)
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
