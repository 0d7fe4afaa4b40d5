//! Folder layout of the media fields area.

use tracing::debug;

use super::error::StoreError;
use super::storage::FileStore;

/// Default name of the media fields root folder.
pub const DEFAULT_ROOT_FOLDER: &str = "mediafields";

/// Name of the staging subfolder for fresh uploads.
pub const TEMP_SUBFOLDER: &str = "temp";

/// Name of the holding subfolder for removed files.
pub const TRASH_SUBFOLDER: &str = "trash";

/// The three fixed roots used by the limited editor.
///
/// Derived once from the configured root name and passed to every service
/// that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    root: String,
    temp: String,
    trash: String,
}

impl FolderLayout {
    /// Derive the layout for `root_name` using the store's path conventions.
    pub fn new(root_name: &str, store: &dyn FileStore) -> Self {
        let root = store.normalize_path(root_name);
        let temp = store.combine(&[&root, TEMP_SUBFOLDER]);
        let trash = store.combine(&[&root, TRASH_SUBFOLDER]);
        Self { root, temp, trash }
    }

    /// Root folder holding every committed media field file.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Staging folder for uploads not yet attached to a content item.
    pub fn temp(&self) -> &str {
        &self.temp
    }

    /// Holding folder for files removed from a content item.
    pub fn trash(&self) -> &str {
        &self.trash
    }

    /// Create the three roots if they are missing.
    pub async fn ensure_exists(&self, store: &dyn FileStore) -> Result<(), StoreError> {
        for dir in [&self.root, &self.temp, &self.trash] {
            if store.try_create_directory(dir).await? {
                debug!(path = %dir, "created media fields folder");
            }
        }
        Ok(())
    }
}
