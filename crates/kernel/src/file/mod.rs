//! Media field file management.
//!
//! Provides the storage abstraction, the limited editor's reconciliation of
//! uploads against storage, and cleanup of abandoned uploads.

pub mod error;
pub mod layout;
pub mod limited_editor;
pub mod naming;
pub mod purge;
pub mod sharding;
pub mod storage;

pub use error::{FileHandlingError, Phase, StoreError};
pub use layout::{DEFAULT_ROOT_FOLDER, FolderLayout};
pub use limited_editor::{Disposition, FileItem, LimitedEditorFileService, final_paths};
pub use naming::UniqueNameResolver;
pub use purge::{PurgeReport, PurgeTempFilesService};
pub use sharding::{ContentItemId, shard};
pub use storage::{FileStore, FileStoreEntry, LocalFileStore};
