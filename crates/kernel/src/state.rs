//! Application state shared by the binary's commands.

use std::sync::Arc;

use crate::config::Config;
use crate::cron::CronService;
use crate::file::{
    FileStore, FolderLayout, LimitedEditorFileService, LocalFileStore, PurgeTempFilesService,
};
use crate::media_field::MediaFieldService;
use crate::permissions::{AuthorizationPolicy, PermissionService};
use crate::settings::{JsonFileSiteSettings, SiteSettingsStore};

/// Application state.
///
/// Cheap to clone; every service is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn FileStore>,
    layout: FolderLayout,
    settings: Arc<dyn SiteSettingsStore>,
    limited_editor: Arc<LimitedEditorFileService>,
    media_fields: MediaFieldService,
    purge: Arc<PurgeTempFilesService>,
    cron: Arc<CronService>,
    permissions: PermissionService,
    policy: AuthorizationPolicy,
}

impl AppState {
    /// Build state from configuration, backed by the local filesystem.
    pub fn new(config: &Config) -> Self {
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&config.media_root));
        let settings: Arc<dyn SiteSettingsStore> =
            Arc::new(JsonFileSiteSettings::new(&config.site_settings_path));
        Self::with_backends(
            store,
            settings,
            &config.media_fields_folder,
            config.max_upload_size,
        )
    }

    /// Build state over explicit store and settings backends.
    pub fn with_backends(
        store: Arc<dyn FileStore>,
        settings: Arc<dyn SiteSettingsStore>,
        media_fields_folder: &str,
        max_upload_size: usize,
    ) -> Self {
        let layout = FolderLayout::new(media_fields_folder, store.as_ref());
        let limited_editor = Arc::new(
            LimitedEditorFileService::new(Arc::clone(&store), layout.clone())
                .with_max_upload_size(max_upload_size),
        );
        let media_fields = MediaFieldService::new(Arc::clone(&limited_editor));
        let purge = Arc::new(PurgeTempFilesService::new(
            Arc::clone(&store),
            layout.clone(),
            Arc::clone(&settings),
        ));
        let cron = Arc::new(CronService::new(Arc::clone(&purge)));
        let permissions = PermissionService::new();
        let policy =
            AuthorizationPolicy::for_media(permissions.clone(), Arc::clone(&store), &layout);

        Self {
            inner: Arc::new(AppStateInner {
                store,
                layout,
                settings,
                limited_editor,
                media_fields,
                purge,
                cron,
                permissions,
                policy,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.inner.store
    }

    pub fn layout(&self) -> &FolderLayout {
        &self.inner.layout
    }

    pub fn settings(&self) -> &Arc<dyn SiteSettingsStore> {
        &self.inner.settings
    }

    pub fn limited_editor(&self) -> &Arc<LimitedEditorFileService> {
        &self.inner.limited_editor
    }

    pub fn media_fields(&self) -> &MediaFieldService {
        &self.inner.media_fields
    }

    pub fn purge(&self) -> &Arc<PurgeTempFilesService> {
        &self.inner.purge
    }

    pub fn cron(&self) -> &Arc<CronService> {
        &self.inner.cron
    }

    pub fn permissions(&self) -> &PermissionService {
        &self.inner.permissions
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.inner.policy
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("layout", &self.inner.layout)
            .finish()
    }
}
