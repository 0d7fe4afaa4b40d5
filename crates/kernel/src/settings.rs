//! Site-wide settings.
//!
//! Settings are JSON values stored under string keys. Media settings live
//! under [`MediaSiteSettings::KEY`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::permissions::{MANAGE_MEDIA, PermissionService, User};

/// Errors from the settings layer.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("settings file I/O failed at {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A stored value does not have the expected shape.
    #[error("invalid settings value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The acting user lacks the permission required to change settings.
    #[error("permission '{permission}' is required")]
    PermissionDenied { permission: &'static str },
}

/// Key/value store for site-wide settings.
#[async_trait]
pub trait SiteSettingsStore: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError>;

    /// Set a value.
    async fn set(&self, key: &str, value: Value) -> Result<(), SettingsError>;

    /// Get every value.
    async fn all(&self) -> Result<HashMap<String, Value>, SettingsError>;
}

/// In-memory settings, for tests and one-off commands.
#[derive(Debug, Default)]
pub struct MemorySiteSettings {
    values: RwLock<HashMap<String, Value>>,
}

impl MemorySiteSettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiteSettingsStore for MemorySiteSettings {
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn all(&self) -> Result<HashMap<String, Value>, SettingsError> {
        Ok(self.values.read().clone())
    }
}

/// Settings persisted as a single JSON object on disk.
///
/// Every read goes to the file so changes made by another process are
/// picked up on the next read.
#[derive(Debug)]
pub struct JsonFileSiteSettings {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSiteSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn load(&self) -> Result<HashMap<String, Value>, SettingsError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, values: &HashMap<String, Value>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        // Write then rename so readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(values)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

#[async_trait]
impl SiteSettingsStore for JsonFileSiteSettings {
    async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value);
        self.save(&values).await?;
        debug!(key = %key, path = %self.path.display(), "site setting saved");
        Ok(())
    }

    async fn all(&self) -> Result<HashMap<String, Value>, SettingsError> {
        self.load().await
    }
}

/// Media settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSiteSettings {
    /// Delete limited editor temp files older than this many minutes.
    /// `0` disables the purge.
    #[serde(default)]
    pub limited_editor_delete_temp_files_older_than: u32,
}

impl MediaSiteSettings {
    /// Settings key.
    pub const KEY: &'static str = "media";

    /// Load the current media settings, falling back to defaults.
    pub async fn load(store: &dyn SiteSettingsStore) -> Result<Self, SettingsError> {
        match store.get(Self::KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Self::default()),
        }
    }

    /// Save new media settings on behalf of `user`.
    ///
    /// Requires [`MANAGE_MEDIA`].
    pub async fn update(
        store: &dyn SiteSettingsStore,
        permissions: &PermissionService,
        user: &User,
        settings: Self,
    ) -> Result<(), SettingsError> {
        if !permissions.user_has_permission(user, MANAGE_MEDIA) {
            return Err(SettingsError::PermissionDenied {
                permission: MANAGE_MEDIA,
            });
        }

        store
            .set(Self::KEY, serde_json::to_value(settings)?)
            .await?;
        info!(
            user_id = %user.id,
            older_than_minutes = settings.limited_editor_delete_temp_files_older_than,
            "media settings updated"
        );
        Ok(())
    }

    /// Whether temp files are purged at all.
    pub fn purge_enabled(&self) -> bool {
        self.limited_editor_delete_temp_files_older_than > 0
    }
}
