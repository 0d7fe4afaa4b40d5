//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::cron::DEFAULT_INTERVAL;
use crate::file::DEFAULT_ROOT_FOLDER;
use crate::file::limited_editor::MAX_UPLOAD_SIZE;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base directory of the local file store (default: ./media).
    pub media_root: PathBuf,

    /// Name of the media fields root folder inside the store (default: mediafields).
    pub media_fields_folder: String,

    /// JSON file holding site settings (default: ./data/site_settings.json).
    pub site_settings_path: PathBuf,

    /// Interval between temp file purges (default: 60 seconds).
    pub purge_interval: Duration,

    /// Largest accepted upload in bytes (default: 10 MB).
    pub max_upload_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("./media"),
            media_fields_folder: DEFAULT_ROOT_FOLDER.to_string(),
            site_settings_path: PathBuf::from("./data/site_settings.json"),
            purge_interval: DEFAULT_INTERVAL,
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let media_root = lookup("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.media_root);

        let media_fields_folder = lookup("MEDIA_FIELDS_FOLDER")
            .map(|v| v.trim().to_string())
            .unwrap_or(defaults.media_fields_folder);
        if media_fields_folder.trim_matches(['/', '\\']).is_empty() {
            bail!("MEDIA_FIELDS_FOLDER must not be empty");
        }

        let site_settings_path = lookup("SITE_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.site_settings_path);

        let purge_interval = match lookup("PURGE_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .context("PURGE_INTERVAL_SECS must be a valid u64")?;
                if secs == 0 {
                    bail!("PURGE_INTERVAL_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => defaults.purge_interval,
        };

        let max_upload_size = match lookup("MAX_UPLOAD_SIZE") {
            Some(v) => v.parse().context("MAX_UPLOAD_SIZE must be a valid usize")?,
            None => defaults.max_upload_size,
        };

        Ok(Self {
            media_root,
            media_fields_folder,
            site_settings_path,
            purge_interval,
            max_upload_size,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.media_fields_folder, "mediafields");
        assert_eq!(config.purge_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("MEDIA_ROOT", "/srv/media"),
            ("MEDIA_FIELDS_FOLDER", "fields"),
            ("PURGE_INTERVAL_SECS", "5"),
            ("MAX_UPLOAD_SIZE", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.media_root, PathBuf::from("/srv/media"));
        assert_eq!(config.media_fields_folder, "fields");
        assert_eq!(config.purge_interval, Duration::from_secs(5));
        assert_eq!(config.max_upload_size, 1024);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("PURGE_INTERVAL_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("PURGE_INTERVAL_SECS"));
        assert!(Config::from_lookup(lookup(&[("PURGE_INTERVAL_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("MEDIA_FIELDS_FOLDER", "/")])).is_err());
    }
}
