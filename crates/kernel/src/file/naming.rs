//! Collision-free naming for committed files.
//!
//! Uploads reach the temp folder as `{36-char token}{original name}`. When
//! committed, the token is dropped and the original name is kept unless it
//! is already taken in the target directory, in which case a `-v-N` suffix
//! is added before the extension:
//!
//! `photo.jpg` -> `photo-v-1.jpg` -> `photo-v-2.jpg`
//!
//! A name that already carries a version (`photo-v-4.jpg`) continues from
//! its own number instead of nesting a second marker.

use std::collections::HashSet;

use super::error::FileHandlingError;
use super::storage::FileStore;

/// Length of the random token prefixed to uploaded file names.
pub const UPLOAD_TOKEN_LEN: usize = 36;

/// Marker separating a base name from its version number.
pub const VERSION_MARKER: &str = "-v-";

/// Resolves non-colliding file names inside a target directory.
///
/// Not safe against a second writer resolving the same base name in the
/// same directory at the same time; commits are sharded per content item so
/// each directory has a single writer.
pub struct UniqueNameResolver;

impl UniqueNameResolver {
    /// Derive the committed name for an uploaded file.
    ///
    /// `claimed` holds names already handed out for `target_dir` during the
    /// current operation; they are treated as taken.
    pub async fn resolve(
        store: &dyn FileStore,
        uploaded_name: &str,
        target_dir: &str,
        claimed: &HashSet<String>,
    ) -> Result<String, FileHandlingError> {
        let original = strip_upload_token(uploaded_name)?;
        Self::next_available(store, original, target_dir, claimed).await
    }

    /// Return `file_name` if free in `target_dir`, otherwise its first free
    /// versioned variant.
    pub async fn next_available(
        store: &dyn FileStore,
        file_name: &str,
        target_dir: &str,
        claimed: &HashSet<String>,
    ) -> Result<String, FileHandlingError> {
        let (base, extension) = split_extension(file_name);

        let candidate = format!("{base}{extension}");
        if is_available(store, &candidate, target_dir, claimed).await? {
            return Ok(candidate);
        }

        let (stem, mut version) = match parse_version(base) {
            Some((stem, version)) => (stem, version),
            None => (base, 1),
        };

        loop {
            let candidate = format!("{stem}{VERSION_MARKER}{version}{extension}");
            if is_available(store, &candidate, target_dir, claimed).await? {
                return Ok(candidate);
            }
            version = version.checked_add(1).ok_or_else(|| {
                FileHandlingError::Unexpected(format!("ran out of versions for '{file_name}'"))
            })?;
        }
    }
}

/// Drop the upload token, recovering the user's file name.
pub fn strip_upload_token(uploaded_name: &str) -> Result<&str, FileHandlingError> {
    if let Some((offset, _)) = uploaded_name.char_indices().nth(UPLOAD_TOKEN_LEN) {
        return Ok(&uploaded_name[offset..]);
    }
    let message = if uploaded_name.chars().count() == UPLOAD_TOKEN_LEN {
        format!("uploaded file name '{uploaded_name}' has an empty original name")
    } else {
        format!("uploaded file name '{uploaded_name}' is missing its upload token")
    };
    Err(FileHandlingError::invalid_argument(message))
}

/// Split at the last `.` into base and extension (extension keeps the dot).
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(dot) => file_name.split_at(dot),
        None => (file_name, ""),
    }
}

/// Parse a trailing `-v-<N>` marker into the unversioned stem and `N`.
fn parse_version(base: &str) -> Option<(&str, u64)> {
    let position = base.rfind(VERSION_MARKER)?;
    let digits = &base[position + VERSION_MARKER.len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = digits.parse().ok()?;
    Some((&base[..position], version))
}

async fn is_available(
    store: &dyn FileStore,
    file_name: &str,
    directory: &str,
    claimed: &HashSet<String>,
) -> Result<bool, FileHandlingError> {
    if claimed.contains(file_name) {
        return Ok(false);
    }
    let path = store.combine(&[directory, file_name]);
    Ok(store.get_entry(&path).await?.is_none())
}
