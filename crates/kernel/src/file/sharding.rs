//! Content item ids and the directory sharding derived from them.
//!
//! Committed files live under `<root>/<2>/<2>/.../<2>/`, thirteen levels of
//! two-character segments taken from the 26-character content item id.
//! This keeps the fan-out of any single directory small even with millions
//! of content items.
//!
//! Example:
//! `4x0y1z2a3b4c5d6e7f8g9h0j1k` -> `mediafields/4x/0y/1z/2a/3b/4c/5d/6e/7f/8g/9h/0j/1k`

use std::fmt;
use std::str::FromStr;

use super::error::FileHandlingError;
use super::layout::FolderLayout;
use super::storage::FileStore;

/// Length of a content item id.
pub const CONTENT_ITEM_ID_LEN: usize = 26;

/// Characters per shard segment.
pub const SHARD_SEGMENT_LEN: usize = 2;

/// Number of nested shard directories.
pub const SHARD_DEPTH: usize = CONTENT_ITEM_ID_LEN / SHARD_SEGMENT_LEN;

/// A validated content item id.
///
/// Exactly 26 ASCII alphanumeric characters, so every shard segment is a
/// plain directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentItemId(String);

impl ContentItemId {
    /// Parse and validate an id.
    pub fn parse(input: &str) -> Result<Self, FileHandlingError> {
        let len = input.chars().count();
        if len != CONTENT_ITEM_ID_LEN {
            return Err(FileHandlingError::invalid_argument(format!(
                "content item id must be {CONTENT_ITEM_ID_LEN} characters long, got {len}"
            )));
        }
        if !input.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FileHandlingError::invalid_argument(
                "content item id must be ASCII alphanumeric",
            ));
        }
        Ok(Self(input.to_string()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 13 two-character segments, in order.
    pub fn shard_segments(&self) -> impl Iterator<Item = &str> + '_ {
        // Validated as ASCII, so byte offsets are char boundaries.
        (0..SHARD_DEPTH).map(move |i| &self.0[i * SHARD_SEGMENT_LEN..(i + 1) * SHARD_SEGMENT_LEN])
    }

    /// Shard directory for this id under the media fields root.
    pub fn shard_dir(&self, layout: &FolderLayout, store: &dyn FileStore) -> String {
        let mut segments = Vec::with_capacity(SHARD_DEPTH + 1);
        segments.push(layout.root());
        segments.extend(self.shard_segments());
        store.combine(&segments)
    }
}

impl fmt::Display for ContentItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentItemId {
    type Err = FileHandlingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ContentItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Map an id to its `/`-separated 13-level shard path.
pub fn shard(id: &str) -> Result<String, FileHandlingError> {
    let id = ContentItemId::parse(id)?;
    Ok(id.shard_segments().collect::<Vec<_>>().join("/"))
}
