//! Media field test utilities.
//!
//! Helpers for integration testing: scratch directories, upload names
//! the way the limited editor stages them, and content item id fixtures.

use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// RAII guard for a scratch directory under the system temp dir.
///
/// The directory is removed on drop, even if the test panics.
#[derive(Debug)]
pub struct TestDir(PathBuf);

impl TestDir {
    /// Create a fresh, empty directory unique to this process and call.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[allow(clippy::expect_used)]
    pub fn new(name: &str) -> Self {
        let n = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "mediafield_test_{name}_{n}_{}",
            std::process::id()
        ));
        // Leftovers from an aborted run
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).expect("create test directory");
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Deref for TestDir {
    type Target = Path;
    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for TestDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Prefix a file name with a fresh 36-character upload token.
pub fn tokenized_name(original: &str) -> String {
    format!("{}{original}", Uuid::new_v4().hyphenated())
}

/// A random, valid 26-character content item id.
pub fn content_item_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(26);
    id.make_ascii_uppercase();
    id
}

/// A content item id made of one repeated character.
pub fn repeated_content_item_id(c: char) -> String {
    std::iter::repeat_n(c, 26).collect()
}

/// Set a file's modification time to `minutes` in the past.
///
/// # Panics
///
/// Panics if the file cannot be opened or its timestamp cannot be set.
#[allow(clippy::expect_used)]
pub fn backdate(path: impl AsRef<Path>, minutes: u64) {
    let mtime = SystemTime::now()
        .checked_sub(Duration::from_secs(minutes * 60))
        .expect("backdated time in range");
    let file = File::options()
        .write(true)
        .open(path.as_ref())
        .expect("open file to backdate");
    file.set_modified(mtime).expect("set modification time");
}
