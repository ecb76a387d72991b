//! Path utilities for on-disk test fixtures.

use std::path::{Path, PathBuf};

use crate::generators::encode_samples;

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Writes an encoded raster payload under `root`, creating parent
/// directories. Returns the absolute path of the written file.
pub fn write_payload(root: &Path, locator: &str, data: &[f64]) -> PathBuf {
    let path = root.join(locator);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create payload directory");
    }
    std::fs::write(&path, encode_samples(data)).expect("Failed to write payload");
    path
}

/// Number of entries directly inside `dir`.
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}
