//! Removing a path from disk and from the index.

use crate::fs::FileSystem;
use crate::store::EntryStore;
use tracing::{info, warn};

/// Delete `path` from the filesystem, then drop its record.
///
/// Directories are removed recursively. Returns false when the path does not
/// exist or the filesystem refuses; the record is only dropped after the
/// filesystem removal succeeded. Records of a directory's descendants are left
/// in place until the next rebuild.
pub fn delete_path(fs: &dyn FileSystem, store: &dyn EntryStore, path: &str) -> bool {
    if !fs.exists(path) {
        info!(path, "delete skipped, path does not exist");
        return false;
    }

    let recursive = fs.is_directory(path);
    if let Err(e) = fs.delete(path, recursive) {
        warn!(path, error = %e, "delete failed");
        return false;
    }

    match store.delete_by_path(path) {
        Ok(removed) => info!(path, record_removed = removed, "deleted"),
        // The path is gone from disk either way
        Err(e) => warn!(path, error = %e, "deleted from disk but record removal failed"),
    }
    true
}
