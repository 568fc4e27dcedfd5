//! Filesystem access contract and the local implementation.
//!
//! The walker and the delete operation only talk to the filesystem through
//! [`FileSystem`], so alternative trees (document providers, fakes in tests)
//! plug in without touching traversal logic.

use std::fs;
use std::io;
use std::time::UNIX_EPOCH;

/// One child returned by [`FileSystem::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub path: String,
    pub name: String,
    /// True only for real directories; symbolic links report false.
    pub is_directory: bool,
}

/// Size and modification time of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsStat {
    pub size: u64,
    /// Epoch milliseconds
    pub modified_time: i64,
}

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn is_readable(&self, path: &str) -> bool;

    fn is_directory(&self, path: &str) -> bool;

    /// List the direct children of `dir`.
    fn list(&self, dir: &str) -> io::Result<Vec<FsEntry>>;

    fn stat(&self, entry: &FsEntry) -> io::Result<FsStat>;

    /// Remove `path`; directories require `recursive`.
    fn delete(&self, path: &str, recursive: bool) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    /// True for dangling links too, so they can still be deleted.
    fn exists(&self, path: &str) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_readable(&self, path: &str) -> bool {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => fs::read_dir(path).is_ok(),
            Ok(_) => fs::File::open(path).is_ok(),
            Err(_) => false,
        }
    }

    fn is_directory(&self, path: &str) -> bool {
        fs::symlink_metadata(path)
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    fn list(&self, dir: &str) -> io::Result<Vec<FsEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            // An entry that vanished mid-listing is not worth failing the directory for
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };
            entries.push(FsEntry {
                path: entry.path().to_string_lossy().into_owned(),
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: file_type.is_dir(),
            });
        }
        Ok(entries)
    }

    /// Links report their target's size and mtime; dangling links their own.
    fn stat(&self, entry: &FsEntry) -> io::Result<FsStat> {
        let meta = fs::metadata(&entry.path).or_else(|_| fs::symlink_metadata(&entry.path))?;
        let modified_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(FsStat {
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified_time,
        })
    }

    fn delete(&self, path: &str, recursive: bool) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if !meta.is_dir() {
            fs::remove_file(path)
        } else if recursive {
            fs::remove_dir_all(path)
        } else {
            fs::remove_dir(path)
        }
    }
}
