//! Breadth-first traversal producing entry records.
//!
//! The walker keeps an explicit FIFO queue of directories still to list, so
//! memory grows with the breadth of the pending frontier and the call stack
//! stays flat no matter how deep the tree is. Failures are contained to the
//! smallest scope: an unreadable root is skipped, a directory that fails to
//! list loses only its own subtree, and an entry that fails to stat is dropped
//! on its own.

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::entry::EntryRecord;
use crate::error::LightningError;
use crate::fs::{FileSystem, FsEntry};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::VecDeque;
use tracing::debug;

/// Decides which listed entries are indexed (and, for directories, descended into).
#[derive(Debug, Clone)]
pub struct EntryFilter {
    system_dirs: Vec<String>,
    ignore: GlobSet,
}

impl EntryFilter {
    pub fn new(system_dirs: Vec<String>, ignore_patterns: &[String]) -> crate::Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore_patterns {
            builder.add(Glob::new(pattern).map_err(|e| LightningError::GlobPattern(e.to_string()))?);
        }
        let ignore = builder
            .build()
            .map_err(|e| LightningError::GlobPattern(e.to_string()))?;

        Ok(Self {
            system_dirs,
            ignore,
        })
    }

    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Self::new(config.indexing.system_dirs.clone(), &config.ignore.patterns)
    }

    /// `top_level` is true for direct children of a root.
    pub fn accepts(&self, entry: &FsEntry, top_level: bool) -> bool {
        if entry.name.starts_with('.') {
            return false;
        }
        if top_level && entry.is_directory && self.system_dirs.iter().any(|d| *d == entry.name) {
            return false;
        }
        !self.ignore.is_match(&entry.name)
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            system_dirs: Vec::new(),
            ignore: GlobSet::empty(),
        }
    }
}

/// Result of one traversal run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Records handed to the sink
    pub emitted: usize,
    pub cancelled: bool,
}

pub struct Walker<'a> {
    fs: &'a dyn FileSystem,
    filter: &'a EntryFilter,
}

impl<'a> Walker<'a> {
    pub fn new(fs: &'a dyn FileSystem, filter: &'a EntryFilter) -> Self {
        Self { fs, filter }
    }

    /// Walk `roots` in order, handing every accepted descendant to `emit`.
    ///
    /// Roots themselves are not emitted. Cancellation is checked before each
    /// directory is dequeued and before each entry of a listing.
    pub fn walk<F>(&self, roots: &[String], cancel: &CancellationToken, mut emit: F) -> WalkOutcome
    where
        F: FnMut(EntryRecord),
    {
        // (directory, is_root)
        let mut queue: VecDeque<(String, bool)> = VecDeque::new();
        for root in roots {
            if self.fs.exists(root) && self.fs.is_readable(root) {
                queue.push_back((root.clone(), true));
            } else {
                debug!(root = %root, "skipping missing or unreadable root");
            }
        }

        let mut emitted = 0usize;

        loop {
            if cancel.is_cancelled() {
                return WalkOutcome {
                    emitted,
                    cancelled: true,
                };
            }
            let Some((dir, is_root)) = queue.pop_front() else {
                break;
            };

            let listing = match self.fs.list(&dir) {
                Ok(listing) => listing,
                Err(e) => {
                    debug!(dir = %dir, error = %e, "skipping unlistable directory");
                    continue;
                }
            };

            for entry in listing {
                if cancel.is_cancelled() {
                    return WalkOutcome {
                        emitted,
                        cancelled: true,
                    };
                }
                if !self.filter.accepts(&entry, is_root) {
                    continue;
                }

                let stat = match self.fs.stat(&entry) {
                    Ok(stat) => stat,
                    Err(e) => {
                        debug!(path = %entry.path, error = %e, "skipping entry that failed to stat");
                        continue;
                    }
                };

                let descend = entry.is_directory && self.fs.is_readable(&entry.path);
                let FsEntry {
                    path,
                    name,
                    is_directory,
                } = entry;

                let record = EntryRecord::new(
                    path.clone(),
                    name,
                    is_directory,
                    stat.size,
                    stat.modified_time,
                    Some(dir.clone()),
                );
                emit(record);
                emitted += 1;

                if descend {
                    queue.push_back((path, false));
                }
            }
        }

        WalkOutcome {
            emitted,
            cancelled: false,
        }
    }
}
