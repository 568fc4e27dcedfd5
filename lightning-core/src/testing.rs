//! In-memory fakes shared by unit tests.

use crate::entry::EntryRecord;
use crate::error::LightningError;
use crate::fs::{FileSystem, FsEntry, FsStat};
use crate::store::EntryStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Node {
    is_dir: bool,
    size: u64,
    readable: bool,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<String, Node>,
    children: HashMap<String, Vec<String>>,
    undeletable: HashSet<String>,
}

/// Filesystem held in memory; paths are `/`-separated strings.
#[derive(Default)]
pub(crate) struct MemoryFs {
    tree: Mutex<Tree>,
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/')
        .map(|(parent, _)| if parent.is_empty() { "/" } else { parent })
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, path: &str, node: Node) {
        let mut tree = self.tree.lock().unwrap();
        if let Some(parent) = parent_of(path) {
            if tree.nodes.contains_key(parent) {
                tree.children
                    .entry(parent.to_string())
                    .or_default()
                    .push(path.to_string());
            }
        }
        tree.nodes.insert(path.to_string(), node);
    }

    pub fn add_dir(&self, path: &str) -> &Self {
        self.insert(
            path,
            Node {
                is_dir: true,
                size: 0,
                readable: true,
            },
        );
        self
    }

    pub fn add_file(&self, path: &str, size: u64) -> &Self {
        self.insert(
            path,
            Node {
                is_dir: false,
                size,
                readable: true,
            },
        );
        self
    }

    pub fn set_unreadable(&self, path: &str) {
        if let Some(node) = self.tree.lock().unwrap().nodes.get_mut(path) {
            node.readable = false;
        }
    }

    pub fn set_undeletable(&self, path: &str) {
        self.tree.lock().unwrap().undeletable.insert(path.to_string());
    }

    /// Build `depth` directories nested one inside the other under `root`.
    pub fn add_chain(&self, root: &str, depth: usize) -> String {
        let mut path = root.to_string();
        for i in 0..depth {
            path = format!("{path}/d{i}");
            self.add_dir(&path);
        }
        path
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tree.lock().unwrap().nodes.contains_key(path)
    }
}

impl FileSystem for MemoryFs {
    fn exists(&self, path: &str) -> bool {
        self.contains(path)
    }

    fn is_readable(&self, path: &str) -> bool {
        self.tree
            .lock()
            .unwrap()
            .nodes
            .get(path)
            .map(|n| n.readable)
            .unwrap_or(false)
    }

    fn is_directory(&self, path: &str) -> bool {
        self.tree
            .lock()
            .unwrap()
            .nodes
            .get(path)
            .map(|n| n.is_dir)
            .unwrap_or(false)
    }

    fn list(&self, dir: &str) -> io::Result<Vec<FsEntry>> {
        let tree = self.tree.lock().unwrap();
        let node = tree
            .nodes
            .get(dir)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, dir.to_string()))?;
        if !node.readable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, dir.to_string()));
        }
        if !node.is_dir {
            return Err(io::Error::new(io::ErrorKind::Other, "not a directory"));
        }

        let children = tree.children.get(dir).cloned().unwrap_or_default();
        Ok(children
            .into_iter()
            .filter_map(|path| {
                let node = tree.nodes.get(&path)?;
                Some(FsEntry {
                    name: name_of(&path).to_string(),
                    is_directory: node.is_dir,
                    path,
                })
            })
            .collect())
    }

    fn stat(&self, entry: &FsEntry) -> io::Result<FsStat> {
        let tree = self.tree.lock().unwrap();
        let node = tree
            .nodes
            .get(&entry.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, entry.path.clone()))?;
        Ok(FsStat {
            size: node.size,
            modified_time: 1_700_000_000_000,
        })
    }

    fn delete(&self, path: &str, recursive: bool) -> io::Result<()> {
        let mut tree = self.tree.lock().unwrap();
        let node = tree
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        if node.is_dir && !recursive {
            return Err(io::Error::new(io::ErrorKind::Other, "directory not empty"));
        }

        let mut doomed = vec![path.to_string()];
        let mut i = 0;
        while i < doomed.len() {
            if let Some(children) = tree.children.get(&doomed[i]) {
                doomed.extend(children.iter().cloned());
            }
            i += 1;
        }
        if doomed.iter().any(|p| tree.undeletable.contains(p)) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, path.to_string()));
        }

        for p in &doomed {
            tree.nodes.remove(p);
            tree.children.remove(p);
        }
        if let Some(parent) = parent_of(path) {
            if let Some(siblings) = tree.children.get_mut(parent) {
                siblings.retain(|p| p != path);
            }
        }
        Ok(())
    }
}

/// Entry store held in memory, with call counters, injected latency and faults.
#[derive(Default)]
pub(crate) struct MemoryStore {
    rows: Mutex<BTreeMap<String, EntryRecord>>,
    latency: Mutex<HashMap<String, Duration>>,
    pub search_calls: AtomicUsize,
    pub upsert_calls: AtomicUsize,
    pub fail_upserts: AtomicBool,
    pub fail_searches: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay lookups for exactly `query` by `delay`.
    pub fn set_latency(&self, query: &str, delay: Duration) {
        self.latency
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
    }

    pub fn paths(&self) -> Vec<String> {
        self.rows.lock().unwrap().keys().cloned().collect()
    }

    pub fn records(&self) -> Vec<EntryRecord> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    fn injected() -> LightningError {
        LightningError::Io(io::Error::new(io::ErrorKind::Other, "injected store fault"))
    }

    fn lookup(
        &self,
        key: &str,
        limit: usize,
        matches: impl Fn(&EntryRecord) -> bool,
    ) -> crate::Result<Vec<EntryRecord>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.latency.lock().unwrap().get(key).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }

        let mut hits: Vec<EntryRecord> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| matches(r))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name_lower.cmp(&b.name_lower))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

impl EntryStore for MemoryStore {
    fn bulk_upsert(&self, records: &[EntryRecord]) -> crate::Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            rows.insert(record.path.clone(), record.clone());
        }
        Ok(())
    }

    fn clear_all(&self) -> crate::Result<()> {
        self.rows.lock().unwrap().clear();
        Ok(())
    }

    fn count_all(&self) -> crate::Result<usize> {
        Ok(self.rows.lock().unwrap().len())
    }

    fn delete_by_path(&self, path: &str) -> crate::Result<bool> {
        Ok(self.rows.lock().unwrap().remove(path).is_some())
    }

    fn search_by_name_substring(
        &self,
        query: &str,
        limit: usize,
    ) -> crate::Result<Vec<EntryRecord>> {
        self.lookup(query, limit, |r| r.name_lower.contains(query))
    }

    fn search_by_name_glob(&self, pattern: &str, limit: usize) -> crate::Result<Vec<EntryRecord>> {
        let suffix = pattern.trim_start_matches('*').to_string();
        self.lookup(pattern, limit, move |r| r.name_lower.ends_with(&suffix))
    }
}
