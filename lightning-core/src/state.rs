//! The observable search snapshot consumed by the presentation layer.

use crate::entry::EntryRecord;
use crate::query::SortMode;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything a renderer needs, published as one value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<EntryRecord>,
    pub result_count: usize,
    pub search_time_ms: u64,
    pub is_searching: bool,
    pub is_indexing: bool,
    pub index_progress: usize,
    pub index_current_path: String,
    pub total_indexed: usize,
    pub has_permission: bool,
    pub sort_mode: SortMode,
}

/// Single-writer-at-a-time cell holding the current [`SearchState`].
///
/// Updates run under the channel's write lock and are visible to readers as a
/// whole; subscribers are woken on every published change.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<SearchState>>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SearchState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Clone of the current snapshot
    pub fn snapshot(&self) -> SearchState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.tx.subscribe()
    }

    /// Apply `f` to the state and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut SearchState)) {
        self.tx.send_modify(f);
    }

    /// Apply `f`; subscribers are notified only when it returns true.
    pub fn update_if(&self, f: impl FnOnce(&mut SearchState) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
