//! Query pipeline: normalization, debounce, lookup, sorting, publication.

use crate::config::Config;
use crate::entry::EntryRecord;
use crate::generation::{Generation, GenerationCounter};
use crate::state::StateCell;
use crate::store::EntryStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default cap on results per lookup
pub const DEFAULT_RESULT_LIMIT: usize = 500;

/// Default quiet period before a typed query runs
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Ordering applied to held results. Directories always come first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    #[default]
    NameAsc,
    NameDesc,
    SizeAsc,
    SizeDesc,
    DateAsc,
    DateDesc,
}

impl SortMode {
    pub const ALL: [SortMode; 6] = [
        SortMode::NameAsc,
        SortMode::NameDesc,
        SortMode::SizeAsc,
        SortMode::SizeDesc,
        SortMode::DateAsc,
        SortMode::DateDesc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameAsc => "name-asc",
            Self::NameDesc => "name-desc",
            Self::SizeAsc => "size-asc",
            Self::SizeDesc => "size-desc",
            Self::DateAsc => "date-asc",
            Self::DateDesc => "date-desc",
        }
    }

    fn compare(&self, a: &EntryRecord, b: &EntryRecord) -> Ordering {
        let by_name = || a.name_lower.cmp(&b.name_lower);
        match self {
            Self::NameAsc => by_name(),
            Self::NameDesc => by_name().reverse(),
            Self::SizeAsc => a.size.cmp(&b.size).then_with(by_name),
            Self::SizeDesc => b.size.cmp(&a.size).then_with(by_name),
            Self::DateAsc => a.modified_time.cmp(&b.modified_time).then_with(by_name),
            Self::DateDesc => b.modified_time.cmp(&a.modified_time).then_with(by_name),
        }
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let options: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown sort mode '{}' (expected one of {})", s, options.join(", "))
            })
    }
}

/// Sort in place: directories before files, then by `mode`.
pub fn sort_entries(entries: &mut [EntryRecord], mode: SortMode) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| mode.compare(a, b))
    });
}

/// Trim and lowercase; `None` for blank input.
pub fn normalize_query(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Lookup tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: usize,
    /// Treat `*` and `?` as wildcards
    pub glob: bool,
}

impl QueryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.search.result_limit,
            glob: config.search.glob,
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RESULT_LIMIT,
            glob: true,
        }
    }
}

/// Results of one lookup, in store order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Normalized query; empty for blank input
    pub query: String,
    pub results: Vec<EntryRecord>,
    pub elapsed_ms: u64,
}

/// Run one lookup against the store.
///
/// Blank input returns an empty outcome without touching the store. Store
/// errors are logged and produce an empty result list.
pub fn execute_query(store: &dyn EntryStore, raw: &str, options: QueryOptions) -> QueryOutcome {
    let Some(query) = normalize_query(raw) else {
        return QueryOutcome::default();
    };

    let use_glob = options.glob && query.contains(['*', '?']);
    let started = Instant::now();
    let lookup = if use_glob {
        store.search_by_name_glob(&query, options.limit)
    } else {
        store.search_by_name_substring(&query, options.limit)
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let results = lookup.unwrap_or_else(|e| {
        warn!(query = %query, error = %e, "lookup failed, returning no results");
        Vec::new()
    });
    debug!(query = %query, hits = results.len(), elapsed_ms, "lookup finished");

    QueryOutcome {
        query,
        results,
        elapsed_ms,
    }
}

/// As-you-type search over a store, publishing into a [`StateCell`].
///
/// Every query change takes a new generation and replaces the pending
/// debounce task. A lookup result is published only while its generation is
/// still current, so an older query can never overwrite a newer one.
pub struct QueryPipeline {
    store: Arc<dyn EntryStore>,
    state: StateCell,
    options: QueryOptions,
    debounce: Duration,
    generations: Arc<GenerationCounter>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn EntryStore>,
        state: StateCell,
        options: QueryOptions,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            state,
            options,
            debounce,
            generations: Arc::new(GenerationCounter::new()),
            pending: Mutex::new(None),
        }
    }

    /// Record the new input and schedule a lookup after the debounce window.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_query_change(&self, raw: &str) {
        // Held across advance and replace so handle order follows generation order
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generations.advance();
        self.state.update(|s| {
            s.query = raw.to_string();
            s.is_searching = true;
        });

        let task = tokio::spawn(debounced_lookup(
            Arc::clone(&self.store),
            self.state.clone(),
            Arc::clone(&self.generations),
            self.options,
            self.debounce,
            generation,
            raw.to_string(),
        ));

        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }

    /// Change the sort mode and re-sort the held results without a lookup.
    pub fn set_sort_mode(&self, mode: SortMode) {
        self.state.update(|s| {
            s.sort_mode = mode;
            sort_entries(&mut s.results, mode);
        });
    }

    /// One-shot lookup without debounce or publication.
    pub async fn search(&self, raw: &str) -> QueryOutcome {
        let store = Arc::clone(&self.store);
        let options = self.options;
        let raw = raw.to_string();
        tokio::task::spawn_blocking(move || execute_query(store.as_ref(), &raw, options))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "lookup task failed");
                QueryOutcome::default()
            })
    }

    pub fn current_generation(&self) -> Generation {
        self.generations.current()
    }
}

async fn debounced_lookup(
    store: Arc<dyn EntryStore>,
    state: StateCell,
    generations: Arc<GenerationCounter>,
    options: QueryOptions,
    debounce: Duration,
    generation: Generation,
    raw: String,
) {
    tokio::time::sleep(debounce).await;
    if !generations.is_current(generation) {
        return;
    }

    if normalize_query(&raw).is_none() {
        state.update_if(|s| {
            if !generations.is_current(generation) {
                return false;
            }
            s.results.clear();
            s.result_count = 0;
            s.search_time_ms = 0;
            s.is_searching = false;
            true
        });
        return;
    }

    let outcome = tokio::task::spawn_blocking(move || execute_query(store.as_ref(), &raw, options))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "lookup task failed");
            QueryOutcome::default()
        });

    // Checked under the state lock: a newer generation that already published
    // (or is about to) always wins.
    let published = state.update_if(|s| {
        if !generations.is_current(generation) {
            return false;
        }
        let mut results = outcome.results;
        sort_entries(&mut results, s.sort_mode);
        s.result_count = results.len();
        s.results = results;
        s.search_time_ms = outcome.elapsed_ms;
        s.is_searching = false;
        true
    });
    if !published {
        debug!(%generation, "discarding superseded lookup result");
    }
}
