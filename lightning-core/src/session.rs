//! Session facade: one store, one indexer, one query pipeline, one state.

use crate::config::{Config, DEFAULT_CONFIG};
use crate::delete::delete_path;
use crate::fs::{FileSystem, LocalFs};
use crate::indexer::{IndexReport, IndexSettings, Indexer};
use crate::progress::IndexProgress;
use crate::query::{QueryOptions, QueryOutcome, QueryPipeline, SortMode};
use crate::state::{SearchState, StateCell};
use crate::store::{EntryStore, SqliteStore};
use crate::{LightningError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default data directory, relative to the working directory
pub const DATA_DIR_NAME: &str = ".lightning";
pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "index.db";

/// Everything a presentation layer drives: indexing, searching, deleting,
/// and the observable [`SearchState`].
pub struct SearchSession {
    config: Config,
    store: Arc<dyn EntryStore>,
    fs: Arc<dyn FileSystem>,
    state: StateCell,
    indexer: Indexer,
    pipeline: QueryPipeline,
}

impl SearchSession {
    /// Create `data_dir` with a default config and an empty store.
    pub fn init(data_dir: &Path) -> Result<()> {
        let config_path = data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(LightningError::ConfigExists(config_path));
        }
        std::fs::create_dir_all(data_dir)?;
        std::fs::write(&config_path, DEFAULT_CONFIG)?;
        SqliteStore::open(&data_dir.join(DB_FILE))?;
        info!(data_dir = %data_dir.display(), "initialized");
        Ok(())
    }

    /// Read the config of an initialized data directory.
    pub fn load_config(data_dir: &Path) -> Result<Config> {
        let config_path = data_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(LightningError::NotInitialized(data_dir.to_path_buf()));
        }
        Config::load(&config_path)
    }

    /// Open an initialized data directory against the local filesystem.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let config = Self::load_config(data_dir)?;
        Self::open_with_config(data_dir, config)
    }

    /// Like [`open`](Self::open), with a caller-adjusted config.
    pub fn open_with_config(data_dir: &Path, config: Config) -> Result<Self> {
        let store = SqliteStore::open(&data_dir.join(DB_FILE))?;
        Self::new(config, Arc::new(store), Arc::new(LocalFs))
    }

    pub fn new(config: Config, store: Arc<dyn EntryStore>, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let state = StateCell::new();
        let settings = IndexSettings::from_config(&config)?;
        let indexer = Indexer::new(
            Arc::clone(&store),
            Arc::clone(&fs),
            settings,
            state.clone(),
        );
        let pipeline = QueryPipeline::new(
            Arc::clone(&store),
            state.clone(),
            QueryOptions::from_config(&config),
            config.debounce_duration(),
        );
        Ok(Self {
            config,
            store,
            fs,
            state,
            indexer,
            pipeline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// Current snapshot
    pub fn state(&self) -> SearchState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<IndexProgress> {
        self.indexer.subscribe_progress()
    }

    /// Record the outcome of the host's access-grant flow.
    pub fn set_permission_granted(&self, granted: bool) {
        self.state.update(|s| s.has_permission = granted);
    }

    /// `roots`, or the configured roots when none are given.
    pub fn resolve_roots(&self, roots: Vec<String>) -> Vec<String> {
        if roots.is_empty() {
            self.config.indexing.roots.clone()
        } else {
            roots
        }
    }

    /// Rebuild the index. `None` if a run is already active.
    pub fn start_indexing(&self, roots: Vec<String>) -> Option<JoinHandle<IndexReport>> {
        self.indexer.start(self.resolve_roots(roots))
    }

    /// Rebuild only when the store is empty.
    pub async fn check_and_start_indexing(
        &self,
        roots: Vec<String>,
    ) -> Option<JoinHandle<IndexReport>> {
        self.indexer.check_and_start(self.resolve_roots(roots)).await
    }

    /// Add one root to the existing index without clearing it.
    pub fn index_additional_root(&self, root: String) -> Option<JoinHandle<IndexReport>> {
        self.indexer.start_additional(root)
    }

    pub fn cancel_indexing(&self) {
        self.indexer.cancel();
    }

    pub fn on_query_change(&self, raw: &str) {
        self.pipeline.on_query_change(raw);
    }

    pub fn set_sort_mode(&self, mode: SortMode) {
        self.pipeline.set_sort_mode(mode);
    }

    pub async fn search(&self, raw: &str) -> QueryOutcome {
        self.pipeline.search(raw).await
    }

    /// Delete `path` from disk and the index; on success drop it and anything
    /// beneath it from the held results and refresh the record count.
    pub async fn delete(&self, path: &str) -> bool {
        let fs = Arc::clone(&self.fs);
        let store = Arc::clone(&self.store);
        let target = path.to_string();
        let deleted = match tokio::task::spawn_blocking(move || {
            delete_path(fs.as_ref(), store.as_ref(), &target)
        })
        .await
        {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(path, error = %e, "delete task failed");
                false
            }
        };

        if deleted {
            self.state.update(|s| {
                let removed = Path::new(path);
                s.results.retain(|r| !Path::new(&r.path).starts_with(removed));
                s.result_count = s.results.len();
            });
            if let Err(e) = self.refresh_total().await {
                warn!(error = %e, "count refresh after delete failed");
            }
        }
        deleted
    }

    /// Re-read the record count and publish it as `total_indexed`.
    pub async fn refresh_total(&self) -> Result<usize> {
        let store = Arc::clone(&self.store);
        let count = tokio::task::spawn_blocking(move || store.count_all()).await??;
        self.state.update(|s| s.total_indexed = count);
        Ok(count)
    }
}
