//! Index orchestration: one run end-to-end, single-flight, cancellable.
//!
//! A run clears the store (for a rebuild), walks the roots on a producer
//! thread and streams records through a bounded channel to a [`BatchWriter`]
//! on the run thread, so traversal speed is decoupled from write latency and
//! memory stays bounded by the channel plus one batch.

use crate::batch::{BatchWriter, DEFAULT_BATCH_SIZE};
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::entry::EntryRecord;
use crate::fs::FileSystem;
use crate::progress::{IndexProgress, ProgressReporter, DEFAULT_PROGRESS_STEP};
use crate::state::StateCell;
use crate::store::EntryStore;
use crate::walker::{EntryFilter, Walker};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Records in flight between the walker and the writer
const CHANNEL_CAPACITY: usize = 1024;

/// Orchestrator state: `Idle → Running → (Idle | Cancelled)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    #[default]
    Idle,
    Running,
    Cancelled,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Whether a run replaces the index or adds to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Clear every record, then index the roots
    Rebuild,
    /// Index the roots into the existing record set
    Append,
}

/// Summary of one finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub mode: IndexMode,
    /// Records produced by the traversal
    pub indexed: usize,
    /// Records in the store after the run
    pub total_indexed: usize,
    pub cancelled: bool,
    pub failed_flushes: usize,
    pub records_dropped: usize,
    pub elapsed_ms: u64,
}

/// Tunables for index runs
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub batch_size: usize,
    pub progress_step: usize,
    pub filter: EntryFilter,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self {
            batch_size: config.batch_size(),
            progress_step: config.indexing.progress_step,
            filter: EntryFilter::from_config(config)?,
        })
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_step: DEFAULT_PROGRESS_STEP,
            filter: EntryFilter::default(),
        }
    }
}

struct IndexerInner {
    store: Arc<dyn EntryStore>,
    fs: Arc<dyn FileSystem>,
    settings: IndexSettings,
    state: StateCell,
    phase: Mutex<IndexPhase>,
    cancel: Mutex<CancellationToken>,
    progress: Arc<watch::Sender<IndexProgress>>,
}

/// Coordinates index runs against one store. Cheap to clone.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Indexer {
    pub fn new(
        store: Arc<dyn EntryStore>,
        fs: Arc<dyn FileSystem>,
        settings: IndexSettings,
        state: StateCell,
    ) -> Self {
        let (progress, _rx) = watch::channel(IndexProgress::default());
        Self {
            inner: Arc::new(IndexerInner {
                store,
                fs,
                settings,
                state,
                phase: Mutex::new(IndexPhase::Idle),
                cancel: Mutex::new(CancellationToken::new()),
                progress: Arc::new(progress),
            }),
        }
    }

    pub fn phase(&self) -> IndexPhase {
        *lock(&self.inner.phase)
    }

    pub fn is_running(&self) -> bool {
        self.phase() == IndexPhase::Running
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<IndexProgress> {
        self.inner.progress.subscribe()
    }

    /// Ask the current run to stop at its next checkpoint. Buffered records
    /// are still written.
    pub fn cancel(&self) {
        lock(&self.inner.cancel).cancel();
    }

    /// Rebuild the index from `roots` on the blocking pool.
    ///
    /// Returns `None` without doing anything if a run is already active.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, roots: Vec<String>) -> Option<JoinHandle<IndexReport>> {
        self.spawn(roots, IndexMode::Rebuild)
    }

    /// Index one more root without clearing existing records.
    pub fn start_additional(&self, root: String) -> Option<JoinHandle<IndexReport>> {
        self.spawn(vec![root], IndexMode::Append)
    }

    /// Start a rebuild only if the store is empty; otherwise republish the
    /// existing count and return `None`.
    pub async fn check_and_start(&self, roots: Vec<String>) -> Option<JoinHandle<IndexReport>> {
        let store = Arc::clone(&self.inner.store);
        match tokio::task::spawn_blocking(move || store.count_all()).await {
            Ok(Ok(count)) if count > 0 => {
                info!(count, "index already populated, skipping rebuild");
                self.inner.state.update(|s| s.total_indexed = count);
                return None;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "count query failed, rebuilding"),
            Err(e) => warn!(error = %e, "count task failed, rebuilding"),
        }
        self.start(roots)
    }

    /// Run on the calling thread. Returns `None` if a run is already active.
    pub fn run_blocking(&self, roots: Vec<String>, mode: IndexMode) -> Option<IndexReport> {
        let token = self.try_begin()?;
        Some(self.inner.run(roots, token, mode))
    }

    fn spawn(&self, roots: Vec<String>, mode: IndexMode) -> Option<JoinHandle<IndexReport>> {
        let token = self.try_begin()?;
        let inner = Arc::clone(&self.inner);
        Some(tokio::task::spawn_blocking(move || {
            inner.run(roots, token, mode)
        }))
    }

    /// Single-flight guard: claim the `Running` phase and arm a fresh token.
    fn try_begin(&self) -> Option<CancellationToken> {
        let mut phase = lock(&self.inner.phase);
        if *phase == IndexPhase::Running {
            info!("index run already in progress, ignoring start");
            return None;
        }
        // Arm the token before publishing Running so a cancel issued once
        // start has returned always reaches this run
        let token = CancellationToken::new();
        *lock(&self.inner.cancel) = token.clone();
        *phase = IndexPhase::Running;
        Some(token)
    }
}

/// Puts the phase back to `Idle` if a run unwinds before settling it.
struct UnwindGuard<'a> {
    phase: &'a Mutex<IndexPhase>,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *lock(self.phase) = IndexPhase::Idle;
        }
    }
}

impl IndexerInner {
    fn run(&self, roots: Vec<String>, token: CancellationToken, mode: IndexMode) -> IndexReport {
        let mut guard = UnwindGuard {
            phase: &self.phase,
            armed: true,
        };
        let started = Instant::now();
        info!(?roots, ?mode, "index run started");

        let mut reporter = ProgressReporter::new(
            Arc::clone(&self.progress),
            self.state.clone(),
            self.settings.progress_step,
        );
        reporter.begin();

        if mode == IndexMode::Rebuild {
            if let Err(e) = self.store.clear_all() {
                warn!(error = %e, "failed to clear previous index");
            }
        }

        let fs: &dyn FileSystem = self.fs.as_ref();
        let store: &dyn EntryStore = self.store.as_ref();
        let filter = &self.settings.filter;
        let (tx, rx) = crossbeam_channel::bounded::<EntryRecord>(CHANNEL_CAPACITY);

        let (outcome, mut reporter, stats) = std::thread::scope(|s| {
            // Producer: walk and stream records to the writer
            let producer = s.spawn(move || {
                let mut count = 0usize;
                let outcome = Walker::new(fs, filter).walk(&roots, &token, |record| {
                    count += 1;
                    reporter.advance(count, record.parent_path.as_deref().unwrap_or_default());
                    // A closed channel means the writer already bailed out
                    let _ = tx.send(record);
                });
                (outcome, reporter)
                // tx dropped here → receiver sees disconnect
            });

            // Writer: run thread
            let mut writer = BatchWriter::new(store, self.settings.batch_size);
            for record in rx.iter() {
                writer.push(record);
            }
            let stats = writer.finish();

            let (outcome, reporter) = producer
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (outcome, reporter, stats)
        });

        let total_indexed = match self.store.count_all() {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "count query failed after index run");
                outcome.emitted
            }
        };
        let settled = if outcome.cancelled {
            IndexPhase::Cancelled
        } else {
            IndexPhase::Idle
        };

        // Settle under the phase lock so a queued start cannot interleave
        // its own progress with this run's final publication.
        {
            let mut phase = lock(&self.phase);
            reporter.finish(outcome.emitted, total_indexed, settled);
            *phase = settled;
            guard.armed = false;
        }

        let report = IndexReport {
            mode,
            indexed: outcome.emitted,
            total_indexed,
            cancelled: outcome.cancelled,
            failed_flushes: stats.failed_flushes,
            records_dropped: stats.records_dropped,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            indexed = report.indexed,
            total = report.total_indexed,
            cancelled = report.cancelled,
            failed_flushes = report.failed_flushes,
            elapsed_ms = report.elapsed_ms,
            "index run finished"
        );
        report
    }
}
