//! Throttled, non-blocking progress publication for index runs.

use crate::indexer::IndexPhase;
use crate::state::StateCell;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Default number of new records between progress updates
pub const DEFAULT_PROGRESS_STEP: usize = 1000;

/// Latest progress of the current (or last) index run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexProgress {
    pub indexed: usize,
    pub current_path: String,
    pub phase: IndexPhase,
}

/// Publishes `(indexed, current_path)` at most once per `step` records.
///
/// Publication goes through a watch channel, so a slow consumer only ever
/// sees the newest value and the traversal never waits on it.
pub struct ProgressReporter {
    tx: Arc<watch::Sender<IndexProgress>>,
    state: StateCell,
    step: usize,
    last_reported: usize,
}

impl ProgressReporter {
    pub fn new(tx: Arc<watch::Sender<IndexProgress>>, state: StateCell, step: usize) -> Self {
        Self {
            tx,
            state,
            step: step.max(1),
            last_reported: 0,
        }
    }

    /// Reset counters and announce a running index.
    pub fn begin(&mut self) {
        self.last_reported = 0;
        self.tx.send_replace(IndexProgress {
            indexed: 0,
            current_path: String::new(),
            phase: IndexPhase::Running,
        });
        self.state.update(|s| {
            s.is_indexing = true;
            s.index_progress = 0;
            s.index_current_path.clear();
        });
    }

    /// Record that `indexed` entries are done; publishes only past the step.
    pub fn advance(&mut self, indexed: usize, current_path: &str) -> bool {
        if indexed.saturating_sub(self.last_reported) < self.step {
            return false;
        }
        self.last_reported = indexed;
        self.tx.send_replace(IndexProgress {
            indexed,
            current_path: current_path.to_string(),
            phase: IndexPhase::Running,
        });
        self.state.update(|s| {
            s.index_progress = indexed;
            s.index_current_path = current_path.to_string();
        });
        true
    }

    /// Publish the final count and the phase the run settled in.
    pub fn finish(&mut self, indexed: usize, total_indexed: usize, phase: IndexPhase) {
        self.tx.send_replace(IndexProgress {
            indexed,
            current_path: String::new(),
            phase,
        });
        self.state.update(|s| {
            s.is_indexing = false;
            s.index_progress = indexed;
            s.index_current_path.clear();
            s.total_indexed = total_indexed;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(step: usize) -> (ProgressReporter, watch::Receiver<IndexProgress>, StateCell) {
        let (tx, rx) = watch::channel(IndexProgress::default());
        let state = StateCell::new();
        (ProgressReporter::new(Arc::new(tx), state.clone(), step), rx, state)
    }

    #[test]
    fn publishes_only_after_step() {
        let (mut reporter, rx, _state) = reporter(1000);
        reporter.begin();

        let published: usize = (1..=3500)
            .filter(|i| reporter.advance(*i, "/r/dir"))
            .count();
        assert_eq!(published, 3);
        assert_eq!(rx.borrow().indexed, 3000);
        assert_eq!(rx.borrow().current_path, "/r/dir");
    }

    #[test]
    fn begin_and_finish_drive_state_flags() {
        let (mut reporter, rx, state) = reporter(10);
        reporter.begin();
        assert!(state.snapshot().is_indexing);
        assert_eq!(rx.borrow().phase, IndexPhase::Running);

        reporter.advance(10, "/r");
        assert_eq!(state.snapshot().index_progress, 10);

        reporter.finish(12, 12, IndexPhase::Idle);
        let snap = state.snapshot();
        assert!(!snap.is_indexing);
        assert_eq!(snap.total_indexed, 12);
        assert_eq!(rx.borrow().phase, IndexPhase::Idle);
        assert_eq!(rx.borrow().indexed, 12);
    }

    #[test]
    fn begin_resets_throttle() {
        let (mut reporter, _rx, _state) = reporter(5);
        reporter.begin();
        assert!(reporter.advance(5, "/a"));
        reporter.begin();
        assert!(reporter.advance(5, "/a"));
    }
}
