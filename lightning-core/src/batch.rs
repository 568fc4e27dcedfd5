//! Buffered bulk writes of entry records.

use crate::entry::EntryRecord;
use crate::store::EntryStore;
use tracing::warn;

/// Default number of records per bulk write
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Totals from one writer's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub records_written: usize,
    pub records_dropped: usize,
    pub failed_flushes: usize,
}

/// Accumulates records and writes them in fixed-size bulk upserts.
///
/// Store failures are logged and counted; the records of a failed flush are
/// dropped and writing continues with the next batch.
pub struct BatchWriter<'a> {
    store: &'a dyn EntryStore,
    buffer: Vec<EntryRecord>,
    batch_size: usize,
    stats: BatchStats,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn EntryStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            stats: BatchStats::default(),
        }
    }

    pub fn push(&mut self, record: EntryRecord) {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush();
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Write whatever is buffered, then clear the buffer.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match self.store.bulk_upsert(&self.buffer) {
            Ok(()) => self.stats.records_written += self.buffer.len(),
            Err(e) => {
                warn!(records = self.buffer.len(), error = %e, "bulk write failed, continuing");
                self.stats.failed_flushes += 1;
                self.stats.records_dropped += self.buffer.len();
            }
        }
        self.buffer.clear();
    }

    /// Flush the remainder and return the totals.
    pub fn finish(mut self) -> BatchStats {
        self.flush();
        self.stats
    }
}
