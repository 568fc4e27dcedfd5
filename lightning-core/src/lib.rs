//! Lightning Core - Snapshot file indexing and as-you-type name search
//!
//! This library walks root directories into a SQLite-backed index of entry
//! records and serves debounced substring search over entry names.

pub mod batch;
pub mod cancel;
pub mod config;
pub mod delete;
pub mod entry;
pub mod error;
pub mod fs;
pub mod generation;
pub mod indexer;
pub mod progress;
pub mod query;
pub mod session;
pub mod state;
pub mod store;
pub mod walker;

#[cfg(test)]
mod testing;

pub use cancel::CancellationToken;
pub use config::Config;
pub use entry::EntryRecord;
pub use error::{ErrorEnvelope, LightningError};
pub use fs::{FileSystem, LocalFs};
pub use indexer::{IndexMode, IndexPhase, IndexReport, Indexer};
pub use progress::IndexProgress;
pub use query::{QueryOutcome, SortMode};
pub use session::SearchSession;
pub use state::SearchState;
pub use store::{EntryStore, SqliteStore};

/// Result type alias for lightning operations
pub type Result<T> = std::result::Result<T, LightningError>;
