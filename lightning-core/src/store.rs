//! Entry store contract and the SQLite implementation.

use crate::entry::EntryRecord;
use crate::error::LightningError;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const SCHEMA_VERSION: i32 = 1;

/// Shared column list for entry queries; matches the `entry_from_row` column order.
const ENTRY_SELECT: &str =
    "path, name, name_lower, extension, size, modified_time, is_directory, parent_path";

/// Persistence contract used by the indexer and the query pipeline.
///
/// Lookups return directories first, then ascending `name_lower`.
pub trait EntryStore: Send + Sync {
    /// Insert records, replacing any existing row with the same `path`.
    fn bulk_upsert(&self, records: &[EntryRecord]) -> crate::Result<()>;

    fn clear_all(&self) -> crate::Result<()>;

    fn count_all(&self) -> crate::Result<usize>;

    /// Remove one row. Returns whether a row existed.
    fn delete_by_path(&self, path: &str) -> crate::Result<bool>;

    /// Records whose `name_lower` contains `query`.
    fn search_by_name_substring(&self, query: &str, limit: usize)
        -> crate::Result<Vec<EntryRecord>>;

    /// Records whose `name_lower` matches a `*`/`?` glob pattern.
    fn search_by_name_glob(&self, pattern: &str, limit: usize) -> crate::Result<Vec<EntryRecord>>;
}

/// Entry store backed by SQLite
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `db_path`
    pub fn open(db_path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            ",
        )?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> crate::Result<()> {
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version != 0 && version != SCHEMA_VERSION {
            return Err(LightningError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS entries (
                    path TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL,
                    name_lower TEXT NOT NULL,
                    extension TEXT,
                    size INTEGER NOT NULL,
                    modified_time INTEGER NOT NULL,
                    is_directory INTEGER NOT NULL,
                    parent_path TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_entries_name_lower ON entries(name_lower);
                CREATE INDEX IF NOT EXISTS idx_entries_extension ON entries(extension);
                CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries(parent_path);

                PRAGMA user_version = 1;
                ",
            )?;
        }

        Ok(())
    }

    /// A panic while holding the lock leaves the connection usable; SQLite
    /// rolls back any open transaction on drop.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query_entries(
        &self,
        predicate: &str,
        needle: &str,
        limit: usize,
    ) -> crate::Result<Vec<EntryRecord>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {ENTRY_SELECT} FROM entries
             WHERE {predicate}
             ORDER BY is_directory DESC, name_lower ASC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![needle, limit as i64], entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

impl EntryStore for SqliteStore {
    fn bulk_upsert(&self, records: &[EntryRecord]) -> crate::Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO entries
                 (path, name, name_lower, extension, size, modified_time, is_directory, parent_path)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.path,
                    record.name,
                    record.name_lower,
                    record.extension,
                    record.size as i64,
                    record.modified_time,
                    record.is_directory,
                    record.parent_path,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_all(&self) -> crate::Result<()> {
        self.lock().execute("DELETE FROM entries", [])?;
        Ok(())
    }

    fn count_all(&self) -> crate::Result<usize> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn delete_by_path(&self, path: &str) -> crate::Result<bool> {
        let removed = self
            .lock()
            .execute("DELETE FROM entries WHERE path = ?", params![path])?;
        Ok(removed > 0)
    }

    fn search_by_name_substring(
        &self,
        query: &str,
        limit: usize,
    ) -> crate::Result<Vec<EntryRecord>> {
        // instr() keeps % and _ literal, unlike LIKE
        self.query_entries("instr(name_lower, ?1) > 0", query, limit)
    }

    fn search_by_name_glob(&self, pattern: &str, limit: usize) -> crate::Result<Vec<EntryRecord>> {
        self.query_entries("name_lower GLOB ?1", pattern, limit)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<EntryRecord> {
    let size: i64 = row.get(4)?;
    Ok(EntryRecord {
        path: row.get(0)?,
        name: row.get(1)?,
        name_lower: row.get(2)?,
        extension: row.get(3)?,
        size: size.max(0) as u64,
        modified_time: row.get(5)?,
        is_directory: row.get(6)?,
        parent_path: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(path: &str, size: u64) -> EntryRecord {
        let (parent, name) = path.rsplit_once('/').unwrap();
        EntryRecord::new(path, name, false, size, 1_000, Some(parent.to_string()))
    }

    fn dir(path: &str) -> EntryRecord {
        let (parent, name) = path.rsplit_once('/').unwrap();
        EntryRecord::new(path, name, true, 0, 1_000, Some(parent.to_string()))
    }

    #[test]
    fn upsert_replaces_on_same_path() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.bulk_upsert(&[file("/r/a.txt", 1)]).unwrap();
        store
            .bulk_upsert(&[file("/r/a.txt", 2), file("/r/a.txt", 3)])
            .unwrap();

        assert_eq!(store.count_all().unwrap(), 1);
        let hits = store.search_by_name_substring("a.txt", 10).unwrap();
        assert_eq!(hits[0].size, 3);
    }

    #[test]
    fn substring_search_orders_directories_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_upsert(&[
                file("/r/alpha_report.txt", 1),
                dir("/r/Reports"),
                file("/r/beta_report.txt", 1),
                file("/r/unrelated.md", 1),
            ])
            .unwrap();

        let names: Vec<String> = store
            .search_by_name_substring("report", 10)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Reports", "alpha_report.txt", "beta_report.txt"]);
    }

    #[test]
    fn substring_search_treats_wildcards_literally() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_upsert(&[file("/r/100%_done.txt", 1), file("/r/1000.txt", 1)])
            .unwrap();

        let hits = store.search_by_name_substring("100%", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "100%_done.txt");
    }

    #[test]
    fn search_respects_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records: Vec<EntryRecord> = (0..20).map(|i| file(&format!("/r/f{i}.log"), 1)).collect();
        store.bulk_upsert(&records).unwrap();

        assert_eq!(store.search_by_name_substring("f", 5).unwrap().len(), 5);
    }

    #[test]
    fn glob_search_matches_pattern() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_upsert(&[file("/r/a.txt", 1), file("/r/b.md", 1), file("/r/c.txt", 1)])
            .unwrap();

        let hits = store.search_by_name_glob("*.txt", 10).unwrap();
        let names: Vec<&str> = hits.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
    }

    #[test]
    fn delete_by_path_does_not_cascade() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .bulk_upsert(&[dir("/r/sub"), file("/r/sub/inner.txt", 1)])
            .unwrap();

        assert!(store.delete_by_path("/r/sub").unwrap());
        assert!(!store.delete_by_path("/r/sub").unwrap());
        assert_eq!(store.count_all().unwrap(), 1);
    }

    #[test]
    fn clear_all_empties_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.bulk_upsert(&[file("/r/a", 1), file("/r/b", 1)]).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.count_all().unwrap(), 0);
    }

    #[test]
    fn reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.bulk_upsert(&[file("/r/a.txt", 1)]).unwrap();
        }
        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.count_all().unwrap(), 1);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch("PRAGMA user_version = 9;").unwrap();
        }
        match SqliteStore::open(&db_path) {
            Err(LightningError::SchemaVersionMismatch { found, expected }) => {
                assert_eq!(found, 9);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("expected schema mismatch, got {:?}", other.map(|_| ())),
        }
    }
}
