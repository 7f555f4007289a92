//! The database: tables of documents plus optional durability.

use crate::config::StoreConfig;
use crate::document::{Document, DocumentExt};
use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::journal::{Journal, JournalEntry, JournalWrite};
use crate::transaction::Transaction;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Table name -> (document id -> document).
pub(crate) type Tables = HashMap<String, BTreeMap<String, Document>>;

const SNAPSHOT_FILE: &str = "snapshot.json";
const SNAPSHOT_TMP_FILE: &str = "snapshot.json.tmp";
const JOURNAL_FILE: &str = "journal.jsonl";
const LOCK_FILE: &str = "LOCK";

#[derive(Serialize)]
struct SnapshotRef<'a> {
    seq: u64,
    tables: &'a Tables,
}

#[derive(Deserialize)]
struct Snapshot {
    seq: u64,
    tables: Tables,
}

#[derive(Debug)]
struct Durable {
    dir: PathBuf,
    journal: Journal,
    commits_since_checkpoint: usize,
}

/// Row counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Number of stored documents.
    pub rows: usize,
}

/// An embedded document store.
///
/// Readers run concurrently; writers are serialized by a single write lock
/// held for the whole transaction closure, so each transaction observes and
/// replaces state atomically.
///
/// A durable database holds a lock on its directory for as long as it lives:
/// exclusive for writable handles, shared for read-only ones. Dropping a
/// handle releases the lock without a checkpoint; committed transactions are
/// already in the journal and are replayed by the next open.
///
/// # Example
///
/// ```rust
/// use deltasync_store::Database;
/// use serde_json::json;
///
/// let db = Database::open_in_memory();
/// db.transaction(|txn| {
///     let doc = json!({"id": "a"}).as_object().cloned().unwrap();
///     txn.put("items", "a", doc)
/// })
/// .unwrap();
/// assert!(db.get("items", "a").unwrap().is_some());
/// ```
pub struct Database {
    tables: RwLock<Tables>,
    durable: Option<Mutex<Durable>>,
    dir: Option<PathBuf>,
    _lock: Option<File>,
    config: StoreConfig,
    next_seq: AtomicU64,
    is_open: AtomicBool,
}

impl Database {
    /// Opens an ephemeral in-memory database.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            durable: None,
            dir: None,
            _lock: None,
            config: StoreConfig::default(),
            next_seq: AtomicU64::new(1),
            is_open: AtomicBool::new(true),
        }
    }

    /// Opens a durable database in `dir` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the stored
    /// state cannot be loaded.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        Self::open_with_config(dir, StoreConfig::default())
    }

    /// Opens a durable database in `dir`.
    ///
    /// Locks the directory, loads the snapshot, then replays journal entries
    /// committed after it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another handle holds a conflicting
    /// lock, or an error if the directory is missing and cannot be created,
    /// or if the snapshot or journal is corrupted.
    pub fn open_with_config(dir: &Path, config: StoreConfig) -> StoreResult<Self> {
        if !dir.exists() {
            if !config.create_if_missing || config.read_only {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("data directory {} does not exist", dir.display()),
                )));
            }
            std::fs::create_dir_all(dir)?;
        }

        let lock = lock_dir(dir, config.read_only)?;
        let (mut tables, snapshot_seq) = Self::load_snapshot(&dir.join(SNAPSHOT_FILE))?;

        let journal_path = dir.join(JOURNAL_FILE);
        let mut last_seq = snapshot_seq;
        let mut replayed = 0usize;
        for entry in Journal::replay(&journal_path)? {
            if entry.seq <= snapshot_seq {
                continue;
            }
            last_seq = last_seq.max(entry.seq);
            apply_writes(&mut tables, entry.writes);
            replayed += 1;
        }

        tracing::info!(
            dir = %dir.display(),
            tables = tables.len(),
            snapshot_seq,
            replayed,
            read_only = config.read_only,
            "opened database"
        );

        let durable = if config.read_only {
            None
        } else {
            Some(Mutex::new(Durable {
                dir: dir.to_path_buf(),
                journal: Journal::open(&journal_path)?,
                commits_since_checkpoint: replayed,
            }))
        };
        Ok(Self {
            tables: RwLock::new(tables),
            durable,
            dir: Some(dir.to_path_buf()),
            _lock: Some(lock),
            config,
            next_seq: AtomicU64::new(last_seq + 1),
            is_open: AtomicBool::new(true),
        })
    }

    fn load_snapshot(path: &Path) -> StoreResult<(Tables, u64)> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((HashMap::new(), 0));
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupted(format!("snapshot {}: {}", path.display(), e)))?;
        Ok((snapshot.tables, snapshot.seq))
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, its writes are journaled (for durable
    /// databases) and applied atomically. If it returns `Err`, nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, [`StoreError::Closed`],
    /// [`StoreError::ReadOnly`], or the journal write error. A failed
    /// journal write closes the database, since the journal tail can no
    /// longer be trusted.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    {
        self.ensure_writable()?;
        let mut tables = self.tables.write();

        let (value, writes) = {
            let mut txn = Transaction::new(&tables);
            let value = f(&mut txn)?;
            (value, txn.into_writes())
        };

        if writes.is_empty() {
            return Ok(value);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let Some(durable) = &self.durable else {
            apply_writes(&mut tables, writes);
            return Ok(value);
        };

        let mut durable = durable.lock();
        let entry = JournalEntry { seq, writes };
        if let Err(e) = durable.journal.append(&entry, self.config.sync_on_commit) {
            tracing::error!(error = %e, seq, "journal append failed, closing database");
            self.is_open.store(false, Ordering::SeqCst);
            return Err(e);
        }
        apply_writes(&mut tables, entry.writes);
        durable.commits_since_checkpoint += 1;

        let every = self.config.checkpoint_every;
        if every > 0 && durable.commits_since_checkpoint >= every {
            // The commit is already durable in the journal.
            if let Err(e) = write_snapshot(&tables, &mut durable, seq) {
                tracing::warn!(error = %e, "automatic checkpoint failed");
            }
        }

        Ok(value)
    }

    /// Gets a document by table and id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the database is closed.
    pub fn get(&self, table: &str, id: &str) -> StoreResult<Option<Document>> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    /// Returns every document of `table` matching `filter`, ordered by id.
    ///
    /// An unknown table is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the database is closed.
    pub fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let tables = self.tables.read();
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Runs several filters against one consistent view of `table`.
    ///
    /// Result `i` holds the matches of `filters[i]`. No write can land
    /// between the individual selects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the database is closed.
    pub fn select_many(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Vec<Document>>> {
        self.ensure_open()?;
        let tables = self.tables.read();
        let rows = tables.get(table);
        Ok(filters
            .iter()
            .map(|filter| {
                rows.map(|rows| {
                    rows.values()
                        .filter(|doc| filter.matches(doc))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
            })
            .collect())
    }

    /// Counts documents of `table` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the database is closed.
    pub fn count(&self, table: &str, filter: &Filter) -> StoreResult<usize> {
        self.ensure_open()?;
        let tables = self.tables.read();
        Ok(tables
            .get(table)
            .map(|rows| rows.values().filter(|doc| filter.matches(doc)).count())
            .unwrap_or(0))
    }

    /// Returns the largest epoch-millisecond value stored under any of
    /// `columns`, across every table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the database is closed.
    pub fn max_millis(&self, columns: &[&str]) -> StoreResult<Option<i64>> {
        self.ensure_open()?;
        let tables = self.tables.read();
        Ok(tables
            .values()
            .flat_map(BTreeMap::values)
            .flat_map(|doc| columns.iter().filter_map(move |column| doc.millis(column)))
            .max())
    }

    /// Returns per-table row counts, ordered by table name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if the database is closed.
    pub fn stats(&self) -> StoreResult<Vec<TableStats>> {
        self.ensure_open()?;
        let tables = self.tables.read();
        let mut stats: Vec<TableStats> = tables
            .iter()
            .map(|(name, rows)| TableStats {
                name: name.clone(),
                rows: rows.len(),
            })
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stats)
    }

    /// Folds the journal into a fresh snapshot.
    ///
    /// No-op for in-memory databases.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] for read-only handles, or an error if
    /// the snapshot cannot be written.
    pub fn checkpoint(&self) -> StoreResult<()> {
        self.ensure_writable()?;
        let Some(durable) = &self.durable else {
            return Ok(());
        };
        let tables = self.tables.read();
        let mut durable = durable.lock();
        let seq = self.committed_seq();
        write_snapshot(&tables, &mut durable, seq)
    }

    /// Returns the sequence number of the last committed transaction.
    #[must_use]
    pub fn committed_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Returns the data directory of a durable database.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.dir.clone()
    }

    /// Returns true if the database was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Closes the database.
    ///
    /// A writable durable database with commits since its last checkpoint
    /// writes a final checkpoint first. Read-only handles never write.
    ///
    /// # Errors
    ///
    /// Returns an error if the final checkpoint fails.
    pub fn close(&self) -> StoreResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        let pending = self
            .durable
            .as_ref()
            .is_some_and(|d| d.lock().commits_since_checkpoint > 0);
        let result = if pending { self.checkpoint() } else { Ok(()) };
        self.is_open.store(false, Ordering::SeqCst);
        result
    }

    /// Returns true if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        self.ensure_open()?;
        if self.config.read_only {
            Err(StoreError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

/// Takes the directory lock: shared for readers, exclusive for writers.
fn lock_dir(dir: &Path, shared: bool) -> StoreResult<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.join(LOCK_FILE))?;

    let locked = if shared {
        FileExt::try_lock_shared(&file)
    } else {
        FileExt::try_lock_exclusive(&file)
    };
    if locked.is_err() {
        return Err(StoreError::Locked(dir.to_path_buf()));
    }
    Ok(file)
}

fn apply_writes(tables: &mut Tables, writes: Vec<JournalWrite>) {
    for write in writes {
        tables
            .entry(write.table)
            .or_default()
            .insert(write.id, write.doc);
    }
}

fn write_snapshot(tables: &Tables, durable: &mut Durable, seq: u64) -> StoreResult<()> {
    let tmp = durable.dir.join(SNAPSHOT_TMP_FILE);
    let bytes = serde_json::to_vec(&SnapshotRef { seq, tables })?;
    {
        let file = std::fs::File::create(&tmp)?;
        let mut writer = std::io::BufWriter::new(&file);
        std::io::Write::write_all(&mut writer, &bytes)?;
        std::io::Write::flush(&mut writer)?;
        drop(writer);
        file.sync_all()?;
    }
    std::fs::rename(&tmp, durable.dir.join(SNAPSHOT_FILE))?;
    durable.journal.truncate()?;
    durable.commits_since_checkpoint = 0;
    tracing::debug!(seq, "checkpoint written");
    Ok(())
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.tables.read().len())
            .field("dir", &self.dir)
            .field("read_only", &self.config.read_only)
            .field("committed_seq", &self.committed_seq())
            .field("is_open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn put(db: &Database, table: &str, value: serde_json::Value) {
        let d = doc(value);
        let id = d["id"].as_str().unwrap().to_string();
        db.transaction(|txn| txn.put(table, &id, d)).unwrap();
    }

    #[test]
    fn simple_put_get() {
        let db = Database::open_in_memory();
        put(&db, "t", json!({"id": "a", "v": 1}));

        assert_eq!(db.get("t", "a").unwrap().unwrap()["v"], 1);
        assert!(db.get("t", "b").unwrap().is_none());
        assert!(db.get("missing", "a").unwrap().is_none());
        assert_eq!(db.committed_seq(), 1);
    }

    #[test]
    fn aborted_transaction_writes_nothing() {
        let db = Database::open_in_memory();
        let result: StoreResult<()> = db.transaction(|txn| {
            txn.put("t", "a", doc(json!({"id": "a"})))?;
            Err(StoreError::aborted("nope"))
        });

        assert!(matches!(result, Err(StoreError::TransactionAborted { .. })));
        assert!(db.get("t", "a").unwrap().is_none());
        assert_eq!(db.committed_seq(), 0);
    }

    #[test]
    fn multi_table_transaction_is_atomic() {
        let db = Database::open_in_memory();
        db.transaction(|txn| {
            txn.put("a", "1", doc(json!({"id": "1"})))?;
            txn.put("b", "1", doc(json!({"id": "1"})))
        })
        .unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(
            stats,
            vec![
                TableStats { name: "a".into(), rows: 1 },
                TableStats { name: "b".into(), rows: 1 },
            ]
        );
        assert_eq!(db.committed_seq(), 1);
    }

    #[test]
    fn select_and_count_apply_filter() {
        let db = Database::open_in_memory();
        put(&db, "t", json!({"id": "a", "ts": 10}));
        put(&db, "t", json!({"id": "b", "ts": 20}));
        put(&db, "t", json!({"id": "c", "ts": 30}));

        let hits = db.select("t", &Filter::new().gt("ts", 15)).unwrap();
        let ids: Vec<_> = hits.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        assert_eq!(db.count("t", &Filter::new().le("ts", 20)).unwrap(), 2);
        assert!(db.select("none", &Filter::new()).unwrap().is_empty());
    }

    #[test]
    fn max_millis_spans_tables_and_columns() {
        let db = Database::open_in_memory();
        assert_eq!(db.max_millis(&["a", "b"]).unwrap(), None);

        put(&db, "t", json!({"id": "x", "a": 10, "b": 40}));
        put(&db, "u", json!({"id": "y", "a": 25, "b": null}));
        put(&db, "u", json!({"id": "z", "c": 99}));

        assert_eq!(db.max_millis(&["a"]).unwrap(), Some(25));
        assert_eq!(db.max_millis(&["a", "b"]).unwrap(), Some(40));
        assert_eq!(db.max_millis(&["d"]).unwrap(), None);
    }

    #[test]
    fn select_many_returns_one_result_per_filter() {
        let db = Database::open_in_memory();
        put(&db, "t", json!({"id": "a", "ts": 10}));
        put(&db, "t", json!({"id": "b", "ts": 20}));

        let results = db
            .select_many(
                "t",
                &[
                    Filter::new().gt("ts", 15),
                    Filter::new().le("ts", 15),
                    Filter::new().gt("ts", 99),
                ],
            )
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0][0]["id"], "b");
        assert_eq!(results[1][0]["id"], "a");
        assert!(results[2].is_empty());

        let results = db.select_many("none", &[Filter::new()]).unwrap();
        assert_eq!(results, vec![Vec::<Document>::new()]);
    }

    #[test]
    fn closed_database_rejects_operations() {
        let db = Database::open_in_memory();
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(db.get("t", "a"), Err(StoreError::Closed)));
        assert!(matches!(
            db.transaction(|_| Ok(())),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn journal_replay_after_reopen() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new().checkpoint_every(0);

        {
            let db = Database::open_with_config(dir.path(), config.clone()).unwrap();
            put(&db, "t", json!({"id": "a", "v": 1}));
            put(&db, "t", json!({"id": "a", "v": 2}));
            // Dropped without close: the commits live only in the journal.
        }

        let db = Database::open_with_config(dir.path(), config).unwrap();
        assert_eq!(db.get("t", "a").unwrap().unwrap()["v"], 2);
        assert_eq!(db.committed_seq(), 2);
    }

    #[test]
    fn checkpoint_then_reopen() {
        let dir = tempdir().unwrap();

        {
            let db = Database::open(dir.path()).unwrap();
            put(&db, "t", json!({"id": "a"}));
            db.checkpoint().unwrap();
            put(&db, "t", json!({"id": "b"}));
            db.close().unwrap();
        }

        assert!(dir.path().join(SNAPSHOT_FILE).exists());
        let db = Database::open(dir.path()).unwrap();
        assert!(db.get("t", "a").unwrap().is_some());
        assert!(db.get("t", "b").unwrap().is_some());
        assert_eq!(db.committed_seq(), 2);
        assert_eq!(db.path(), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn automatic_checkpoint_truncates_journal() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new().checkpoint_every(2);
        let db = Database::open_with_config(dir.path(), config).unwrap();

        put(&db, "t", json!({"id": "a"}));
        put(&db, "t", json!({"id": "b"}));

        let journal = std::fs::read_to_string(dir.path().join(JOURNAL_FILE)).unwrap();
        assert!(journal.is_empty());
        assert!(dir.path().join(SNAPSHOT_FILE).exists());
    }

    #[test]
    fn missing_dir_without_create_fails() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new().create_if_missing(false);
        let result = Database::open_with_config(&dir.path().join("absent"), config);
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = tempdir().unwrap();
        let first = Database::open(dir.path()).unwrap();
        put(&first, "patients", json!({"id": "a"}));

        let second = Database::open(dir.path());
        assert!(matches!(second, Err(StoreError::Locked(_))));
        let reader = Database::open_with_config(dir.path(), StoreConfig::new().read_only(true));
        assert!(matches!(reader, Err(StoreError::Locked(_))));

        // The first handle goes away without closing, as in a crash.
        drop(first);
        let db = Database::open(dir.path()).unwrap();
        assert!(db.get("patients", "a").unwrap().is_some());
    }

    #[test]
    fn read_only_handle_never_writes() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            put(&db, "t", json!({"id": "a"}));
        }
        let journal = std::fs::read(dir.path().join(JOURNAL_FILE)).unwrap();
        assert!(!journal.is_empty());

        let config = StoreConfig::new().read_only(true);
        let reader = Database::open_with_config(dir.path(), config.clone()).unwrap();
        let other = Database::open_with_config(dir.path(), config).unwrap();
        assert!(reader.is_read_only());
        assert!(reader.get("t", "a").unwrap().is_some());
        assert_eq!(other.committed_seq(), 1);

        assert!(matches!(
            reader.transaction(|txn| txn.put("t", "b", doc(json!({"id": "b"})))),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(reader.checkpoint(), Err(StoreError::ReadOnly)));
        assert!(matches!(Database::open(dir.path()), Err(StoreError::Locked(_))));

        reader.close().unwrap();
        drop(reader);
        drop(other);
        assert_eq!(std::fs::read(dir.path().join(JOURNAL_FILE)).unwrap(), journal);
        assert!(!dir.path().join(SNAPSHOT_FILE).exists());
    }

    #[test]
    fn close_without_commits_writes_no_snapshot() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        assert!(db.get("t", "a").unwrap().is_none());
        db.close().unwrap();
        assert!(!dir.path().join(SNAPSHOT_FILE).exists());
    }

    #[test]
    fn read_only_open_of_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new().read_only(true);
        let result = Database::open_with_config(&dir.path().join("absent"), config);
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(!dir.path().join("absent").exists());
    }

    #[test]
    fn corrupted_snapshot_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SNAPSHOT_FILE), b"{broken").unwrap();
        let result = Database::open(dir.path());
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }
}
