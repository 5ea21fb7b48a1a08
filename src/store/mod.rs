//! Ordered key-value store with per-database read/write locks.
//!
//! Every project owns one database per [`DatabaseKind`]. A database is a sorted
//! byte-keyed map that is optionally backed by an append-only log on disk
//! (see [`wal`]). Access always goes through a [`ScopedDb`] handle obtained
//! from [`StoreRegistry::acquire`], which holds the database lock until it is
//! dropped:
//!
//! - `LockMode::Write` is exclusive, `LockMode::Read` is shared.
//! - Acquisition blocks until granted; there is no timeout.
//! - A [`Batch`] commit is applied under the write lock and logged as one
//!   record, so readers and crash recovery never see part of it.

mod wal;

use crate::cache;
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::types::ProjectId;
use dashmap::DashMap;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Arc;
use wal::StoreLog;

/// Logical databases kept per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseKind {
    /// Location key -> cursor info
    Symbol,
    /// Symbol name -> location set
    SymbolName,
}

impl DatabaseKind {
    pub const ALL: [DatabaseKind; 2] = [DatabaseKind::Symbol, DatabaseKind::SymbolName];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::SymbolName => "symbol-name",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// A single mutation, as applied to the map and written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

// ============================================================================
// Database
// ============================================================================

pub(crate) struct Database {
    kind: DatabaseKind,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    log: Option<StoreLog>,
    compact_after_records: usize,
}

impl Database {
    fn in_memory(kind: DatabaseKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
            log: None,
            compact_after_records: usize::MAX,
        }
    }

    fn open(kind: DatabaseKind, path: PathBuf, config: &IndexConfig) -> Result<Self> {
        let (log, entries) = StoreLog::open(path, kind, config.sync_writes)?;
        tracing::debug!("Opened {} database with {} entries", kind, entries.len());
        Ok(Self {
            kind,
            entries,
            log: Some(log),
            compact_after_records: config.compact_after_records,
        })
    }

    /// Log first, then apply. A failed append leaves the map untouched. Once
    /// the append succeeds the commit is durable, so a failed compaction
    /// afterwards is only logged.
    fn apply(&mut self, ops: Vec<Op>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if let Some(log) = self.log.as_mut() {
            log.append(&ops)?;
        }
        wal::apply_ops(&mut self.entries, ops);
        if let Some(log) = self.log.as_mut() {
            if log.records() >= self.compact_after_records {
                tracing::debug!("Compacting {} log after {} records", self.kind, log.records());
                if let Err(e) = log.compact(&self.entries) {
                    tracing::warn!("Failed to compact {} log: {}", self.kind, e);
                }
            }
        }
        Ok(())
    }

    fn compact(&mut self) -> Result<()> {
        match self.log.as_mut() {
            Some(log) => log.compact(&self.entries),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

type SharedDatabase = Arc<RwLock<Database>>;

/// Opens databases on first use and hands out locked handles to them.
pub struct StoreRegistry {
    config: IndexConfig,
    /// Root of on-disk storage. `None` keeps everything in memory.
    data_root: Option<PathBuf>,
    databases: DashMap<(ProjectId, DatabaseKind), SharedDatabase>,
}

impl StoreRegistry {
    /// Registry whose databases live only in memory.
    pub fn in_memory() -> Self {
        Self {
            config: IndexConfig::default(),
            data_root: None,
            databases: DashMap::new(),
        }
    }

    /// Registry persisting every database under `data_root`.
    pub fn persistent(data_root: PathBuf, config: IndexConfig) -> Self {
        Self {
            config,
            data_root: Some(data_root),
            databases: DashMap::new(),
        }
    }

    pub fn data_root(&self) -> Option<&std::path::Path> {
        self.data_root.as_deref()
    }

    fn database(&self, project: ProjectId, kind: DatabaseKind) -> Result<SharedDatabase> {
        let entry = self
            .databases
            .entry((project, kind))
            .or_try_insert_with(|| -> Result<SharedDatabase> {
                let db = match &self.data_root {
                    Some(root) => Database::open(
                        kind,
                        cache::database_path(root, project, kind),
                        &self.config,
                    )?,
                    None => Database::in_memory(kind),
                };
                Ok(Arc::new(RwLock::new(db)))
            })?;
        // Clone out so the map shard is released before we block on the lock.
        Ok(entry.value().clone())
    }

    /// Acquire a handle on one project database, blocking until the lock is
    /// granted.
    pub fn acquire(
        &self,
        project: ProjectId,
        kind: DatabaseKind,
        mode: LockMode,
    ) -> Result<ScopedDb> {
        let db = self.database(project, kind)?;
        let guard = match mode {
            LockMode::Read => Guard::Read(db.read_arc()),
            LockMode::Write => Guard::Write(db.write_arc()),
        };
        Ok(ScopedDb {
            project,
            kind,
            guard,
        })
    }

    /// Rewrite the logs of a project's databases as compact snapshots.
    pub fn compact(&self, project: ProjectId) -> Result<()> {
        for kind in DatabaseKind::ALL {
            let mut db = self.acquire(project, kind, LockMode::Write)?;
            db.compact()?;
        }
        Ok(())
    }

    /// Forget open databases of a project. Persistent data stays on disk.
    /// A database with a live [`ScopedDb`] stays registered, so a later
    /// `acquire` never opens a second log on the same file. Returns the
    /// number of databases released.
    pub fn close(&self, project: ProjectId) -> usize {
        let mut released = 0;
        for kind in DatabaseKind::ALL {
            let removed = self
                .databases
                .remove_if(&(project, kind), |_, db| Arc::strong_count(db) == 1);
            if removed.is_some() {
                released += 1;
            } else if self.databases.contains_key(&(project, kind)) {
                tracing::debug!("Keeping {} database of {} open: still in use", kind, project);
            }
        }
        released
    }
}

// ============================================================================
// Scoped handle
// ============================================================================

enum Guard {
    Read(ArcRwLockReadGuard<RawRwLock, Database>),
    Write(ArcRwLockWriteGuard<RawRwLock, Database>),
}

/// A locked database. The lock is released when the handle is dropped.
pub struct ScopedDb {
    project: ProjectId,
    kind: DatabaseKind,
    guard: Guard,
}

impl ScopedDb {
    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    pub fn lock_mode(&self) -> LockMode {
        match self.guard {
            Guard::Read(_) => LockMode::Read,
            Guard::Write(_) => LockMode::Write,
        }
    }

    fn db(&self) -> &Database {
        match &self.guard {
            Guard::Read(guard) => &**guard,
            Guard::Write(guard) => &**guard,
        }
    }

    fn db_mut(&mut self) -> Result<&mut Database> {
        match &mut self.guard {
            Guard::Write(guard) => Ok(&mut **guard),
            Guard::Read(_) => Err(IndexError::ReadOnly { kind: self.kind }),
        }
    }

    /// Fail unless this handle is a write handle on `kind`.
    pub fn ensure_writable(&self, kind: DatabaseKind) -> Result<()> {
        if self.kind != kind {
            return Err(IndexError::WrongDatabase {
                expected: kind,
                found: self.kind,
            });
        }
        match self.lock_mode() {
            LockMode::Write => Ok(()),
            found => Err(IndexError::LockMode {
                kind,
                expected: LockMode::Write,
                found,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.db().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db().entries.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.db().entries.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.db().entries.contains_key(key)
    }

    /// All entries in ascending key order. Call again to restart.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.db().entries.iter(),
        }
    }

    /// Cursor positioned before the first entry.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            position: Bound::Unbounded,
        }
    }

    /// Cursor positioned at the first key `>= key`.
    pub fn seek(&self, key: &[u8]) -> Cursor {
        Cursor {
            position: Bound::Included(key.to_vec()),
        }
    }

    /// Write one key immediately, independent of any batch.
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        self.db_mut()?.apply(vec![Op::Put(key.into(), value.into())])
    }

    /// Remove one key immediately. Returns whether the key existed.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        let db = self.db_mut()?;
        if !db.entries.contains_key(key) {
            return Ok(false);
        }
        db.apply(vec![Op::Delete(key.to_vec())])?;
        Ok(true)
    }

    pub fn compact(&mut self) -> Result<()> {
        self.db_mut()?.compact()
    }
}

impl fmt::Debug for ScopedDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedDb")
            .field("project", &self.project)
            .field("kind", &self.kind)
            .field("mode", &self.lock_mode())
            .finish()
    }
}

/// Borrowing iterator over a locked database.
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, Vec<u8>, Vec<u8>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Seek-based position in a database.
///
/// Unlike [`Iter`] a cursor does not borrow the handle between steps, so the
/// owner may write single keys while scanning. Each step resumes after the
/// last returned key.
#[derive(Debug, Clone)]
pub struct Cursor {
    position: Bound<Vec<u8>>,
}

impl Cursor {
    pub fn next(&mut self, db: &ScopedDb) -> Option<(Vec<u8>, Vec<u8>)> {
        let lower: Bound<&[u8]> = match &self.position {
            Bound::Included(key) => Bound::Included(key.as_slice()),
            Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let (key, value) = db
            .db()
            .entries
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(key, value)| (key.clone(), value.clone()))?;
        self.position = Bound::Excluded(key.clone());
        Some((key, value))
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Mutations staged for one atomic commit.
#[derive(Debug)]
pub struct Batch {
    kind: DatabaseKind,
    ops: Vec<Op>,
}

impl Batch {
    pub fn new(kind: DatabaseKind) -> Self {
        Self {
            kind,
            ops: Vec::new(),
        }
    }

    pub fn add(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(Op::Put(key.into(), value.into()));
    }

    pub fn remove(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(Op::Delete(key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every staged op as one unit. Returns the number of ops applied.
    pub fn commit(self, db: &mut ScopedDb) -> Result<usize> {
        if db.kind != self.kind {
            return Err(IndexError::WrongDatabase {
                expected: self.kind,
                found: db.kind,
            });
        }
        let count = self.ops.len();
        db.db_mut()?.apply(self.ops)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const PROJECT: ProjectId = ProjectId(1);

    #[test]
    fn test_iteration_is_ordered() {
        let registry = StoreRegistry::in_memory();
        let mut db = registry
            .acquire(PROJECT, DatabaseKind::SymbolName, LockMode::Write)
            .unwrap();
        db.set("b", "2").unwrap();
        db.set("a", "1").unwrap();
        db.set("c", "3").unwrap();

        let keys: Vec<&[u8]> = db.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b".as_slice(), b"c".as_slice()]);
        // restartable
        assert_eq!(db.iter().count(), 3);
    }

    #[test]
    fn test_cursor_survives_writes() {
        let registry = StoreRegistry::in_memory();
        let mut db = registry
            .acquire(PROJECT, DatabaseKind::SymbolName, LockMode::Write)
            .unwrap();
        for key in ["a", "b", "c", "d"] {
            db.set(key, "x").unwrap();
        }

        let mut cursor = db.cursor();
        let mut seen = Vec::new();
        while let Some((key, _)) = cursor.next(&db) {
            if key == b"b" {
                db.remove(b"c").unwrap();
            }
            seen.push(key);
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_seek_is_inclusive() {
        let registry = StoreRegistry::in_memory();
        let mut db = registry
            .acquire(PROJECT, DatabaseKind::SymbolName, LockMode::Write)
            .unwrap();
        db.set("foo", "1").unwrap();
        db.set("foobar", "2").unwrap();
        db.set("zap", "3").unwrap();

        let mut cursor = db.seek(b"foo");
        assert_eq!(cursor.next(&db).unwrap().0, b"foo".to_vec());
        assert_eq!(cursor.next(&db).unwrap().0, b"foobar".to_vec());
    }

    #[test]
    fn test_batch_commit() {
        let registry = StoreRegistry::in_memory();
        let mut db = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Write)
            .unwrap();
        db.set("gone", "x").unwrap();

        let mut batch = Batch::new(DatabaseKind::Symbol);
        batch.add("k1", "v1");
        batch.add("k2", "v2");
        batch.remove("gone");
        assert_eq!(batch.commit(&mut db).unwrap(), 3);

        assert_eq!(db.get(b"k1"), Some(b"v1".as_slice()));
        assert!(!db.contains_key(b"gone"));
    }

    #[test]
    fn test_read_handle_rejects_writes() {
        let registry = StoreRegistry::in_memory();
        let mut db = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Read)
            .unwrap();
        assert!(matches!(db.set("k", "v"), Err(IndexError::ReadOnly { .. })));

        let mut batch = Batch::new(DatabaseKind::Symbol);
        batch.add("k", "v");
        assert!(matches!(
            batch.commit(&mut db),
            Err(IndexError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_batch_for_other_database_is_rejected() {
        let registry = StoreRegistry::in_memory();
        let mut db = registry
            .acquire(PROJECT, DatabaseKind::SymbolName, LockMode::Write)
            .unwrap();
        let mut batch = Batch::new(DatabaseKind::Symbol);
        batch.add("k", "v");
        assert!(matches!(
            batch.commit(&mut db),
            Err(IndexError::WrongDatabase { .. })
        ));
        assert!(db.is_empty());
    }

    #[test]
    fn test_readers_share_the_lock() {
        let registry = StoreRegistry::in_memory();
        let a = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Read)
            .unwrap();
        let b = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Read)
            .unwrap();
        assert_eq!(a.lock_mode(), LockMode::Read);
        assert_eq!(b.lock_mode(), LockMode::Read);
    }

    #[test]
    fn test_writer_blocks_readers_until_released() {
        let registry = Arc::new(StoreRegistry::in_memory());
        let mut writer = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Write)
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let reader_registry = registry.clone();
        let handle = thread::spawn(move || {
            let db = reader_registry
                .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Read)
                .unwrap();
            tx.send(db.get(b"k").map(|v| v.to_vec())).unwrap();
        });

        // The reader cannot get in while the write lock is held.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        let mut batch = Batch::new(DatabaseKind::Symbol);
        batch.add("k", "committed");
        batch.commit(&mut writer).unwrap();
        drop(writer);

        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, Some(b"committed".to_vec()));
        handle.join().unwrap();
    }

    #[test]
    fn test_close_releases_idle_databases() {
        let registry = StoreRegistry::in_memory();
        {
            let mut db = registry
                .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Write)
                .unwrap();
            db.set("k", "v").unwrap();
        }
        registry
            .acquire(PROJECT, DatabaseKind::SymbolName, LockMode::Read)
            .unwrap();

        assert_eq!(registry.close(PROJECT), 2);
        let db = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Read)
            .unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_close_keeps_database_in_use() {
        let registry = StoreRegistry::in_memory();
        {
            let mut db = registry
                .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Write)
                .unwrap();
            db.set("k", "v").unwrap();
        }
        let held = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Read)
            .unwrap();

        assert_eq!(registry.close(PROJECT), 0);
        let again = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Read)
            .unwrap();
        assert_eq!(again.get(b"k"), Some(b"v".as_slice()));
        drop(again);
        drop(held);

        assert_eq!(registry.close(PROJECT), 1);
    }

    #[test]
    fn test_failed_auto_compaction_keeps_commit() {
        let temp = tempfile::TempDir::new().unwrap();
        let data_root = temp.path().join("data");
        let config = IndexConfig::persistent(&data_root).with_compact_after(2);
        let registry = StoreRegistry::persistent(data_root.clone(), config);

        let mut db = registry
            .acquire(PROJECT, DatabaseKind::Symbol, LockMode::Write)
            .unwrap();
        db.set("a", "1").unwrap();
        // The open log survives, but compaction cannot create its snapshot.
        std::fs::remove_dir_all(&data_root).unwrap();

        let mut batch = Batch::new(DatabaseKind::Symbol);
        batch.add("b", "2");
        assert_eq!(batch.commit(&mut db).unwrap(), 1);
        assert_eq!(db.get(b"b"), Some(b"2".as_slice()));
    }

    #[test]
    fn test_projects_are_independent() {
        let registry = StoreRegistry::in_memory();
        let _held = registry
            .acquire(ProjectId(1), DatabaseKind::Symbol, LockMode::Write)
            .unwrap();
        let other = registry
            .acquire(ProjectId(2), DatabaseKind::Symbol, LockMode::Write)
            .unwrap();
        assert!(other.is_empty());
    }
}
