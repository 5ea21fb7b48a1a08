//! Invalidation of index entries that depend on changed files.
//!
//! A [`DirtyJob`] runs against write handles on both databases of a project,
//! which the caller acquires (symbol first, then symbol-name) and holds for
//! the whole run:
//!
//! 1. The symbol database is scanned in key order. Entries located in a dirty
//!    file, and entries whose cursor info points into one, are removed in a
//!    single batch.
//! 2. The symbol-name database is scanned and every location in a dirty file
//!    is dropped from each set. Each key is rewritten (or deleted when its
//!    set becomes empty) on its own, so an interrupted run leaves every
//!    processed key consistent and a rerun finishes the job.

use crate::error::{IndexError, Result};
use crate::location::{Location, decode_location_set, encode_location_set};
use crate::store::{Batch, DatabaseKind, ScopedDb};
use crate::types::{CursorInfo, FileId};
use serde::Serialize;
use std::collections::HashSet;

/// Counts from one invalidation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirtyReport {
    /// Symbol entries removed.
    pub symbols_removed: usize,
    /// Symbol-name keys whose location set shrank but stayed non-empty.
    pub names_rewritten: usize,
    /// Symbol-name keys deleted because no location was left.
    pub names_removed: usize,
}

impl DirtyReport {
    pub fn total(&self) -> usize {
        self.symbols_removed + self.names_rewritten + self.names_removed
    }
}

pub struct DirtyJob<'a> {
    dirty: HashSet<FileId>,
    symbols: &'a mut ScopedDb,
    symbol_names: &'a mut ScopedDb,
}

impl<'a> DirtyJob<'a> {
    /// Fails unless both handles are write handles on the expected
    /// databases of the same project.
    pub fn new(
        dirty: HashSet<FileId>,
        symbols: &'a mut ScopedDb,
        symbol_names: &'a mut ScopedDb,
    ) -> Result<Self> {
        symbols.ensure_writable(DatabaseKind::Symbol)?;
        symbol_names.ensure_writable(DatabaseKind::SymbolName)?;
        if symbols.project() != symbol_names.project() {
            return Err(IndexError::ProjectMismatch(
                symbols.project(),
                symbol_names.project(),
            ));
        }
        Ok(Self {
            dirty,
            symbols,
            symbol_names,
        })
    }

    pub fn run(self) -> Result<DirtyReport> {
        let mut report = DirtyReport::default();
        if self.dirty.is_empty() {
            return Ok(report);
        }

        report.symbols_removed = dirty_symbols(self.symbols, &self.dirty)?;
        let (rewritten, removed) = dirty_symbol_names(self.symbol_names, &self.dirty)?;
        report.names_rewritten = rewritten;
        report.names_removed = removed;

        tracing::info!(
            "Dirtied {} files: removed {} symbols, rewrote {} names, removed {} names",
            self.dirty.len(),
            report.symbols_removed,
            report.names_rewritten,
            report.names_removed
        );
        Ok(report)
    }
}

fn dirty_symbols(db: &mut ScopedDb, dirty: &HashSet<FileId>) -> Result<usize> {
    let mut batch = Batch::new(DatabaseKind::Symbol);
    for (key, value) in db.iter() {
        let location = Location::from_key(key)?;
        if location.is_dirty(dirty) {
            batch.remove(key);
            continue;
        }
        let cursor = CursorInfo::decode(value).map_err(|e| {
            IndexError::corruption(
                DatabaseKind::Symbol,
                format!("cursor info at {location}: {e}"),
            )
        })?;
        if cursor.dirty(dirty) {
            tracing::debug!("{} depends on a dirty file, removing", location);
            batch.remove(key);
        }
    }
    batch.commit(db)
}

fn dirty_symbol_names(db: &mut ScopedDb, dirty: &HashSet<FileId>) -> Result<(usize, usize)> {
    let mut rewritten = 0;
    let mut removed = 0;
    let mut cursor = db.cursor();
    while let Some((key, value)) = cursor.next(db) {
        let mut locations = decode_location_set(&value)?;
        let before = locations.len();
        locations.retain(|loc| !loc.is_dirty(dirty));
        if locations.len() == before {
            continue;
        }
        if locations.is_empty() {
            tracing::debug!(
                "No references to {} anymore, removing",
                String::from_utf8_lossy(&key)
            );
            db.remove(&key)?;
            removed += 1;
        } else {
            tracing::debug!(
                "References to {} modified, rewriting",
                String::from_utf8_lossy(&key)
            );
            db.set(key, encode_location_set(&locations))?;
            rewritten += 1;
        }
    }
    Ok((rewritten, removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LockMode, StoreRegistry};
    use crate::types::{CursorKind, ProjectId};

    fn open(registry: &StoreRegistry) -> (ScopedDb, ScopedDb) {
        let symbols = registry
            .acquire(ProjectId(1), DatabaseKind::Symbol, LockMode::Write)
            .unwrap();
        let names = registry
            .acquire(ProjectId(1), DatabaseKind::SymbolName, LockMode::Write)
            .unwrap();
        (symbols, names)
    }

    #[test]
    fn test_requires_write_handles() {
        let registry = StoreRegistry::in_memory();
        let mut symbols = registry
            .acquire(ProjectId(1), DatabaseKind::Symbol, LockMode::Read)
            .unwrap();
        let mut names = registry
            .acquire(ProjectId(1), DatabaseKind::SymbolName, LockMode::Write)
            .unwrap();
        let result = DirtyJob::new([FileId(1)].into(), &mut symbols, &mut names);
        assert!(matches!(result, Err(IndexError::LockMode { .. })));
    }

    #[test]
    fn test_rejects_swapped_handles() {
        let registry = StoreRegistry::in_memory();
        let (mut symbols, mut names) = open(&registry);
        let result = DirtyJob::new([FileId(1)].into(), &mut names, &mut symbols);
        assert!(matches!(result, Err(IndexError::WrongDatabase { .. })));
    }

    #[test]
    fn test_bad_key_width_is_fatal() {
        let registry = StoreRegistry::in_memory();
        let (mut symbols, mut names) = open(&registry);
        symbols.set(vec![0u8; 5], Vec::<u8>::new()).unwrap();

        let err = DirtyJob::new([FileId(1)].into(), &mut symbols, &mut names)
            .unwrap()
            .run()
            .unwrap_err();
        assert!(err.is_corruption());
        // Nothing was committed.
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn test_dependent_entries_are_removed() {
        let registry = StoreRegistry::in_memory();
        let (mut symbols, mut names) = open(&registry);
        let call = Location::new(FileId(2), 40);
        let info = CursorInfo::new(CursorKind::Reference, "helper")
            .with_target(Location::new(FileId(5), 0));
        symbols.set(call.to_key(), info.encode().unwrap()).unwrap();
        let untouched = Location::new(FileId(2), 80);
        symbols
            .set(
                untouched.to_key(),
                CursorInfo::new(CursorKind::Variable, "x").encode().unwrap(),
            )
            .unwrap();

        let report = DirtyJob::new([FileId(5)].into(), &mut symbols, &mut names)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(report.symbols_removed, 1);
        assert!(!symbols.contains_key(&call.to_key()));
        assert!(symbols.contains_key(&untouched.to_key()));
    }

    #[test]
    fn test_empty_dirty_set_is_noop() {
        let registry = StoreRegistry::in_memory();
        let (mut symbols, mut names) = open(&registry);
        symbols.set(vec![0u8; 3], Vec::<u8>::new()).unwrap();
        let report = DirtyJob::new(HashSet::new(), &mut symbols, &mut names)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(report, DirtyReport::default());
    }
}
