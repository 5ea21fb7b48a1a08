//! Lookups over the symbol and symbol-name databases.

use crate::error::{IndexError, Result};
use crate::location::{Location, LocationSet, decode_location_set, encode_location_set};
use crate::store::{DatabaseKind, ScopedDb};
use crate::types::CursorInfo;

/// How a symbol-name key matched a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    StartsWith,
}

/// Cursor info stored at `location`, if any.
pub fn find_symbol(symbols: &ScopedDb, location: Location) -> Result<Option<CursorInfo>> {
    match symbols.get(&location.to_key()) {
        Some(bytes) => Ok(Some(CursorInfo::decode(bytes)?)),
        None => Ok(None),
    }
}

/// Locations recorded under exactly `name`.
pub fn locations_for(names: &ScopedDb, name: &str) -> Result<LocationSet> {
    match names.get(name.as_bytes()) {
        Some(bytes) => decode_location_set(bytes),
        None => Ok(LocationSet::new()),
    }
}

/// Report every symbol name that equals or starts with `pattern`, in key
/// order. Returns the number of batches reported.
pub fn find_symbols<F>(names: &ScopedDb, pattern: &str, mut on_match: F) -> Result<usize>
where
    F: FnMut(MatchType, &str, LocationSet) -> Result<()>,
{
    let mut cursor = names.seek(pattern.as_bytes());
    let mut batches = 0;
    while let Some((key, value)) = cursor.next(names) {
        if !key.starts_with(pattern.as_bytes()) {
            break;
        }
        let name = std::str::from_utf8(&key).map_err(|_| {
            IndexError::corruption(DatabaseKind::SymbolName, "symbol name is not UTF-8")
        })?;
        let match_type = if name.len() == pattern.len() {
            MatchType::Exact
        } else {
            MatchType::StartsWith
        };
        batches += 1;
        on_match(match_type, name, decode_location_set(&value)?)?;
    }
    Ok(batches)
}

/// Add `location` under `name`, writing the key immediately.
pub fn add_symbol_name(names: &mut ScopedDb, name: &str, location: Location) -> Result<()> {
    let mut locations = locations_for(names, name)?;
    if locations.insert(location) {
        names.set(name.as_bytes(), encode_location_set(&locations))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LockMode, StoreRegistry};
    use crate::types::{CursorKind, FileId, ProjectId};

    fn names_db(registry: &StoreRegistry) -> ScopedDb {
        registry
            .acquire(ProjectId(1), DatabaseKind::SymbolName, LockMode::Write)
            .unwrap()
    }

    #[test]
    fn test_find_symbols_match_types() {
        let registry = StoreRegistry::in_memory();
        let mut names = names_db(&registry);
        add_symbol_name(&mut names, "Widget", Location::new(FileId(1), 1)).unwrap();
        add_symbol_name(&mut names, "WidgetFactory", Location::new(FileId(2), 1)).unwrap();
        add_symbol_name(&mut names, "Window", Location::new(FileId(3), 1)).unwrap();

        let mut seen = Vec::new();
        let batches = find_symbols(&names, "Widget", |ty, name, locations| {
            seen.push((ty, name.to_string(), locations.len()));
            Ok(())
        })
        .unwrap();

        assert_eq!(batches, 2);
        assert_eq!(
            seen,
            vec![
                (MatchType::Exact, "Widget".to_string(), 1),
                (MatchType::StartsWith, "WidgetFactory".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_no_match() {
        let registry = StoreRegistry::in_memory();
        let mut names = names_db(&registry);
        add_symbol_name(&mut names, "alpha", Location::new(FileId(1), 1)).unwrap();
        let batches = find_symbols(&names, "beta", |_, _, _| Ok(())).unwrap();
        assert_eq!(batches, 0);
    }

    #[test]
    fn test_add_symbol_name_merges() {
        let registry = StoreRegistry::in_memory();
        let mut names = names_db(&registry);
        add_symbol_name(&mut names, "foo", Location::new(FileId(7), 10)).unwrap();
        add_symbol_name(&mut names, "foo", Location::new(FileId(9), 20)).unwrap();
        add_symbol_name(&mut names, "foo", Location::new(FileId(9), 20)).unwrap();
        assert_eq!(locations_for(&names, "foo").unwrap().len(), 2);
    }

    #[test]
    fn test_find_symbol_decodes_cursor() {
        let registry = StoreRegistry::in_memory();
        let mut symbols = registry
            .acquire(ProjectId(1), DatabaseKind::Symbol, LockMode::Write)
            .unwrap();
        let loc = Location::new(FileId(4), 12);
        let info = CursorInfo::new(CursorKind::StructDecl, "Point").definition();
        symbols.set(loc.to_key(), info.encode().unwrap()).unwrap();

        assert_eq!(find_symbol(&symbols, loc).unwrap(), Some(info));
        assert_eq!(
            find_symbol(&symbols, Location::new(FileId(4), 13)).unwrap(),
            None
        );
    }
}
