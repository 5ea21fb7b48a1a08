//! Ingestion of externally parsed index data.
//!
//! The index core never parses source code. A parser hands over one
//! [`IndexedFile`] per translation unit or header, plus the build records of
//! the compilation units, and [`Indexer`] writes them into the project's
//! graph, build records and both databases.
//!
//! Paths may be relative; they are resolved against the project root.

use crate::error::Result;
use crate::location::Location;
use crate::project::Project;
use crate::store::{Batch, DatabaseKind, ScopedDb};
use crate::symbols::add_symbol_name;
use crate::types::{CursorInfo, CursorKind, FileId, IncludeKind, IncludePath, Source};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A location named by path, as produced by a parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedLocation {
    pub path: PathBuf,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSymbol {
    pub position: u32,
    pub kind: CursorKind,
    /// Name recorded in the symbol-name database. Unnamed occurrences are
    /// only stored by location.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub definition: bool,
    #[serde(default)]
    pub targets: Vec<IndexedLocation>,
    #[serde(default)]
    pub references: Vec<IndexedLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub path: PathBuf,
    /// Files this one includes directly.
    #[serde(default)]
    pub includes: Vec<PathBuf>,
    #[serde(default)]
    pub symbols: Vec<IndexedSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedIncludePath {
    pub path: PathBuf,
    #[serde(default = "default_include_kind")]
    pub kind: IncludeKind,
}

fn default_include_kind() -> IncludeKind {
    IncludeKind::Angle
}

/// Build record of one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSource {
    pub file: PathBuf,
    #[serde(default)]
    pub build_index: usize,
    #[serde(default)]
    pub include_paths: Vec<IndexedIncludePath>,
}

/// Everything a parser run produced, in the JSON layout the CLI reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub files: Vec<IndexedFile>,
    #[serde(default)]
    pub sources: Vec<IndexedSource>,
}

impl IndexSnapshot {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Paths of every file this snapshot replaces.
    pub fn file_paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|file| file.path.as_path())
    }
}

/// Counts from one ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub symbols: usize,
    pub names: usize,
    pub build_records: usize,
}

/// Writes parser output into a project.
pub struct Indexer<'a> {
    project: &'a Project,
}

impl<'a> Indexer<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project }
    }

    /// Ingest a whole snapshot: files first, then build records.
    pub fn ingest_snapshot(
        &self,
        symbols: &mut ScopedDb,
        symbol_names: &mut ScopedDb,
        snapshot: &IndexSnapshot,
    ) -> Result<IngestReport> {
        let mut report = self.ingest(symbols, symbol_names, &snapshot.files)?;
        for source in &snapshot.sources {
            self.add_source(source);
            report.build_records += 1;
        }
        tracing::info!(
            "Ingested {} files: {} symbols, {} names, {} build records",
            report.files,
            report.symbols,
            report.names,
            report.build_records
        );
        Ok(report)
    }

    /// Register `files`, replace their include edges and store their
    /// symbols. All cursor infos go into the symbol database in one batch.
    pub fn ingest(
        &self,
        symbols: &mut ScopedDb,
        symbol_names: &mut ScopedDb,
        files: &[IndexedFile],
    ) -> Result<IngestReport> {
        symbols.ensure_writable(DatabaseKind::Symbol)?;
        symbol_names.ensure_writable(DatabaseKind::SymbolName)?;

        let mut report = IngestReport::default();
        let mut batch = Batch::new(DatabaseKind::Symbol);
        let mut names = Vec::new();

        for file in files {
            let file_id = self.project.file_id(&file.path);
            let includes: Vec<FileId> = file
                .includes
                .iter()
                .map(|path| self.project.file_id(path))
                .collect();
            self.project.graph.write().set_includes(file_id, includes);

            for symbol in &file.symbols {
                let location = Location::new(file_id, symbol.position);
                let info = self.cursor_info(symbol);
                batch.add(location.to_key(), info.encode()?);
                if let Some(name) = symbol.name.as_deref().filter(|name| !name.is_empty()) {
                    names.push((name, location));
                }
            }
            report.files += 1;
            tracing::debug!(
                "Ingested {} ({} symbols)",
                file.path.display(),
                file.symbols.len()
            );
        }

        report.symbols = batch.commit(symbols)?;
        for (name, location) in names {
            add_symbol_name(symbol_names, name, location)?;
            report.names += 1;
        }
        Ok(report)
    }

    fn cursor_info(&self, symbol: &IndexedSymbol) -> CursorInfo {
        let mut info = CursorInfo::new(symbol.kind, symbol.name.clone().unwrap_or_default());
        info.is_definition = symbol.definition;
        info.targets = symbol.targets.iter().map(|loc| self.location(loc)).collect();
        info.references = symbol
            .references
            .iter()
            .map(|loc| self.location(loc))
            .collect();
        info
    }

    fn location(&self, location: &IndexedLocation) -> Location {
        Location::new(self.project.file_id(&location.path), location.position)
    }

    fn add_source(&self, source: &IndexedSource) {
        let file = self.project.file_id(&source.file);
        let mut record = Source::new(self.project.absolute(&source.file));
        for include in &source.include_paths {
            record = record.with_include(IncludePath {
                path: self.project.absolute(&include.path),
                kind: include.kind,
            });
        }
        self.project.add_source(file, source.build_index, record);
    }
}
