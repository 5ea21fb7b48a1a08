//! `#include` suggestions for a symbol.
//!
//! Given a symbol name and the file asking for it, find the definitions of
//! that name, map each one to the headers that would bring it into scope and
//! spell those headers the way the requester's compilation unit can reach
//! them:
//!
//! - `#include "rel"` when the header lives under the requester's source
//!   directory (or a quote-only include directory),
//! - `#include <rel>` for every angle include directory that contains it.
//!
//! Deeper spellings that only restate a shorter one are dropped, the rest are
//! ordered shortest first.

use crate::error::Result;
use crate::files::{FileRegistry, is_header};
use crate::graph::DependencyLookup;
use crate::location::{Location, LocationSet};
use crate::sources::SourceLookup;
use crate::store::ScopedDb;
use crate::symbols::{MatchType, find_symbol, find_symbols};
use crate::types::{FileId, Source};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Length of `#include ` shared by every suggestion.
const DIRECTIVE_LEN: usize = "#include ".len();

/// Result of an include query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// A build record was found; `suggestions` lines were emitted.
    Resolved { suggestions: usize },
    /// Neither the requester nor any file depending on it has a build
    /// record for the requested configuration.
    NoBuildRecord,
}

/// Project metadata the resolver reads.
#[derive(Clone, Copy)]
pub struct IncludeContext<'a> {
    pub files: &'a FileRegistry,
    pub graph: &'a dyn DependencyLookup,
    pub sources: &'a dyn SourceLookup,
}

pub struct IncludeFileJob<'a> {
    symbol: String,
    source: Option<Source>,
    context: IncludeContext<'a>,
    symbols: &'a ScopedDb,
    symbol_names: &'a ScopedDb,
}

impl<'a> IncludeFileJob<'a> {
    /// Resolve the requester's build record up front: its own, or the first
    /// one found among the files that depend on it.
    pub fn new(
        symbol: impl Into<String>,
        requester: FileId,
        build_index: usize,
        context: IncludeContext<'a>,
        symbols: &'a ScopedDb,
        symbol_names: &'a ScopedDb,
    ) -> Self {
        let source = context
            .sources
            .sources_for(requester, build_index)
            .cloned()
            .or_else(|| {
                context
                    .graph
                    .dependencies_of(requester)
                    .into_iter()
                    .find_map(|dep| context.sources.sources_for(dep, build_index).cloned())
            });
        if source.is_none() {
            tracing::debug!("No build record for file {} (build {})", requester, build_index);
        }
        Self {
            symbol: symbol.into(),
            source,
            context,
            symbols,
            symbol_names,
        }
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Run the query, handing each suggestion to `emit` in rank order.
    pub fn execute<F>(&self, mut emit: F) -> Result<ResolveOutcome>
    where
        F: FnMut(&str),
    {
        let Some(source) = &self.source else {
            return Ok(ResolveOutcome::NoBuildRecord);
        };

        let mut found = Vec::new();
        let mut prefix_only: Option<LocationSet> = None;
        let batches = find_symbols(self.symbol_names, &self.symbol, |match_type, _, locations| {
            match match_type {
                MatchType::StartsWith => {
                    if prefix_only.is_none() {
                        prefix_only = Some(locations);
                    }
                }
                MatchType::Exact => self.process(&locations, source, &mut found)?,
            }
            Ok(())
        })?;
        // A lone prefix match is unambiguous; several are not worth guessing.
        if batches == 1 {
            if let Some(locations) = prefix_only {
                self.process(&locations, source, &mut found)?;
            }
        }

        let ranked = rank(found);
        for line in &ranked {
            emit(line);
        }
        tracing::debug!("{} include suggestions for {}", ranked.len(), self.symbol);
        Ok(ResolveOutcome::Resolved {
            suggestions: ranked.len(),
        })
    }

    fn process(
        &self,
        locations: &LocationSet,
        source: &Source,
        out: &mut Vec<String>,
    ) -> Result<()> {
        for &location in locations {
            let Some(cursor) = find_symbol(self.symbols, location)? else {
                continue;
            };
            if !cursor.is_definition || !cursor.kind.suggests_include() {
                continue;
            }
            for header in self.headers_for_symbol(location) {
                out.extend(alternatives(&header, source));
            }
        }
        Ok(())
    }

    /// The header holding `location`, plus headers that do nothing but
    /// include another header and include this one.
    fn headers_for_symbol(&self, location: Location) -> Vec<PathBuf> {
        let files = self.context.files;
        let Some(path) = files.path(location.file) else {
            return Vec::new();
        };
        if !is_header(path) {
            return Vec::new();
        }

        let mut headers = vec![path.to_path_buf()];
        if let Some(node) = self.context.graph.dependency_node(location.file) {
            for dependent in node.dependents {
                let Some(dependent_path) = files.path(dependent) else {
                    continue;
                };
                let includes_one = self
                    .context
                    .graph
                    .dependency_node(dependent)
                    .is_some_and(|n| n.includes.len() == 1);
                if is_header(dependent_path) && includes_one {
                    headers.push(dependent_path.to_path_buf());
                }
            }
        }
        headers
    }
}

/// Every spelling of `header` reachable from `source`, redundant ones
/// removed, in discovery order.
pub fn alternatives(header: &Path, source: &Source) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(rel) = source
        .directory()
        .and_then(|dir| relative_include(header, dir))
    {
        out.push(format!("#include \"{rel}\""));
    }
    for include in &source.include_paths {
        if let Some(rel) = relative_include(header, &include.path) {
            out.push(format!("#include <{rel}>"));
        }
    }

    let file_name_len = header
        .file_name()
        .map(|name| name.to_string_lossy().len())
        .unwrap_or(0);
    drop_redundant(out, file_name_len)
}

/// `header` relative to `dir` with `/` separators, if `dir` contains it.
fn relative_include(header: &Path, dir: &Path) -> Option<String> {
    let rel = header.strip_prefix(dir).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Drop `x` when a shorter `y` agrees with it on `y`'s directory part,
/// counted from the opening quote or bracket. Both spell the same file, so
/// `x` only adds directories in front of what `y` already reaches.
fn drop_redundant(alternatives: Vec<String>, file_name_len: usize) -> Vec<String> {
    let tail = file_name_len + 1;
    let redundant = |x: &String| {
        alternatives.iter().any(|y| {
            if y.len() >= x.len() {
                return false;
            }
            let n = y.len().saturating_sub(tail + DIRECTIVE_LEN);
            x.as_bytes()[DIRECTIVE_LEN..DIRECTIVE_LEN + n]
                == y.as_bytes()[DIRECTIVE_LEN..DIRECTIVE_LEN + n]
        })
    };
    alternatives
        .iter()
        .filter(|x| !redundant(*x))
        .cloned()
        .collect()
}

/// Remove exact repeats, keeping the first, then order by length. Ties keep
/// discovery order.
fn rank(found: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<String> = found
        .into_iter()
        .filter(|line| seen.insert(line.clone()))
        .collect();
    ranked.sort_by_key(String::len);
    ranked
}
