//! Build records of compilation units.

use crate::types::{FileId, Source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Read access to per-file build records.
pub trait SourceLookup {
    /// Build record of `file` for one build configuration.
    fn sources_for(&self, file: FileId, build_index: usize) -> Option<&Source>;
}

/// Build records keyed by file, one per build configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSources {
    sources: HashMap<FileId, BTreeMap<usize, Source>>,
}

impl ProjectSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: FileId, build_index: usize, source: Source) {
        self.sources
            .entry(file)
            .or_default()
            .insert(build_index, source);
    }

    /// Every build record of `file`, ordered by build index.
    pub fn all_for(&self, file: FileId) -> impl Iterator<Item = (usize, &Source)> {
        self.sources
            .get(&file)
            .into_iter()
            .flat_map(|builds| builds.iter().map(|(index, source)| (*index, source)))
    }

    pub fn len(&self) -> usize {
        self.sources.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SourceLookup for ProjectSources {
    fn sources_for(&self, file: FileId, build_index: usize) -> Option<&Source> {
        self.sources.get(&file)?.get(&build_index)
    }
}
