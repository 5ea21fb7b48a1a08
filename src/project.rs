//! A project: the owner of one file registry, one dependency graph and one
//! set of build records, next to the project's two databases.

use crate::cache;
use crate::error::Result;
use crate::files::FileRegistry;
use crate::graph::{DependencyGraph, GraphSnapshot};
use crate::sources::ProjectSources;
use crate::types::{FileId, ProjectId, Source};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Project {
    pub id: ProjectId,
    pub root: PathBuf,
    pub files: FileRegistry,
    pub graph: RwLock<DependencyGraph>,
    pub sources: RwLock<ProjectSources>,
}

pub type SharedProject = Arc<Project>;

impl Project {
    pub fn new(root: PathBuf) -> Self {
        Self {
            id: ProjectId::from_root(&root),
            root,
            files: FileRegistry::new(),
            graph: RwLock::new(DependencyGraph::new()),
            sources: RwLock::new(ProjectSources::new()),
        }
    }

    /// Register `path`, resolving relative paths against the project root.
    pub fn file_id(&self, path: &Path) -> FileId {
        self.files.get_or_insert(&self.absolute(path))
    }

    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn add_source(&self, file: FileId, build_index: usize, source: Source) {
        self.sources.write().insert(file, build_index, source);
    }

    pub fn stats(&self) -> ProjectStats {
        let graph = self.graph.read();
        ProjectStats {
            file_count: self.files.len(),
            include_edges: graph.edge_count(),
            build_records: self.sources.read().len(),
        }
    }

    fn to_snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            root: self.root.clone(),
            files: self.files.paths(),
            graph: self.graph.read().to_snapshot(),
            sources: self.sources.read().clone(),
        }
    }

    fn from_snapshot(snapshot: ProjectSnapshot) -> Self {
        Self {
            id: ProjectId::from_root(&snapshot.root),
            files: FileRegistry::from_paths(&snapshot.files),
            graph: RwLock::new(DependencyGraph::from_snapshot(&snapshot.graph)),
            sources: RwLock::new(snapshot.sources),
            root: snapshot.root,
        }
    }

    /// Persist the project metadata under `data_root`.
    pub fn save(&self, data_root: &Path) -> Result<()> {
        let path = cache::project_path(data_root, self.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = bincode::serialize(&self.to_snapshot())?;
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!("Saved project {} to {}", self.id, path.display());
        Ok(())
    }

    /// Load the project rooted at `root`, if it was saved before.
    pub fn load(data_root: &Path, root: &Path) -> Result<Option<Self>> {
        let path = cache::project_path(data_root, ProjectId::from_root(root));
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: ProjectSnapshot = bincode::deserialize(&data)?;
        Ok(Some(Self::from_snapshot(snapshot)))
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("files", &self.files.len())
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProjectSnapshot {
    root: PathBuf,
    files: Vec<PathBuf>,
    graph: GraphSnapshot,
    sources: ProjectSources,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStats {
    pub file_count: usize,
    pub include_edges: usize,
    pub build_records: usize,
}
