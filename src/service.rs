//! The service façade.
//!
//! [`IndexService`] is an explicit value owning the store registry and the
//! loaded projects. Every job runs on a blocking worker thread and acquires
//! the project's databases in a fixed order, symbol before symbol-name, so
//! concurrent jobs never deadlock on each other.

use crate::config::IndexConfig;
use crate::dirty::{DirtyJob, DirtyReport};
use crate::include::{IncludeContext, IncludeFileJob, ResolveOutcome};
use crate::ingest::{IndexSnapshot, Indexer, IngestReport};
use crate::project::{Project, ProjectStats, SharedProject};
use crate::store::{DatabaseKind, LockMode, ScopedDb, StoreRegistry};
use crate::types::FileId;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One include query.
#[derive(Debug, Clone)]
pub struct IncludeQuery {
    pub symbol: String,
    /// File the include would be added to.
    pub file: PathBuf,
    pub build_index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncludeResponse {
    #[serde(flatten)]
    pub outcome: ResolveOutcome,
    pub includes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub dirtied: DirtyReport,
    pub ingested: IngestReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub project: String,
    pub root: PathBuf,
    #[serde(flatten)]
    pub metadata: ProjectStats,
    pub symbols: usize,
    pub symbol_names: usize,
}

pub struct IndexService {
    config: IndexConfig,
    registry: Arc<StoreRegistry>,
    projects: DashMap<PathBuf, SharedProject>,
}

impl IndexService {
    pub fn open(config: IndexConfig) -> Self {
        let registry = match &config.data_dir {
            Some(dir) => StoreRegistry::persistent(dir.clone(), config.clone()),
            None => StoreRegistry::in_memory(),
        };
        Self {
            config,
            registry: Arc::new(registry),
            projects: DashMap::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// The project rooted at `root`, loading saved metadata on first use.
    pub fn project(&self, root: &Path) -> Result<SharedProject> {
        if let Some(project) = self.projects.get(root) {
            return Ok(project.clone());
        }
        let project = match self.registry.data_root() {
            Some(data_root) => Project::load(data_root, root)
                .with_context(|| format!("Failed to load project {}", root.display()))?,
            None => None,
        };
        let project = match project {
            Some(project) => {
                tracing::debug!("Loaded project {} ({} files)", project.id, project.files.len());
                project
            }
            None => Project::new(root.to_path_buf()),
        };
        let project = self
            .projects
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(project))
            .clone();
        Ok(project)
    }

    /// Persist project metadata. A no-op for in-memory services.
    pub fn save_project(&self, project: &Project) -> Result<()> {
        if let Some(data_root) = self.registry.data_root() {
            project
                .save(data_root)
                .with_context(|| format!("Failed to save project {}", project.root.display()))?;
        }
        Ok(())
    }

    /// Drop a project and its open database handles.
    pub fn close_project(&self, root: &Path) {
        if let Some((_, project)) = self.projects.remove(root) {
            self.registry.close(project.id);
        }
    }

    /// Invalidate everything derived from `paths`. Paths the project has
    /// never seen have nothing to invalidate and are skipped.
    pub async fn dirty(&self, root: &Path, paths: Vec<PathBuf>) -> Result<DirtyReport> {
        let project = self.project(root)?;
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || -> Result<DirtyReport> {
            let dirty = known_files(&project, &paths);
            let (mut symbols, mut names) = acquire_pair(&registry, &project, LockMode::Write)?;
            let report = DirtyJob::new(dirty, &mut symbols, &mut names)?.run()?;
            Ok(report)
        })
        .await
        .context("Dirty task panicked")?
    }

    /// Replace the index data of every file in `snapshot`. Files indexed
    /// before are dirtied first, under the same locks.
    pub async fn ingest(&self, root: &Path, snapshot: IndexSnapshot) -> Result<IngestResponse> {
        let project = self.project(root)?;
        let registry = self.registry.clone();
        let worker_project = project.clone();
        let response = tokio::task::spawn_blocking(move || -> Result<IngestResponse> {
            let project = worker_project;
            let paths: Vec<PathBuf> = snapshot.file_paths().map(Path::to_path_buf).collect();
            let stale = known_files(&project, &paths);
            let (mut symbols, mut names) = acquire_pair(&registry, &project, LockMode::Write)?;
            let dirtied = DirtyJob::new(stale, &mut symbols, &mut names)?.run()?;
            let ingested = Indexer::new(&project)
                .ingest_snapshot(&mut symbols, &mut names, &snapshot)
                .context("Failed to ingest snapshot")?;
            Ok(IngestResponse { dirtied, ingested })
        })
        .await
        .context("Ingest task panicked")??;
        self.save_project(&project)?;
        Ok(response)
    }

    /// Suggest `#include` lines for `query.symbol` in `query.file`.
    pub async fn include_file(&self, root: &Path, query: IncludeQuery) -> Result<IncludeResponse> {
        let project = self.project(root)?;
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || -> Result<IncludeResponse> {
            let mut includes = Vec::new();
            let outcome = include_file_blocking(&registry, &project, &query, |line| {
                includes.push(line.to_string())
            })?;
            Ok(IncludeResponse { outcome, includes })
        })
        .await
        .context("Include task panicked")?
    }

    pub async fn stats(&self, root: &Path) -> Result<ServiceStats> {
        let project = self.project(root)?;
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || -> Result<ServiceStats> {
            let (symbols, names) = acquire_pair(&registry, &project, LockMode::Read)?;
            Ok(ServiceStats {
                project: project.id.to_string(),
                root: project.root.clone(),
                metadata: project.stats(),
                symbols: symbols.len(),
                symbol_names: names.len(),
            })
        })
        .await
        .context("Stats task panicked")?
    }

    /// Rewrite the project's database logs as snapshots.
    pub async fn compact(&self, root: &Path) -> Result<()> {
        let project = self.project(root)?;
        let registry = self.registry.clone();
        let id = project.id;
        tokio::task::spawn_blocking(move || registry.compact(id))
            .await
            .context("Compact task panicked")?
            .with_context(|| format!("Failed to compact {}", root.display()))?;
        self.save_project(&project)
    }
}

/// Run an include query on the current thread, handing lines to `emit`.
pub fn include_file_blocking<F>(
    registry: &StoreRegistry,
    project: &Project,
    query: &IncludeQuery,
    emit: F,
) -> Result<ResolveOutcome>
where
    F: FnMut(&str),
{
    let (symbols, names) = acquire_pair(registry, project, LockMode::Read)?;
    // An unknown requester has no build record and nothing depending on it.
    let requester = project
        .files
        .file_id(&project.absolute(&query.file))
        .unwrap_or(FileId::NULL);
    let graph = project.graph.read();
    let sources = project.sources.read();
    let context = IncludeContext {
        files: &project.files,
        graph: &*graph,
        sources: &*sources,
    };
    let job = IncludeFileJob::new(
        query.symbol.clone(),
        requester,
        query.build_index,
        context,
        &symbols,
        &names,
    );
    job.execute(emit)
        .with_context(|| format!("Failed to resolve includes for {}", query.symbol))
}

fn acquire_pair(
    registry: &StoreRegistry,
    project: &Project,
    mode: LockMode,
) -> Result<(ScopedDb, ScopedDb)> {
    let symbols = registry
        .acquire(project.id, DatabaseKind::Symbol, mode)
        .context("Failed to open symbol database")?;
    let names = registry
        .acquire(project.id, DatabaseKind::SymbolName, mode)
        .context("Failed to open symbol-name database")?;
    Ok((symbols, names))
}

fn known_files(project: &Project, paths: &[PathBuf]) -> HashSet<FileId> {
    paths
        .iter()
        .filter_map(|path| {
            let file = project.files.file_id(&project.absolute(path));
            if file.is_none() {
                tracing::debug!("{} is not indexed, nothing to dirty", path.display());
            }
            file
        })
        .collect()
}
