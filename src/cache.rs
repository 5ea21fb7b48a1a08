use crate::store::DatabaseKind;
use crate::types::ProjectId;
use std::path::{Path, PathBuf};

pub const DATA_DIR: &str = ".inc-index";
pub const PROJECT_FILE: &str = "project.bin";
pub const LOG_EXTENSION: &str = "log";

/// Default data root for a workspace.
pub fn data_dir(workspace: &Path) -> PathBuf {
    workspace.join(DATA_DIR)
}

pub fn project_dir(data_root: &Path, project: ProjectId) -> PathBuf {
    data_root.join(project.to_string())
}

pub fn database_path(data_root: &Path, project: ProjectId, kind: DatabaseKind) -> PathBuf {
    project_dir(data_root, project)
        .join(kind.as_str())
        .with_extension(LOG_EXTENSION)
}

pub fn project_path(data_root: &Path, project: ProjectId) -> PathBuf {
    project_dir(data_root, project).join(PROJECT_FILE)
}
