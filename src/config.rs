//! Runtime configuration.

use std::path::PathBuf;

/// Environment variable overriding where index data is stored.
pub const DATA_DIR_ENV: &str = "INC_INDEX_DATA_DIR";

/// Configuration for the stores and the service.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Where databases and project metadata live. `None` keeps everything in
    /// memory.
    pub data_dir: Option<PathBuf>,
    /// fsync every log append.
    pub sync_writes: bool,
    /// Rewrite a database log as a snapshot once it holds this many records.
    pub compact_after_records: usize,
    /// Build configuration used when a query does not name one.
    pub default_build_index: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_writes: false,
            compact_after_records: 1024,
            default_build_index: 0,
        }
    }
}

impl IndexConfig {
    /// In-memory configuration.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Persist under `data_dir`.
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Apply `INC_INDEX_DATA_DIR` if it is set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                self.data_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_compact_after(mut self, records: usize) -> Self {
        self.compact_after_records = records.max(1);
        self
    }
}
