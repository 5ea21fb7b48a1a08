//! File path interning.
//!
//! Every file the index knows about gets a [`FileId`]. Ids are handed out in
//! insertion order, so re-interning the persisted path list in the same order
//! reproduces the same ids.

use crate::types::FileId;
use lasso::{Key, Spur, ThreadedRodeo};
use std::path::{Path, PathBuf};

/// Extensions treated as headers.
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "h++", "tcc", "txx", "inl", "ipp"];

pub fn is_header(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            HEADER_EXTENSIONS
                .iter()
                .any(|h| h.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Thread-safe path <-> id table.
#[derive(Default)]
pub struct FileRegistry {
    paths: ThreadedRodeo,
}

impl std::fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRegistry")
            .field("files", &self.paths.len())
            .finish()
    }
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from paths in id order.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let registry = Self::new();
        for path in paths {
            registry.get_or_insert(path.as_ref());
        }
        registry
    }

    pub fn get_or_insert(&self, path: &Path) -> FileId {
        to_file_id(self.paths.get_or_intern(path.to_string_lossy()))
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.paths.get(path.to_string_lossy()).map(to_file_id)
    }

    pub fn path(&self, file: FileId) -> Option<&Path> {
        let spur = to_spur(file)?;
        self.paths.try_resolve(&spur).map(Path::new)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// All paths in id order.
    pub fn paths(&self) -> Vec<PathBuf> {
        (1..=self.len() as u32)
            .filter_map(|id| self.path(FileId(id)).map(Path::to_path_buf))
            .collect()
    }
}

fn to_file_id(spur: Spur) -> FileId {
    FileId(spur.into_usize() as u32 + 1)
}

fn to_spur(file: FileId) -> Option<Spur> {
    if file.is_null() {
        return None;
    }
    Spur::try_from_usize(file.0 as usize - 1)
}
