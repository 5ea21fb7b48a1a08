//! Error types for the index core.
//!
//! Corruption and store failures are fatal to the job that hits them. A missing
//! build record is not an error, see [`crate::include::ResolveOutcome`].

use crate::store::{DatabaseKind, LockMode};
use crate::types::ProjectId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Persisted bytes do not match the expected layout.
    #[error("corrupt {kind} database: {detail}")]
    Corruption { kind: DatabaseKind, detail: String },

    /// The underlying store could not be read or written.
    #[error("store unavailable: {0}")]
    Store(#[from] std::io::Error),

    #[error("failed to decode stored value: {0}")]
    Decode(#[from] bincode::Error),

    #[error("{kind} database is held with a read lock")]
    ReadOnly { kind: DatabaseKind },

    #[error("expected {expected:?} lock on {kind} database, found {found:?}")]
    LockMode {
        kind: DatabaseKind,
        expected: LockMode,
        found: LockMode,
    },

    #[error("expected {expected} database handle, got {found}")]
    WrongDatabase {
        expected: DatabaseKind,
        found: DatabaseKind,
    },

    #[error("database handles belong to different projects ({0} and {1})")]
    ProjectMismatch(ProjectId, ProjectId),

    #[error("file is not registered in the project: {}", .0.display())]
    UnknownFile(PathBuf),
}

impl IndexError {
    pub fn corruption(kind: DatabaseKind, detail: impl Into<String>) -> Self {
        Self::Corruption {
            kind,
            detail: detail.into(),
        }
    }

    /// Whether the error means persisted data can no longer be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::Decode(_))
    }
}
