//! Core types shared by the stores, the dirty engine and the include resolver.

use crate::location::{Location, LocationSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Identifier of a file within one project. `0` is never assigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct FileId(pub u32);

impl FileId {
    pub const NULL: FileId = FileId(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a project, derived from its root path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub u64);

impl ProjectId {
    /// Derive the id from a root path. Uses the first 8 bytes of a blake3
    /// hash so the id is the same across processes.
    pub fn from_root(root: &std::path::Path) -> Self {
        let hash = blake3::hash(root.to_string_lossy().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        Self(u64::from_le_bytes(bytes))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ============================================================================
// Cursor Information
// ============================================================================

/// Kind of symbol occurrence recorded at a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    FunctionDecl,
    FunctionTemplate,
    ClassDecl,
    StructDecl,
    ClassTemplate,
    Method,
    Constructor,
    Destructor,
    Field,
    Variable,
    Parameter,
    Typedef,
    EnumDecl,
    EnumConstant,
    Namespace,
    Macro,
    Reference,
    Other,
}

impl CursorKind {
    /// Whether a definition of this kind can be brought into scope by
    /// including the header that holds it.
    pub fn suggests_include(&self) -> bool {
        match self {
            Self::FunctionDecl
            | Self::FunctionTemplate
            | Self::ClassDecl
            | Self::StructDecl
            | Self::ClassTemplate => true,
            Self::Method
            | Self::Constructor
            | Self::Destructor
            | Self::Field
            | Self::Variable
            | Self::Parameter
            | Self::Typedef
            | Self::EnumDecl
            | Self::EnumConstant
            | Self::Namespace
            | Self::Macro
            | Self::Reference
            | Self::Other => false,
        }
    }
}

/// Metadata stored for one location in the symbol store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorInfo {
    pub kind: CursorKind,
    pub is_definition: bool,
    pub symbol_name: String,
    pub symbol_length: u16,
    /// Where this occurrence points to (declaration or definition).
    pub targets: LocationSet,
    /// Occurrences that point back at this one.
    pub references: LocationSet,
}

impl CursorInfo {
    pub fn new(kind: CursorKind, symbol_name: impl Into<String>) -> Self {
        let symbol_name = symbol_name.into();
        Self {
            kind,
            is_definition: false,
            symbol_length: symbol_name.len().min(u16::MAX as usize) as u16,
            symbol_name,
            targets: LocationSet::new(),
            references: LocationSet::new(),
        }
    }

    pub fn definition(mut self) -> Self {
        self.is_definition = true;
        self
    }

    pub fn with_target(mut self, target: Location) -> Self {
        self.targets.insert(target);
        self
    }

    pub fn with_reference(mut self, reference: Location) -> Self {
        self.references.insert(reference);
        self
    }

    /// True if this entry's content depends on any file in `dirty` through
    /// its targets or references. The entry's own file is checked by the
    /// caller, which already has it from the key.
    pub fn dirty(&self, dirty: &HashSet<FileId>) -> bool {
        self.targets
            .iter()
            .chain(self.references.iter())
            .any(|loc| loc.is_dirty(dirty))
    }

    pub fn encode(&self) -> crate::error::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> crate::error::Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// ============================================================================
// Compilation Unit Metadata
// ============================================================================

/// Whether an include search directory serves `<...>` or `"..."` includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeKind {
    /// `-I` / `-isystem`
    Angle,
    /// `-iquote`
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludePath {
    pub path: PathBuf,
    pub kind: IncludeKind,
}

impl IncludePath {
    pub fn angle(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: IncludeKind::Angle,
        }
    }

    pub fn quote(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: IncludeKind::Quote,
        }
    }
}

/// Build record of one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub source_file: PathBuf,
    #[serde(default)]
    pub include_paths: Vec<IncludePath>,
}

impl Source {
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            include_paths: Vec::new(),
        }
    }

    pub fn with_include(mut self, include: IncludePath) -> Self {
        self.include_paths.push(include);
        self
    }

    /// Directory of the compilation unit's source file.
    pub fn directory(&self) -> Option<&std::path::Path> {
        self.source_file.parent()
    }
}
