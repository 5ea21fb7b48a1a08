//! Fixed-width location keys.
//!
//! A [`Location`] is encoded as 8 big-endian bytes: the file id followed by
//! the position. Byte-wise comparison of two keys therefore orders them by
//! `(file, position)`, which is what the symbol store relies on for its scan
//! order. Location sets are stored as the concatenation of their sorted keys.

use crate::error::{IndexError, Result};
use crate::store::DatabaseKind;
use crate::types::FileId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Width of an encoded [`Location`].
pub const KEY_LEN: usize = 8;

/// Ordered `(file, position)` pair identifying a point in source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Location {
    pub file: FileId,
    pub position: u32,
}

pub type LocationSet = BTreeSet<Location>;

impl Location {
    pub const fn new(file: FileId, position: u32) -> Self {
        Self { file, position }
    }

    pub fn to_key(&self) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        key[..4].copy_from_slice(&self.file.0.to_be_bytes());
        key[4..].copy_from_slice(&self.position.to_be_bytes());
        key
    }

    /// Decode a symbol store key. Anything but exactly [`KEY_LEN`] bytes is
    /// treated as corruption of the symbol database.
    pub fn from_key(key: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            IndexError::corruption(
                DatabaseKind::Symbol,
                format!("location key is {} bytes, expected {KEY_LEN}", key.len()),
            )
        })?;
        Ok(Self::from_bytes(bytes))
    }

    fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let [f0, f1, f2, f3, p0, p1, p2, p3] = bytes;
        Self {
            file: FileId(u32::from_be_bytes([f0, f1, f2, f3])),
            position: u32::from_be_bytes([p0, p1, p2, p3]),
        }
    }

    pub fn is_dirty(&self, dirty: &HashSet<FileId>) -> bool {
        dirty.contains(&self.file)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.0, self.position)
    }
}

pub fn encode_location_set(locations: &LocationSet) -> Vec<u8> {
    let mut out = Vec::with_capacity(locations.len() * KEY_LEN);
    for location in locations {
        out.extend_from_slice(&location.to_key());
    }
    out
}

/// Decode a symbol-name store value.
pub fn decode_location_set(bytes: &[u8]) -> Result<LocationSet> {
    if bytes.len() % KEY_LEN != 0 {
        return Err(IndexError::corruption(
            DatabaseKind::SymbolName,
            format!("location set of {} bytes is not a multiple of {KEY_LEN}", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(KEY_LEN)
        .map(|chunk| {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(chunk);
            Location::from_bytes(key)
        })
        .collect())
}
