//! Append-only log backing a persistent database.
//!
//! Layout: an 8-byte magic header followed by framed records. Each frame is
//! `len: u32 LE | blake3(len)[..8] | blake3(payload): 32 bytes | payload`,
//! where the payload is a bincode-encoded `Vec<Op>`. One frame is one commit.
//!
//! On open the log is replayed in order. A frame whose header checks out but
//! whose payload runs past the end of the file is a torn write from a crash:
//! it is dropped and the file truncated back to the last complete frame. A
//! header or payload whose hash does not match is corruption.

use super::{DatabaseKind, Op};
use crate::error::{IndexError, Result};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"INCIDX01";
const LEN_CHECK_LEN: usize = 8;
const HASH_LEN: usize = 32;
const FRAME_HEADER_LEN: usize = 4 + LEN_CHECK_LEN + HASH_LEN;

pub(crate) struct StoreLog {
    path: PathBuf,
    kind: DatabaseKind,
    file: File,
    records: usize,
    sync: bool,
}

impl StoreLog {
    /// Open (or create) the log at `path` and replay it.
    pub(crate) fn open(
        path: PathBuf,
        kind: DatabaseKind,
        sync: bool,
    ) -> Result<(Self, BTreeMap<Vec<u8>, Vec<u8>>)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut entries = BTreeMap::new();
        let mut records = 0;

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        if data.is_empty() {
            write_fresh(&path, &[])?;
        } else {
            if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
                return Err(IndexError::corruption(
                    kind,
                    format!("{} is not an index log", path.display()),
                ));
            }

            let mut offset = MAGIC.len();
            while offset < data.len() {
                match read_frame(&data[offset..], kind)? {
                    Some((ops, consumed)) => {
                        apply_ops(&mut entries, ops);
                        offset += consumed;
                        records += 1;
                    }
                    None => {
                        tracing::warn!(
                            "Dropping torn record at byte {} of {}",
                            offset,
                            path.display()
                        );
                        let file = OpenOptions::new().write(true).open(&path)?;
                        file.set_len(offset as u64)?;
                        file.sync_all()?;
                        break;
                    }
                }
            }
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok((
            Self {
                path,
                kind,
                file,
                records,
                sync,
            },
            entries,
        ))
    }

    pub(crate) fn records(&self) -> usize {
        self.records
    }

    /// Append one commit as a single frame.
    pub(crate) fn append(&mut self, ops: &[Op]) -> Result<()> {
        let frame = encode_frame(ops)?;
        self.file.write_all(&frame)?;
        if self.sync {
            self.file.sync_data()?;
        }
        self.records += 1;
        Ok(())
    }

    /// Replace the log with one snapshot frame holding `entries`.
    pub(crate) fn compact(&mut self, entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<()> {
        let snapshot: Vec<Op> = entries
            .iter()
            .map(|(key, value)| Op::Put(key.clone(), value.clone()))
            .collect();
        write_fresh(&self.path, &snapshot)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.records = usize::from(!snapshot.is_empty());
        tracing::debug!(
            "Compacted {} log to {} entries",
            self.kind,
            snapshot.len()
        );
        Ok(())
    }
}

/// Atomically replace `path` with a log holding `ops` as its only frame.
fn write_fresh(path: &Path, ops: &[Op]) -> Result<()> {
    let tmp = path.with_extension("log.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(MAGIC)?;
        if !ops.is_empty() {
            file.write_all(&encode_frame(ops)?)?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn encode_frame(ops: &[Op]) -> Result<Vec<u8>> {
    let payload = bincode::serialize(ops)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "log record exceeds 4 GiB",
        )
    })?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&len_check(len.to_le_bytes()));
    frame.extend_from_slice(blake3::hash(&payload).as_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn len_check(len: [u8; 4]) -> [u8; LEN_CHECK_LEN] {
    let mut check = [0u8; LEN_CHECK_LEN];
    check.copy_from_slice(&blake3::hash(&len).as_bytes()[..LEN_CHECK_LEN]);
    check
}

/// Decode the frame at the start of `data`. `None` means the frame is
/// incomplete.
fn read_frame(data: &[u8], kind: DatabaseKind) -> Result<Option<(Vec<Op>, usize)>> {
    if data.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let (len_bytes, rest) = data.split_at(4);
    let (check, rest) = rest.split_at(LEN_CHECK_LEN);
    let (hash, rest) = rest.split_at(HASH_LEN);
    let mut len = [0u8; 4];
    len.copy_from_slice(len_bytes);
    if len_check(len).as_slice() != check {
        return Err(IndexError::corruption(kind, "log record length checksum mismatch"));
    }
    let len = u32::from_le_bytes(len) as usize;
    if rest.len() < len {
        return Ok(None);
    }

    let payload = &rest[..len];
    if blake3::hash(payload).as_bytes().as_slice() != hash {
        return Err(IndexError::corruption(kind, "log record checksum mismatch"));
    }
    let ops: Vec<Op> = bincode::deserialize(payload)
        .map_err(|e| IndexError::corruption(kind, format!("undecodable log record: {e}")))?;
    Ok(Some((ops, FRAME_HEADER_LEN + len)))
}

pub(super) fn apply_ops(entries: &mut BTreeMap<Vec<u8>, Vec<u8>>, ops: Vec<Op>) {
    for op in ops {
        match op {
            Op::Put(key, value) => {
                entries.insert(key, value);
            }
            Op::Delete(key) => {
                entries.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(key: &str, value: &str) -> Op {
        Op::Put(key.as_bytes().to_vec(), value.as_bytes().to_vec())
    }

    #[test]
    fn test_replay_after_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("symbol.log");

        let (mut log, entries) = StoreLog::open(path.clone(), DatabaseKind::Symbol, false).unwrap();
        assert!(entries.is_empty());
        log.append(&[put("a", "1"), put("b", "2")]).unwrap();
        log.append(&[Op::Delete(b"a".to_vec())]).unwrap();
        drop(log);

        let (log, entries) = StoreLog::open(path, DatabaseKind::Symbol, false).unwrap();
        assert_eq!(log.records(), 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(b"b".as_slice()), Some(&b"2".to_vec()));
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("symbol.log");

        let (mut log, _) = StoreLog::open(path.clone(), DatabaseKind::Symbol, false).unwrap();
        log.append(&[put("a", "1")]).unwrap();
        log.append(&[put("b", "2"), put("c", "3")]).unwrap();
        drop(log);

        // Cut the second commit in half.
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();
        drop(file);

        let (_, entries) = StoreLog::open(path.clone(), DatabaseKind::Symbol, false).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(b"a".as_slice()));

        // The torn bytes were removed so new appends land after the good frame.
        let (mut log, _) = StoreLog::open(path.clone(), DatabaseKind::Symbol, false).unwrap();
        log.append(&[put("d", "4")]).unwrap();
        drop(log);
        let (_, entries) = StoreLog::open(path, DatabaseKind::Symbol, false).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("symbol-name.log");

        let (mut log, _) =
            StoreLog::open(path.clone(), DatabaseKind::SymbolName, false).unwrap();
        log.append(&[put("name", "value")]).unwrap();
        drop(log);

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let err = StoreLog::open(path, DatabaseKind::SymbolName, false)
            .err()
            .unwrap();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_damaged_length_mid_log_is_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("symbol.log");

        let (mut log, _) = StoreLog::open(path.clone(), DatabaseKind::Symbol, false).unwrap();
        log.append(&[put("a", "1")]).unwrap();
        log.append(&[put("b", "2")]).unwrap();
        log.append(&[put("c", "3")]).unwrap();
        drop(log);

        let first_frame = encode_frame(&[put("a", "1")]).unwrap().len();
        let mut bytes = fs::read(&path).unwrap();
        let original_len = bytes.len();
        // High byte of the second frame's length.
        bytes[MAGIC.len() + first_frame + 3] = 0x7f;
        fs::write(&path, &bytes).unwrap();

        let err = StoreLog::open(path.clone(), DatabaseKind::Symbol, false)
            .err()
            .unwrap();
        assert!(err.is_corruption());
        assert_eq!(fs::metadata(&path).unwrap().len(), original_len as u64);
    }

    #[test]
    fn test_foreign_file_is_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("symbol.log");
        fs::write(&path, b"not a log at all").unwrap();
        assert!(StoreLog::open(path, DatabaseKind::Symbol, false).is_err());
    }

    #[test]
    fn test_compact_keeps_state() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("symbol.log");

        let (mut log, _) = StoreLog::open(path.clone(), DatabaseKind::Symbol, false).unwrap();
        let mut entries = BTreeMap::new();
        for i in 0..10u8 {
            let op = put(&format!("k{i}"), "v");
            log.append(std::slice::from_ref(&op)).unwrap();
            apply_ops(&mut entries, vec![op]);
        }
        log.compact(&entries).unwrap();
        assert_eq!(log.records(), 1);
        log.append(&[Op::Delete(b"k0".to_vec())]).unwrap();
        drop(log);

        let (log, replayed) = StoreLog::open(path, DatabaseKind::Symbol, false).unwrap();
        assert_eq!(log.records(), 2);
        assert_eq!(replayed.len(), 9);
    }
}
