//! File-backed checkpoint store.
//!
//! One file per consumer group inside a directory. Each save rewrites the
//! whole file through a temporary file and rename, so a crash leaves either
//! the old checkpoint or the new one.
//!
//! File format:
//! - 4 bytes magic (`CKP\0`)
//! - 1 byte version
//! - 8 bytes body length (little-endian)
//! - MessagePack-encoded [`Checkpoint`]
//! - 4 bytes CRC32 of the body

use crate::error::{Result, StreamError};
use crate::types::Checkpoint;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::store::CheckpointStore;

/// Magic bytes for checkpoint files.
const CHECKPOINT_MAGIC: &[u8; 4] = b"CKP\0";

/// Current checkpoint file format version.
const CHECKPOINT_VERSION: u8 = 1;

/// Sanity limit on a checkpoint body.
const MAX_BODY_LEN: u64 = 64 * 1024 * 1024;

/// Checkpoint store writing one file per group.
pub struct FileCheckpointStore {
    dir: PathBuf,
    /// Held for exclusive access to the directory.
    _lock_file: File,
    /// Serializes writes through the shared temporary file.
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a checkpoint directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join("LOCK"))?;
        lock_file.try_lock_exclusive().map_err(|_| StreamError::Locked)?;

        Ok(Self {
            dir,
            _lock_file: lock_file,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn group_path(&self, group: &str) -> PathBuf {
        self.dir.join(format!("{}.ckpt", file_stem(group)))
    }

    fn read_file(path: &Path) -> Result<Checkpoint> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != CHECKPOINT_MAGIC {
            return Err(StreamError::InvalidFormat("Invalid checkpoint magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != CHECKPOINT_VERSION {
            return Err(StreamError::InvalidFormat(format!(
                "Unsupported checkpoint version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);
        if len > MAX_BODY_LEN {
            return Err(StreamError::Corruption("Checkpoint body too large".into()));
        }

        let mut body = vec![0u8; len as usize];
        file.read_exact(&mut body)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        if u32::from_le_bytes(checksum_bytes) != crc32fast::hash(&body) {
            return Err(StreamError::Corruption("Checkpoint checksum mismatch".into()));
        }

        Ok(rmp_serde::from_slice(&body)?)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, group: &str) -> Result<Option<Checkpoint>> {
        let path = self.group_path(group);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    fn save(&self, group: &str, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.group_path(group);
        let tmp_path = path.with_extension("ckpt.tmp");

        let body = rmp_serde::to_vec(checkpoint)?;

        let _lock = self.write_lock.lock();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;

            file.write_all(CHECKPOINT_MAGIC)?;
            file.write_all(&[CHECKPOINT_VERSION])?;
            file.write_all(&(body.len() as u64).to_le_bytes())?;
            file.write_all(&body)?;
            file.write_all(&crc32fast::hash(&body).to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// File-system safe encoding of a group name.
fn file_stem(group: &str) -> String {
    let mut stem = String::with_capacity(group.len());
    for byte in group.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => stem.push(byte as char),
            _ => stem.push_str(&format!("%{:02X}", byte)),
        }
    }
    stem
}
