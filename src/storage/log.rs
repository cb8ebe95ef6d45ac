//! Log-backed store
//!
//! Every mutation is appended to a checksummed log before it becomes
//! visible; the full key space is kept in an ordered in-memory index and
//! rebuilt from the log on open.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{NetKvError, Result};

use super::Store;

/// Log file name inside the store directory
pub const LOG_FILENAME: &str = "data.log";

/// Record header: lsn (8) + crc (4) + len (4)
pub const RECORD_HEADER_SIZE: usize = 16;

/// Largest record accepted by append and replay (64 MiB)
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogOp {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// How often the log is fsynced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced records (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for SyncStrategy {
    fn default() -> Self {
        SyncStrategy::EveryNEntries { count: 100 }
    }
}

/// Append side of the log
struct LogWriter {
    file: File,
    /// End of the last complete record
    len: u64,
    next_lsn: u64,
    unsynced: usize,
    sync_strategy: SyncStrategy,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl LogWriter {
    /// Append one record
    ///
    /// Records above `MAX_RECORD_SIZE` are rejected before anything is
    /// written. A failed write or sync is cut back to the previous record
    /// boundary; if that fails too the writer refuses further appends.
    fn append(&mut self, op: &LogOp) -> Result<u64> {
        if self.poisoned {
            return Err(NetKvError::Storage(
                "log is damaged after a failed write; reopen the store".to_string(),
            ));
        }

        let data =
            bincode::serialize(op).map_err(|e| NetKvError::Storage(format!("encode record: {}", e)))?;
        let len = u32::try_from(data.len())
            .ok()
            .filter(|_| data.len() <= MAX_RECORD_SIZE)
            .ok_or_else(|| {
                NetKvError::Storage(format!(
                    "record of {} bytes exceeds the {} byte limit",
                    data.len(),
                    MAX_RECORD_SIZE
                ))
            })?;
        let lsn = self.next_lsn;

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + data.len());
        record.extend_from_slice(&lsn.to_le_bytes());
        record.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&data);

        if let Err(e) = self.write_record(&record) {
            if let Err(rollback) = self.file.set_len(self.len) {
                tracing::error!(
                    "Cannot roll back failed log append ({}); refusing further writes",
                    rollback
                );
                self.poisoned = true;
            }
            return Err(e);
        }

        self.len += record.len() as u64;
        self.next_lsn += 1;
        Ok(lsn)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.file.write_all(record)?;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }
}

/// Outcome of replaying the log on open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records applied to the index
    pub records: u64,

    /// Last applied LSN (0 when empty)
    pub last_lsn: u64,

    /// Bytes dropped from a torn or corrupt tail
    pub truncated_bytes: u64,
}

/// Durable store backed by an append-only log
///
/// ## Concurrency:
/// - `index`: RwLock (many concurrent readers, exclusive writer)
/// - `log`: Mutex, serializes writers; held while the index is updated so
///   index order always matches log order. Readers never take it.
/// - `closed`: checked by every operation without locking
pub struct LogStore {
    dir: PathBuf,
    index: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    log: Mutex<Option<LogWriter>>,
    closed: AtomicBool,
    replay: ReplayStats,
}

impl LogStore {
    /// Open or create a store in `dir`
    ///
    /// On startup:
    /// 1. Create the directory if needed
    /// 2. Replay valid records into the index
    /// 3. Truncate a torn or corrupt tail
    /// 4. Reopen the log for appends
    pub fn open(dir: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILENAME);

        let mut index = BTreeMap::new();
        let (replay, valid_len) = if path.exists() {
            Self::replay(&path, &mut index)?
        } else {
            (
                ReplayStats {
                    records: 0,
                    last_lsn: 0,
                    truncated_bytes: 0,
                },
                0,
            )
        };

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        if replay.truncated_bytes > 0 {
            tracing::warn!(
                "Truncating {} bytes of damaged log tail in {}",
                replay.truncated_bytes,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        if replay.records > 0 {
            tracing::info!(
                "Log replay: {} records, last_lsn={}",
                replay.records,
                replay.last_lsn
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            index: RwLock::new(index),
            log: Mutex::new(Some(LogWriter {
                file,
                len: valid_len,
                next_lsn: replay.last_lsn + 1,
                unsynced: 0,
                sync_strategy,
                poisoned: false,
            })),
            closed: AtomicBool::new(false),
            replay,
        })
    }

    /// Replay records into `index`, returning stats and the valid length
    fn replay(path: &Path, index: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(ReplayStats, u64)> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut stats = ReplayStats {
            records: 0,
            last_lsn: 0,
            truncated_bytes: 0,
        };
        let mut offset = 0u64;

        loop {
            let mut header = [0u8; RECORD_HEADER_SIZE];
            match read_full(&mut reader, &mut header)? {
                0 => break,
                n if n < RECORD_HEADER_SIZE => break,
                _ => {}
            }

            let lsn = u64::from_le_bytes([
                header[0], header[1], header[2], header[3], header[4], header[5], header[6],
                header[7],
            ]);
            let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
            let len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;
            if len > MAX_RECORD_SIZE {
                break;
            }

            let mut data = vec![0u8; len];
            if read_full(&mut reader, &mut data)? < len {
                break;
            }
            if crc32fast::hash(&data) != crc {
                break;
            }
            let op: LogOp = match bincode::deserialize(&data) {
                Ok(op) => op,
                Err(_) => break,
            };

            match op {
                LogOp::Put { key, value } => {
                    index.insert(key, value);
                }
                LogOp::Delete { key } => {
                    index.remove(&key);
                }
            }

            stats.records += 1;
            stats.last_lsn = lsn;
            offset += (RECORD_HEADER_SIZE + len) as u64;
        }

        stats.truncated_bytes = file_len - offset;
        Ok((stats, offset))
    }

    /// Append `op` and apply it to the index
    fn apply(&self, op: LogOp) -> Result<()> {
        let mut log = self.log.lock();
        let writer = log
            .as_mut()
            .ok_or_else(|| NetKvError::Storage("store is closed".to_string()))?;
        writer.append(&op)?;

        let mut index = self.index.write();
        match op {
            LogOp::Put { key, value } => {
                index.insert(key, value);
            }
            LogOp::Delete { key } => {
                index.remove(&key);
            }
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetKvError::Storage("store is closed".to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replay outcome from the last open
    pub fn replay_stats(&self) -> ReplayStats {
        self.replay
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

impl Store for LogStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_open()?;
        self.index
            .read()
            .get(key)
            .cloned()
            .ok_or(NetKvError::KeyNotFound)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.apply(LogOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        if !self.index.read().contains_key(key) {
            return self.check_open();
        }
        self.apply(LogOp::Delete { key: key.to_vec() })
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if let Some(mut writer) = self.log.lock().take() {
            writer.sync()?;
        }
        Ok(())
    }
}

/// Read until `buf` is full or EOF, returning the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
