use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::memory::Entries;
use crate::traits::KeyValueStore;

/// One mutation recorded in the log.
///
/// On-disk format of each entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogOp)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum LogOp {
    Set { key: String, blob: Vec<u8> },
    Delete { key: String },
}

/// Flush/sync strategy for the log.
#[derive(Clone, Debug, Default)]
pub enum SyncMode {
    /// `fsync` after every write.
    EveryWrite,
    /// Flush to the OS after every write and let it decide when to sync.
    #[default]
    OsDefault,
}

/// Configuration for a [`FileStore`].
#[derive(Clone, Debug, Default)]
pub struct FileStoreConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct Inner {
    entries: Entries,
    writer: BufWriter<File>,
    /// Current length of the log file.
    offset: u64,
}

/// File-backed key-value store.
///
/// Mutations are appended to a single log file and the full map is kept in
/// memory. Opening the store replays the log front-to-back. The first entry
/// that is torn or fails its CRC check ends the valid log: it and everything
/// after it are truncated away before new entries are appended.
/// [`compact`](FileStore::compact) rewrites the log with only live keys.
pub struct FileStore {
    path: PathBuf,
    inner: RwLock<Inner>,
    config: FileStoreConfig,
}

impl FileStore {
    /// Open (or create) a store at `path` with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, FileStoreConfig::default())
    }

    /// Open (or create) a store at `path`.
    pub fn open_with(path: impl AsRef<Path>, config: FileStoreConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let file_len = file.metadata()?.len();
        let (entries, offset) = replay(path)?;
        if offset < file_len {
            warn!(
                path = %path.display(),
                valid = offset,
                dropped = file_len - offset,
                "truncating log after last valid entry"
            );
            file.set_len(offset)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), keys = entries.len(), offset, "file store opened");

        Ok(Self {
            path: path.to_path_buf(),
            inner: RwLock::new(Inner {
                entries,
                writer: BufWriter::new(file),
                offset,
            }),
            config,
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log file in bytes.
    pub fn log_size(&self) -> u64 {
        self.inner.read().expect("lock poisoned").offset
    }

    /// Rewrite the log so that it holds exactly one `Set` per live key, in
    /// insertion order.
    pub fn compact(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.writer.flush()?;

        let tmp_path = self.path.with_extension("compact");
        let mut offset = 0u64;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for (key, blob) in inner.entries.ordered() {
                let op = LogOp::Set {
                    key: key.clone(),
                    blob: blob.clone(),
                };
                offset += write_entry(&mut tmp, &op)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let before = inner.offset;
        inner.writer = BufWriter::new(file);
        inner.offset = offset;

        debug!(before, after = offset, "file store compacted");
        Ok(())
    }

    fn append(&self, inner: &mut Inner, op: &LogOp) -> StoreResult<()> {
        let written = write_entry(&mut inner.writer, op)?;
        inner.writer.flush()?;
        if matches!(self.config.sync_mode, SyncMode::EveryWrite) {
            inner.writer.get_ref().sync_all()?;
        }
        inner.offset += written;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.entries.get(key).cloned())
    }

    fn set(&self, key: &str, blob: Vec<u8>) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut inner = self.inner.write().expect("lock poisoned");
        let op = LogOp::Set {
            key: key.to_string(),
            blob,
        };
        self.append(&mut inner, &op)?;
        if let LogOp::Set { blob, .. } = op {
            debug!(key, len = blob.len(), "file store set");
            inner.entries.insert(key, blob);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if !inner.entries.contains(key) {
            return Ok(false);
        }
        self.append(
            &mut inner,
            &LogOp::Delete {
                key: key.to_string(),
            },
        )?;
        debug!(key, "file store delete");
        Ok(inner.entries.remove(key))
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.inner.read().expect("lock poisoned").entries.contains(key))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.entries.ordered().into_iter().map(|(k, _)| k.clone()).collect())
    }

    fn values(&self) -> StoreResult<Vec<Vec<u8>>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.entries.ordered().into_iter().map(|(_, v)| v.clone()).collect())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.inner.read().expect("lock poisoned").entries.len())
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

/// Frame and write one entry. Returns the number of bytes written.
fn write_entry<W: Write>(writer: &mut W, op: &LogOp) -> StoreResult<u64> {
    let payload = bincode::serialize(op).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = frame_length(payload.len())?;
    let crc = crc32fast::hash(&payload);

    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(HEADER_SIZE as u64 + payload.len() as u64)
}

/// Payload length as stored in the frame header.
fn frame_length(len: usize) -> StoreResult<u32> {
    u32::try_from(len).map_err(|_| {
        StoreError::Serialization(format!("log entry of {len} bytes exceeds the u32 frame limit"))
    })
}

/// Rebuild the in-memory map from the log at `path`.
///
/// Returns the map and the length of the valid log prefix. Replay stops at
/// the first torn or corrupt entry, since its length field cannot be trusted
/// to locate the next one.
fn replay(path: &Path) -> StoreResult<(Entries, u64)> {
    let mut data = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut data)?;

    let mut entries = Entries::default();
    let file_len = data.len();
    let mut offset = 0usize;
    let mut applied = 0usize;

    while offset + HEADER_SIZE <= file_len {
        let header = &data[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + HEADER_SIZE;
        if length == 0 || start + length > file_len {
            warn!(offset, length, file_len, "truncated log entry; stopping replay");
            break;
        }

        let payload = &data[start..start + length];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            let err = StoreError::CrcMismatch {
                offset: offset as u64,
                expected: expected_crc,
                actual: actual_crc,
            };
            warn!(error = %err, "corrupt log entry; stopping replay");
            break;
        }

        match bincode::deserialize::<LogOp>(payload) {
            Ok(LogOp::Set { key, blob }) => entries.insert(&key, blob),
            Ok(LogOp::Delete { key }) => {
                entries.remove(&key);
            }
            Err(e) => {
                warn!(offset, error = %e, "failed to deserialize log entry; stopping replay");
                break;
            }
        }
        applied += 1;
        offset = start + length;
    }

    if offset < file_len && offset + HEADER_SIZE > file_len {
        warn!(offset, file_len, "ignoring partial log header");
    }
    debug!(applied, keys = entries.len(), valid = offset, "log replay complete");
    Ok((entries, offset as u64))
}
