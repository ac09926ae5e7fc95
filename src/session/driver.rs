use crate::{error::EmbernetError, session::Session};
use ahash::AHashMap;
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

/// Pluggable persistence backend for sessions.
///
/// Each of `load`/`save`/`destroy` must be write-atomic with respect to
/// other invocations for the same id: a concurrent observer sees the
/// pre-state or the post-state, never a partial write. `exists` is a fast
/// predicate and may race with `destroy`/`save`; callers must not expect
/// read-after-write ordering without going through `save` completion. The
/// per-session [`SessionStorage`](crate::session::storage::SessionStorage)
/// queue already serializes calls for one session object; the atomicity
/// contract covers other processes and unrelated session objects sharing an
/// id.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Whether a record for `id` is stored.
    async fn exists(&self, id: &str) -> Result<bool, EmbernetError>;

    /// Atomically populates `session`'s data from the stored record.
    async fn load(&self, session: &Session, id: &str) -> Result<(), EmbernetError>;

    /// Atomically persists `session`'s data. Creates the record if it does
    /// not exist, including after a prior `destroy`.
    async fn save(&self, session: &Session, id: &str) -> Result<(), EmbernetError>;

    /// Removes the persistent record. Succeeds if no record exists.
    async fn destroy(&self, session: &Session, id: &str) -> Result<(), EmbernetError>;

    /// Copies the record for `id` out of `from` and into this driver.
    async fn migrate(
        &self,
        session: &Session,
        id: &str,
        from: &dyn SessionDriver,
    ) -> Result<(), EmbernetError> {
        from.load(session, id).await?;
        self.save(session, id).await
    }
}

// Key-length-value payload helpers. The on-disk layout per entry is
// `key_len:varint | key:utf8 | val_len:varint | val:bytes`.

pub(crate) fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

pub(crate) fn read_varint(buf: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *buf.get(*pos)?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}

fn encode_entries(entries: &[(String, serde_json::Value)]) -> Result<Vec<u8>, EmbernetError> {
    let mut buf = Vec::new();
    for (key, value) in entries {
        let value_bytes = serde_json::to_vec(value)?;
        write_varint(&mut buf, key.len() as u64);
        buf.extend_from_slice(key.as_bytes());
        write_varint(&mut buf, value_bytes.len() as u64);
        buf.extend_from_slice(&value_bytes);
    }
    Ok(buf)
}

fn decode_entries(buf: &[u8]) -> Result<Vec<(String, serde_json::Value)>, EmbernetError> {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos < buf.len() {
        let key_len = read_varint(buf, &mut pos)
            .ok_or_else(|| EmbernetError::session_io("truncated session record"))?
            as usize;
        let key_end = pos
            .checked_add(key_len)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| EmbernetError::session_io("truncated session record"))?;
        let key = std::str::from_utf8(&buf[pos..key_end])
            .map_err(|e| EmbernetError::session_io(e.to_string()))?
            .to_string();
        pos = key_end;
        let val_len = read_varint(buf, &mut pos)
            .ok_or_else(|| EmbernetError::session_io("truncated session record"))?
            as usize;
        let val_end = pos
            .checked_add(val_len)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| EmbernetError::session_io("truncated session record"))?;
        let value: serde_json::Value = serde_json::from_slice(&buf[pos..val_end])
            .map_err(|e| EmbernetError::session_io(e.to_string()))?;
        pos = val_end;
        entries.push((key, value));
    }
    Ok(entries)
}

/// The default driver: one file named `<id>.<ext>` per session under a
/// configured directory, payload in the key-length-value stream format.
///
/// Concurrent access across processes is mediated by a file lock: shared
/// for load, exclusive for save and destroy.
pub struct FileSessionDriver {
    directory: PathBuf,
    extension: String,
}

impl FileSessionDriver {
    /// Creates the driver. The directory is created on the first `save`.
    pub fn new(directory: PathBuf, extension: impl Into<String>) -> Self {
        Self {
            directory,
            extension: extension.into(),
        }
    }

    /// The file path for a session id.
    ///
    /// Ids originate from client cookies, so the id is validated against
    /// path traversal before any filesystem access.
    fn session_path(&self, id: &str) -> Result<PathBuf, EmbernetError> {
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(EmbernetError::session_io(
                "invalid session id: unsafe characters",
            ));
        }
        Ok(self.directory.join(format!("{}.{}", id, self.extension)))
    }
}

#[async_trait]
impl SessionDriver for FileSessionDriver {
    async fn exists(&self, id: &str) -> Result<bool, EmbernetError> {
        Ok(self.session_path(id)?.exists())
    }

    async fn load(&self, session: &Session, id: &str) -> Result<(), EmbernetError> {
        let path = self.session_path(id)?;
        let mut file = File::open(&path)
            .map_err(|e| EmbernetError::session_io(format!("open session file: {}", e)))?;
        file.lock_shared()
            .map_err(|e| EmbernetError::session_io(format!("lock session file: {}", e)))?;
        let mut contents = Vec::new();
        let read_result = file.read_to_end(&mut contents);
        let _ = fs2::FileExt::unlock(&file);
        read_result.map_err(|e| EmbernetError::session_io(format!("read session file: {}", e)))?;

        let entries = decode_entries(&contents)?;
        session.replace_data(entries);
        Ok(())
    }

    async fn save(&self, session: &Session, id: &str) -> Result<(), EmbernetError> {
        let path = self.session_path(id)?;
        fs::create_dir_all(&self.directory)
            .map_err(|e| EmbernetError::session_io(format!("session directory: {}", e)))?;
        let payload = encode_entries(&session.data_snapshot())?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| EmbernetError::session_io(format!("create session file: {}", e)))?;
        file.lock_exclusive()
            .map_err(|e| EmbernetError::session_io(format!("lock session file: {}", e)))?;
        let write_result = file.write_all(&payload);
        let _ = fs2::FileExt::unlock(&file);
        write_result.map_err(|e| EmbernetError::session_io(format!("write session file: {}", e)))?;
        session.mark_clean();
        Ok(())
    }

    async fn destroy(&self, _session: &Session, id: &str) -> Result<(), EmbernetError> {
        let path = self.session_path(id)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(EmbernetError::session_io(format!(
                    "open session file: {}",
                    e
                )))
            }
        };
        file.lock_exclusive()
            .map_err(|e| EmbernetError::session_io(format!("lock session file: {}", e)))?;
        let removed = fs::remove_file(&path);
        let _ = fs2::FileExt::unlock(&file);
        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EmbernetError::session_io(format!(
                "remove session file: {}",
                e
            ))),
        }
    }
}

/// An in-memory driver for tests and ephemeral hosts. Records do not
/// survive the process.
#[derive(Default)]
pub struct MemorySessionDriver {
    records: Mutex<AHashMap<String, Vec<(String, serde_json::Value)>>>,
}

impl MemorySessionDriver {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionDriver for MemorySessionDriver {
    async fn exists(&self, id: &str) -> Result<bool, EmbernetError> {
        Ok(self.records.lock().contains_key(id))
    }

    async fn load(&self, session: &Session, id: &str) -> Result<(), EmbernetError> {
        let entries = self
            .records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| EmbernetError::session_io(format!("no session record '{}'", id)))?;
        session.replace_data(entries);
        Ok(())
    }

    async fn save(&self, session: &Session, id: &str) -> Result<(), EmbernetError> {
        self.records
            .lock()
            .insert(id.to_string(), session.data_snapshot());
        session.mark_clean();
        Ok(())
    }

    async fn destroy(&self, _session: &Session, id: &str) -> Result<(), EmbernetError> {
        self.records.lock().remove(id);
        Ok(())
    }
}
